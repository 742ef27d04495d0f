//! mpmon-sync library
//!
//! Incremental mirror of a remote parliamentary API into the local cache, and
//! the party-line analytics computed over it. The `mpmon-sync` binary is a thin
//! wrapper around [`Orchestrator`].

pub mod orchestrator;
pub mod services;
pub mod upstream;

pub use orchestrator::{Orchestrator, RunMode, RunOptions, SyncExit};
pub use upstream::{OpenParliamentClient, ParliamentSource, UpstreamError};
