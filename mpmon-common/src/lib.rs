//! # mpmon common library
//!
//! Shared code for the parliamentary cache mirror:
//! - Cache artifact store (envelopes, freshness, atomic writes)
//! - Single-instance process lock
//! - Data model for votes, ballots, politicians, bills and derived views
//! - Configuration loading
//! - Timestamp helpers

pub mod cache;
pub mod config;
pub mod error;
pub mod lock;
pub mod models;
pub mod time;

pub use cache::{ArtifactKind, ArtifactStatus, CacheStore, Envelope};
pub use error::{Error, Result};
pub use lock::{LockError, LockGuard, LockRecord, ProcessLock};
