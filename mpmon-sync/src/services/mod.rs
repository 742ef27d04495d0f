//! Sync services

pub mod change_detector;
pub mod detail_fetcher;
pub mod member_directory;
pub mod party_line;
pub mod propagator;
pub mod reference_data;

pub use change_detector::{detect_new_votes, Detection, NewVote};
pub use detail_fetcher::{DetailFetcher, FetchOutcome};
pub use member_directory::{normalize_party, MatchKind, Member, MemberDirectory};
pub use party_line::{AnalyticsOutcome, PartyLineEngine, PlanChoice, Tally};
pub use propagator::{rebuild_bills_index, PropagationReport, Propagator, RebuildReport};
