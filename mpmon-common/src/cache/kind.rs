//! Artifact kinds and their freshness durations

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Every kind of enveloped artifact the mirror persists
///
/// The freshness duration is a pure function of the kind. Item-level kinds
/// (vote details, per-MP voting records) live in a directory keyed by item id;
/// the rest are single files directly under the cache root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Current roster of MPs
    Politicians,
    /// Recent vote summaries
    Votes,
    /// Bill list
    Bills,
    /// Cross-reference index of bills that have at least one vote
    BillsWithVotes,
    /// One combined vote + ballots document per vote
    VoteDetails,
    /// One derived voting record per MP
    MpVotes,
    /// MPs discovered through ballots of past sessions
    HistoricalMps,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 7] = [
        ArtifactKind::Politicians,
        ArtifactKind::Votes,
        ArtifactKind::Bills,
        ArtifactKind::BillsWithVotes,
        ArtifactKind::VoteDetails,
        ArtifactKind::MpVotes,
        ArtifactKind::HistoricalMps,
    ];

    /// How long a freshly written artifact of this kind stays valid
    pub fn duration(self) -> Duration {
        match self {
            ArtifactKind::Politicians => Duration::hours(4),
            ArtifactKind::Votes => Duration::hours(1),
            ArtifactKind::Bills => Duration::hours(6),
            ArtifactKind::BillsWithVotes => Duration::hours(6),
            ArtifactKind::VoteDetails => Duration::hours(24),
            ArtifactKind::MpVotes => Duration::hours(2),
            ArtifactKind::HistoricalMps => Duration::weeks(1),
        }
    }

    /// Stable name used in logs, statistics and file names
    pub fn name(self) -> &'static str {
        match self {
            ArtifactKind::Politicians => "politicians",
            ArtifactKind::Votes => "votes",
            ArtifactKind::Bills => "bills",
            ArtifactKind::BillsWithVotes => "bills_with_votes_index",
            ArtifactKind::VoteDetails => "vote_details",
            ArtifactKind::MpVotes => "mp_votes",
            ArtifactKind::HistoricalMps => "historical_mps",
        }
    }

    /// True for kinds stored as one file per item
    pub fn is_collection(self) -> bool {
        matches!(self, ArtifactKind::VoteDetails | ArtifactKind::MpVotes)
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
