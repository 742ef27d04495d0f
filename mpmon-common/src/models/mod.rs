//! Data model shared by the sync engine and any reader of the cache

pub mod bill;
pub mod index;
pub mod party_line;
pub mod politician;
pub mod record;
pub mod vote;

pub use bill::Bill;
pub use index::{IndexEntry, VoteCacheIndex};
pub use party_line::{
    AnalysisPlan, DisciplineBreak, PartyLineCheckpoint, PartyLineRecord, PartyLineReport,
    PartyLineSummary, SessionLoyalty, SessionSummary,
};
pub use politician::{slug_from_url, url_from_slug, Politician};
pub use record::{MpVote, MpVotingRecord};
pub use vote::{Ballot, BallotChoice, Vote, VoteDetail, VoteId};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Bilingual text as served upstream (`{"en": ..., "fr": ...}`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalizedText {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub en: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fr: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl LocalizedText {
    pub fn english(text: impl Into<String>) -> Self {
        Self {
            en: Some(text.into()),
            ..Self::default()
        }
    }
}

/// Round to one decimal place, the precision of every reported percentage
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `part / whole * 100` at one decimal; zero when `whole` is zero
pub fn percentage(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round1(f64::from(part) / f64::from(whole) * 100.0)
    }
}
