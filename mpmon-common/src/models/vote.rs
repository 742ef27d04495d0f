//! Votes, ballots and combined vote details

use super::LocalizedText;
use crate::cache::Payload;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Canonical vote identifier, e.g. `45-1_4` for `/votes/45-1/4/`
///
/// Also the file stem of the vote detail artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoteId(String);

impl VoteId {
    /// Derive the id from a vote URL (relative or absolute)
    pub fn from_url(url: &str) -> Option<Self> {
        let tail = match url.find("/votes/") {
            Some(pos) => &url[pos + "/votes/".len()..],
            None => return None,
        };
        let id = tail.replace('/', "_");
        let id = id.trim_end_matches('_');
        if id.is_empty() {
            None
        } else {
            Some(Self(id.to_string()))
        }
    }

    /// Wrap an id read back from disk (artifact stem or index key)
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Session part of the id (`45-1` for `45-1_4`)
    pub fn session(&self) -> &str {
        self.0.split('_').next().unwrap_or("")
    }

    /// Sequential number within the session, when numeric
    pub fn number(&self) -> Option<u32> {
        self.0.rsplit('_').next().and_then(|n| n.parse().ok())
    }
}

impl std::fmt::Display for VoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric ordering key for a session label: `45-1` > `44-2` > `44-1`
///
/// Unparseable components sort lowest.
pub fn session_key(session: &str) -> (u32, u32) {
    let mut parts = session.split('-');
    let parliament = parts.next().and_then(|p| p.trim().parse().ok()).unwrap_or(0);
    let number = parts.next().and_then(|p| p.trim().parse().ok()).unwrap_or(0);
    (parliament, number)
}

/// Compare two session labels numerically
pub fn compare_sessions(a: &str, b: &str) -> Ordering {
    session_key(a).cmp(&session_key(b)).then_with(|| a.cmp(b))
}

/// Upstream vote summary / record
///
/// Fields the mirror does not interpret are kept in `extra` so the cached
/// copy carries everything upstream sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub url: String,

    #[serde(default)]
    pub session: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,

    /// `YYYY-MM-DD`
    #[serde(default)]
    pub date: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<LocalizedText>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bill_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yea_total: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nay_total: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paired_total: Option<u32>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Vote {
    pub fn id(&self) -> Option<VoteId> {
        VoteId::from_url(&self.url)
    }

    /// English description, or the generic label used in reports
    pub fn short_description(&self) -> String {
        self.description
            .as_ref()
            .and_then(|d| d.en.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Parliamentary Vote".to_string())
    }

    /// Newest-first ordering: date, then session, then vote number
    pub fn cmp_recency(&self, other: &Vote) -> Ordering {
        other
            .date
            .cmp(&self.date)
            .then_with(|| compare_sessions(&other.session, &self.session))
            .then_with(|| other.number.cmp(&self.number))
            .then_with(|| other.url.cmp(&self.url))
    }
}

/// One legislator's choice in a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BallotChoice {
    Yes,
    No,
    Paired,
    Absent,
}

impl BallotChoice {
    /// Case-insensitive; anything unrecognised is `Absent`
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "yes" => BallotChoice::Yes,
            "no" => BallotChoice::No,
            "paired" => BallotChoice::Paired,
            _ => BallotChoice::Absent,
        }
    }

    /// Yes or No
    pub fn is_substantive(self) -> bool {
        matches!(self, BallotChoice::Yes | BallotChoice::No)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BallotChoice::Yes => "Yes",
            BallotChoice::No => "No",
            BallotChoice::Paired => "Paired",
            BallotChoice::Absent => "Absent",
        }
    }
}

impl std::fmt::Display for BallotChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream ballot
///
/// Payloads vary: some carry party/name/slug fields directly or nested under
/// `politician`, which stay in `extra` and are read through [`Ballot::field`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ballot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub politician_url: Option<String>,

    #[serde(default)]
    pub ballot: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_url: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Ballot {
    pub fn choice(&self) -> BallotChoice {
        BallotChoice::parse(&self.ballot)
    }

    /// Non-empty string at a dotted path in the extra fields, e.g. `politician.slug`
    pub fn field(&self, path: &str) -> Option<&str> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut value = self.extra.get(first)?;
        for segment in segments {
            value = value.get(segment)?;
        }
        value.as_str().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Vote record plus its full ballot set, one file per vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteDetail {
    pub vote: Vote,
    #[serde(default)]
    pub ballots: Vec<Ballot>,
    #[serde(default)]
    pub total_ballots: usize,
    #[serde(default)]
    pub cached_at: String,
}

impl VoteDetail {
    pub fn new(vote: Vote, ballots: Vec<Ballot>, cached_at: String) -> Self {
        let total_ballots = ballots.len();
        Self {
            vote,
            ballots,
            total_ballots,
            cached_at,
        }
    }
}

impl Payload for VoteDetail {
    fn item_count(&self) -> usize {
        self.ballots.len()
    }
}
