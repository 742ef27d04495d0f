//! Per-legislator voting record (derived view)

use super::Vote;
use crate::cache::Payload;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A vote summary plus how this legislator voted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpVote {
    #[serde(flatten)]
    pub vote: Vote,
    pub mp_ballot: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpVotingRecord {
    pub mp_slug: String,
    #[serde(default)]
    pub mp_name: String,
    #[serde(default)]
    pub votes: Vec<MpVote>,
}

impl MpVotingRecord {
    pub fn new(mp_slug: impl Into<String>, mp_name: impl Into<String>) -> Self {
        Self {
            mp_slug: mp_slug.into(),
            mp_name: mp_name.into(),
            votes: Vec::new(),
        }
    }

    pub fn contains_vote(&self, vote_url: &str) -> bool {
        self.votes.iter().any(|v| v.vote.url == vote_url)
    }

    /// Insert unless the vote URL is already present; returns whether inserted
    ///
    /// Call [`MpVotingRecord::normalize`] after a round of inserts.
    pub fn insert(&mut self, entry: MpVote) -> bool {
        if self.contains_vote(&entry.vote.url) {
            return false;
        }
        self.votes.push(entry);
        true
    }

    /// Deduplicate by vote URL, sort newest first and truncate
    pub fn normalize(&mut self, max_len: usize) {
        let mut seen = HashSet::new();
        self.votes.retain(|v| seen.insert(v.vote.url.clone()));
        self.votes.sort_by(|a, b| a.vote.cmp_recency(&b.vote));
        self.votes.truncate(max_len);
    }

    /// Entries belonging to one session
    pub fn session_count(&self, session: &str) -> usize {
        self.votes.iter().filter(|v| v.vote.session == session).count()
    }
}

impl Payload for MpVotingRecord {
    fn item_count(&self) -> usize {
        self.votes.len()
    }
}
