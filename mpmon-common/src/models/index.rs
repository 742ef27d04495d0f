//! Vote cache index: which vote details are known to be on disk

use super::VoteId;
use crate::time::parse_vote_date;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Document name of the index under the cache root
pub const VOTE_CACHE_INDEX: &str = "vote_cache_index";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub url: String,
    #[serde(default)]
    pub date: Option<String>,
    pub cached_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoteCacheIndex {
    #[serde(default)]
    pub cached_votes: BTreeMap<String, IndexEntry>,
    #[serde(default)]
    pub updated: String,
    #[serde(default)]
    pub total_cached: usize,
}

impl VoteCacheIndex {
    pub fn contains(&self, id: &VoteId) -> bool {
        self.cached_votes.contains_key(id.as_str())
    }

    pub fn insert(&mut self, id: &VoteId, entry: IndexEntry) {
        self.cached_votes.insert(id.as_str().to_string(), entry);
        self.total_cached = self.cached_votes.len();
    }

    pub fn ids(&self) -> impl Iterator<Item = VoteId> + '_ {
        self.cached_votes.keys().map(|k| VoteId::from_raw(k.clone()))
    }

    pub fn len(&self) -> usize {
        self.cached_votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cached_votes.is_empty()
    }

    /// Latest vote date among entries that recorded one
    pub fn newest_date(&self) -> Option<NaiveDate> {
        self.cached_votes
            .values()
            .filter_map(|e| e.date.as_deref().and_then(parse_vote_date))
            .max()
    }

    /// Drop entries whose artifact is gone; returns the dropped ids
    pub fn reconcile<F>(&mut self, artifact_exists: F) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        let missing: Vec<String> = self
            .cached_votes
            .keys()
            .filter(|id| !artifact_exists(id))
            .cloned()
            .collect();
        for id in &missing {
            self.cached_votes.remove(id);
        }
        self.total_cached = self.cached_votes.len();
        missing
    }

    /// Stamp before persisting
    pub fn touch(&mut self, updated: String) {
        self.updated = updated;
        self.total_cached = self.cached_votes.len();
    }
}
