//! Artifact envelope
//!
//! Every enveloped artifact on disk has the shape
//! `{ "payload": ..., "expires": <epoch seconds>, "updated": "<rfc3339>", "count": N }`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Envelope wrapping a cached payload with its validity window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub payload: T,
    /// Epoch seconds after which the artifact is stale
    pub expires: i64,
    /// When the artifact was written
    pub updated: String,
    /// Element count of the payload
    pub count: usize,
}

impl<T> Envelope<T> {
    /// Usable iff `now < expires`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() < self.expires
    }
}

/// Header-only view used for freshness checks
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EnvelopeHeader {
    pub expires: i64,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default)]
    pub count: Option<usize>,
}

/// Payloads know how many elements they carry (the envelope `count`)
pub trait Payload: Serialize {
    fn item_count(&self) -> usize;
}

impl<T: Serialize> Payload for Vec<T> {
    fn item_count(&self) -> usize {
        self.len()
    }
}

impl<K: Serialize, V: Serialize> Payload for BTreeMap<K, V> {
    fn item_count(&self) -> usize {
        self.len()
    }
}

impl<T: Serialize> Payload for BTreeSet<T> {
    fn item_count(&self) -> usize {
        self.len()
    }
}
