//! File-backed cache store
//!
//! The store is the only persistence layer: every artifact is a JSON document
//! under one root directory. Enveloped artifacts carry their own expiry;
//! raw documents (vote index, party-line report, checkpoint, lock, run
//! statistics) are plain JSON with the same "malformed means missing" policy.
//!
//! One instance is constructed at process start and passed to every component.

mod envelope;
mod kind;

pub use envelope::{Envelope, Payload};
pub use kind::ArtifactKind;

use crate::time;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use envelope::EnvelopeHeader;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const JSON_EXTENSION: &str = "json";
const TMP_EXTENSION: &str = "json.tmp";

/// Freshness state of one artifact, as reported by `status`
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactStatus {
    Missing,
    Unreadable,
    Valid { count: usize, updated: String },
    Expired { count: usize, updated: String },
}

/// Cache artifact store rooted at one directory
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    force: bool,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            force: false,
        }
    }

    /// When forced, every freshness check answers `false`
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn is_forced(&self) -> bool {
        self.force
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root and every collection directory
    pub fn ensure_layout(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        for kind in ArtifactKind::ALL.iter().filter(|k| k.is_collection()) {
            fs::create_dir_all(self.root.join(kind.name()))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------

    /// Path of a single-file artifact
    pub fn artifact_path(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(format!("{}.{}", kind.name(), JSON_EXTENSION))
    }

    /// Path of one item of a collection artifact
    pub fn item_path(&self, kind: ArtifactKind, id: &str) -> PathBuf {
        self.root
            .join(kind.name())
            .join(format!("{}.{}", sanitize_id(id), JSON_EXTENSION))
    }

    /// Path of a raw document
    pub fn document_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, JSON_EXTENSION))
    }

    // ------------------------------------------------------------------
    // Enveloped artifacts
    // ------------------------------------------------------------------

    /// Load a single-file artifact; missing or malformed yields `None`
    pub fn load<T: DeserializeOwned>(&self, kind: ArtifactKind) -> Option<Envelope<T>> {
        read_json(&self.artifact_path(kind))
    }

    /// Load one item of a collection; missing or malformed yields `None`
    pub fn load_item<T: DeserializeOwned>(&self, kind: ArtifactKind, id: &str) -> Option<Envelope<T>> {
        read_json(&self.item_path(kind, id))
    }

    pub fn is_fresh(&self, kind: ArtifactKind) -> bool {
        self.is_fresh_at(kind, time::now())
    }

    pub fn is_fresh_at(&self, kind: ArtifactKind, now: DateTime<Utc>) -> bool {
        self.header_is_fresh(&self.artifact_path(kind), now)
    }

    pub fn is_item_fresh(&self, kind: ArtifactKind, id: &str) -> bool {
        self.is_item_fresh_at(kind, id, time::now())
    }

    pub fn is_item_fresh_at(&self, kind: ArtifactKind, id: &str, now: DateTime<Utc>) -> bool {
        self.header_is_fresh(&self.item_path(kind, id), now)
    }

    /// Write a single-file artifact with `expires = now + duration(kind)`
    ///
    /// Returns the number of bytes written.
    pub fn save<T: Payload>(&self, kind: ArtifactKind, payload: &T) -> Result<u64> {
        self.save_at(kind, payload, time::now())
    }

    pub fn save_at<T: Payload>(&self, kind: ArtifactKind, payload: &T, now: DateTime<Utc>) -> Result<u64> {
        let path = self.artifact_path(kind);
        write_envelope(&path, kind, payload, now)
    }

    /// Write one item of a collection artifact
    pub fn save_item<T: Payload>(&self, kind: ArtifactKind, id: &str, payload: &T) -> Result<u64> {
        self.save_item_at(kind, id, payload, time::now())
    }

    pub fn save_item_at<T: Payload>(
        &self,
        kind: ArtifactKind,
        id: &str,
        payload: &T,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let path = self.item_path(kind, id);
        write_envelope(&path, kind, payload, now)
    }

    pub fn item_exists(&self, kind: ArtifactKind, id: &str) -> bool {
        self.item_path(kind, id).is_file()
    }

    /// Item ids present in a collection, sorted
    pub fn list_items(&self, kind: ArtifactKind) -> Vec<String> {
        let dir = self.root.join(kind.name());
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                name.strip_suffix(".json")
                    .filter(|stem| !stem.is_empty())
                    .map(str::to_string)
            })
            .collect();
        ids.sort();
        ids
    }

    /// Freshness report for a single-file artifact or a collection item
    pub fn status(&self, kind: ArtifactKind, id: Option<&str>) -> ArtifactStatus {
        let path = match id {
            Some(id) => self.item_path(kind, id),
            None => self.artifact_path(kind),
        };
        if !path.exists() {
            return ArtifactStatus::Missing;
        }
        match read_json::<EnvelopeHeader>(&path) {
            None => ArtifactStatus::Unreadable,
            Some(header) => {
                let count = header.count.unwrap_or(0);
                let updated = header.updated.unwrap_or_else(|| "unknown".to_string());
                if time::now().timestamp() < header.expires {
                    ArtifactStatus::Valid { count, updated }
                } else {
                    ArtifactStatus::Expired { count, updated }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Raw documents
    // ------------------------------------------------------------------

    /// Load a raw document; missing or malformed yields `None`
    pub fn load_document<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        read_json(&self.document_path(name))
    }

    /// Atomically write a raw document, returning the bytes written
    pub fn save_document<T: Serialize>(&self, name: &str, document: &T) -> Result<u64> {
        let bytes = serde_json::to_vec_pretty(document)?;
        write_atomic(&self.document_path(name), &bytes)
    }

    /// Remove a raw document; absent documents are not an error
    pub fn remove_document(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.document_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn header_is_fresh(&self, path: &Path, now: DateTime<Utc>) -> bool {
        if self.force {
            return false;
        }
        match read_json::<EnvelopeHeader>(path) {
            Some(header) => now.timestamp() < header.expires,
            None => false,
        }
    }
}

/// Item ids never contain path separators on disk
fn sanitize_id(id: &str) -> String {
    id.replace(['/', '\\'], "_")
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Unreadable cache artifact, treating as missing");
            }
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Malformed cache artifact, treating as missing");
            None
        }
    }
}

fn write_envelope<T: Payload>(
    path: &Path,
    kind: ArtifactKind,
    payload: &T,
    now: DateTime<Utc>,
) -> Result<u64> {
    let envelope = Envelope {
        payload,
        expires: time::epoch_seconds(now + kind.duration()),
        updated: time::timestamp_string(now),
        count: payload.item_count(),
    };
    let bytes = serde_json::to_vec_pretty(&envelope)?;
    let written = write_atomic(path, &bytes)?;
    debug!(kind = %kind, path = %path.display(), bytes = written, "Saved cache artifact");
    Ok(written)
}

/// Write to a sibling temp file, then rename over the target
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<u64> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension(TMP_EXTENSION);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(Error::Io(e));
    }
    Ok(bytes.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_sanitize_id_replaces_separators() {
        assert_eq!(sanitize_id("45-1/12"), "45-1_12");
        assert_eq!(sanitize_id("jane-doe"), "jane-doe");
    }

    #[test]
    fn test_freshness_follows_kind_duration() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        store
            .save_at(ArtifactKind::Votes, &vec![1, 2, 3], at(10))
            .unwrap();

        assert!(store.is_fresh_at(ArtifactKind::Votes, at(10) + Duration::minutes(59)));
        assert!(!store.is_fresh_at(ArtifactKind::Votes, at(11)));
    }

    #[test]
    fn test_force_makes_everything_stale() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        store.save_at(ArtifactKind::Bills, &vec!["C-1"], at(10)).unwrap();

        let forced = store.clone().with_force(true);
        assert!(store.is_fresh_at(ArtifactKind::Bills, at(11)));
        assert!(!forced.is_fresh_at(ArtifactKind::Bills, at(11)));
    }

    #[test]
    fn test_tmp_files_not_listed() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        store.save_item(ArtifactKind::MpVotes, "b-mp", &vec![1]).unwrap();
        store.save_item(ArtifactKind::MpVotes, "a-mp", &vec![1]).unwrap();
        fs::write(dir.path().join("mp_votes").join("c-mp.json.tmp"), b"{").unwrap();

        assert_eq!(store.list_items(ArtifactKind::MpVotes), vec!["a-mp", "b-mp"]);
    }
}
