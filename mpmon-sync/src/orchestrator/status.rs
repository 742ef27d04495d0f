//! Read-only cache status report (`--mode status`)

use crate::services::detail_fetcher::load_index;
use crate::services::party_line::checkpoint;
use mpmon_common::lock::LockRecord;
use mpmon_common::{time, ArtifactKind, ArtifactStatus, CacheStore, ProcessLock};
use serde::Serialize;

/// File name of the process lock under the cache root
pub const LOCK_FILE: &str = "sync.lock";

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactLine {
    pub name: String,
    pub state: String,
    pub count: usize,
    pub updated: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionLine {
    pub name: String,
    pub files: usize,
    pub valid: usize,
    pub expired: usize,
    pub unreadable: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub cache_dir: String,
    pub artifacts: Vec<ArtifactLine>,
    pub collections: Vec<CollectionLine>,
    pub indexed_votes: usize,
    pub party_line: Option<String>,
    pub analytics_in_progress: bool,
    pub lock_holder: Option<String>,
}

impl StatusReport {
    pub fn collect(store: &CacheStore) -> Self {
        let mut artifacts = Vec::new();
        let mut collections = Vec::new();

        for kind in ArtifactKind::ALL {
            if kind.is_collection() {
                collections.push(collection_line(store, kind));
            } else {
                artifacts.push(artifact_line(kind.name(), store.status(kind, None)));
            }
        }

        let party_line = checkpoint::load_report(store).map(|report| {
            let state = if checkpoint::report_is_fresh_at(&report, time::now()) {
                "valid"
            } else {
                "expired"
            };
            format!(
                "{} ({} MPs, {} votes, avg {:.1}%, expires {})",
                state,
                report.summary.total_mps_analyzed,
                report.summary.total_votes_analyzed,
                report.summary.avg_party_line_percentage,
                report.summary.cache_expires
            )
        });

        Self {
            cache_dir: store.root().display().to_string(),
            artifacts,
            collections,
            indexed_votes: load_index(store).len(),
            party_line,
            analytics_in_progress: checkpoint::load_checkpoint(store).is_some(),
            lock_holder: ProcessLock::holder(&store.root().join(LOCK_FILE))
                .as_ref()
                .map(LockRecord::display_summary),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!("cache: {}", self.cache_dir)];
        for a in &self.artifacts {
            let updated = a.updated.as_deref().unwrap_or("-");
            lines.push(format!("  {:<24} {:<10} {:>6}  {}", a.name, a.state, a.count, updated));
        }
        for c in &self.collections {
            lines.push(format!(
                "  {:<24} {} files ({} valid, {} expired, {} unreadable)",
                c.name, c.files, c.valid, c.expired, c.unreadable
            ));
        }
        lines.push(format!("  {:<24} {} entries", "vote_cache_index", self.indexed_votes));
        lines.push(format!(
            "  {:<24} {}",
            "party_line_stats",
            self.party_line.as_deref().unwrap_or("missing")
        ));
        if self.analytics_in_progress {
            lines.push("  party-line checkpoint present; next run resumes it".to_string());
        }
        match &self.lock_holder {
            Some(holder) => lines.push(format!("  lock held: {}", holder)),
            None => lines.push("  lock free".to_string()),
        }
        lines
    }
}

fn artifact_line(name: &str, status: ArtifactStatus) -> ArtifactLine {
    let (state, count, updated) = match status {
        ArtifactStatus::Missing => ("missing", 0, None),
        ArtifactStatus::Unreadable => ("unreadable", 0, None),
        ArtifactStatus::Valid { count, updated } => ("valid", count, Some(updated)),
        ArtifactStatus::Expired { count, updated } => ("expired", count, Some(updated)),
    };
    ArtifactLine {
        name: name.to_string(),
        state: state.to_string(),
        count,
        updated,
    }
}

fn collection_line(store: &CacheStore, kind: ArtifactKind) -> CollectionLine {
    let mut line = CollectionLine {
        name: kind.name().to_string(),
        ..CollectionLine::default()
    };
    for id in store.list_items(kind) {
        line.files += 1;
        match store.status(kind, Some(id.as_str())) {
            ArtifactStatus::Valid { .. } => line.valid += 1,
            ArtifactStatus::Expired { .. } => line.expired += 1,
            ArtifactStatus::Unreadable | ArtifactStatus::Missing => line.unreadable += 1,
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_cache_reports_missing() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());

        let report = StatusReport::collect(&store);

        assert!(report.artifacts.iter().all(|a| a.state == "missing"));
        assert!(report.collections.iter().all(|c| c.files == 0));
        assert!(report.party_line.is_none());
        assert!(report.lock_holder.is_none());
        assert!(report.lines().iter().any(|l| l.contains("lock free")));
    }

    #[test]
    fn test_counts_valid_and_unreadable_items() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        store.ensure_layout().unwrap();
        store.save(ArtifactKind::Votes, &vec![1u32, 2]).unwrap();
        store.save_item(ArtifactKind::MpVotes, "jane-doe", &vec![1u32]).unwrap();
        std::fs::write(store.item_path(ArtifactKind::MpVotes, "broken"), b"{").unwrap();

        let report = StatusReport::collect(&store);

        let votes = report.artifacts.iter().find(|a| a.name == "votes").unwrap();
        assert_eq!((votes.state.as_str(), votes.count), ("valid", 2));
        let views = report.collections.iter().find(|c| c.name == "mp_votes").unwrap();
        assert_eq!((views.files, views.valid, views.unreadable), (2, 1, 1));
    }
}
