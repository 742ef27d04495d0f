//! Report and checkpoint persistence for the analytics engine
//!
//! Both are plain documents under the cache root. The report carries its own
//! expiry in `summary.cache_expires`.

use chrono::{DateTime, Duration, Utc};
use mpmon_common::models::party_line::{PARTY_LINE_CHECKPOINT, PARTY_LINE_REPORT};
use mpmon_common::models::{PartyLineCheckpoint, PartyLineRecord, PartyLineReport};
use mpmon_common::{time, CacheStore, Result};

/// How long a finished report stays fresh
pub const REPORT_TTL_HOURS: i64 = 2;

pub fn load_report(store: &CacheStore) -> Option<PartyLineReport> {
    store.load_document(PARTY_LINE_REPORT)
}

pub fn save_report(store: &CacheStore, report: &PartyLineReport) -> Result<u64> {
    store.save_document(PARTY_LINE_REPORT, report)
}

/// Read-merge-write of one legislator's record
pub fn merge_record(store: &CacheStore, record: PartyLineRecord) -> Result<u64> {
    let mut report = load_report(store).unwrap_or_default();
    report.mp_stats.insert(record.mp_slug.clone(), record);
    save_report(store, &report)
}

pub fn load_checkpoint(store: &CacheStore) -> Option<PartyLineCheckpoint> {
    store.load_document(PARTY_LINE_CHECKPOINT)
}

pub fn save_checkpoint(store: &CacheStore, checkpoint: &mut PartyLineCheckpoint) -> Result<u64> {
    checkpoint.updated = time::timestamp_string(time::now());
    store.save_document(PARTY_LINE_CHECKPOINT, checkpoint)
}

pub fn clear_checkpoint(store: &CacheStore) -> Result<()> {
    store.remove_document(PARTY_LINE_CHECKPOINT)
}

/// Expiry stamped on a report finished at `at`
pub fn report_expiry(at: DateTime<Utc>) -> String {
    time::timestamp_string(at + Duration::hours(REPORT_TTL_HOURS))
}

/// True when the report has a parseable expiry still in the future
pub fn report_is_fresh_at(report: &PartyLineReport, now: DateTime<Utc>) -> bool {
    DateTime::parse_from_rfc3339(&report.summary.cache_expires)
        .map(|expires| expires.with_timezone(&Utc) > now)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpmon_common::models::AnalysisPlan;
    use tempfile::TempDir;

    #[test]
    fn test_merge_keeps_other_records() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());

        merge_record(&store, PartyLineRecord::new("a", "NDP")).unwrap();
        merge_record(&store, PartyLineRecord::new("b", "Liberal")).unwrap();
        let mut updated = PartyLineRecord::new("a", "NDP");
        updated.record_eligible("45-1", true, 100.0);
        merge_record(&store, updated).unwrap();

        let report = load_report(&store).unwrap();
        assert_eq!(report.mp_stats.len(), 2);
        assert_eq!(report.mp_stats["a"].total_eligible_votes, 1);
    }

    #[test]
    fn test_checkpoint_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        assert!(load_checkpoint(&store).is_none());

        let mut checkpoint = PartyLineCheckpoint::new("run", AnalysisPlan::Full);
        checkpoint.completed.insert("a".into());
        save_checkpoint(&store, &mut checkpoint).unwrap();

        let loaded = load_checkpoint(&store).unwrap();
        assert!(loaded.is_done("a"));
        assert!(!loaded.updated.is_empty());

        clear_checkpoint(&store).unwrap();
        assert!(load_checkpoint(&store).is_none());
    }

    #[test]
    fn test_report_freshness_follows_summary_expiry() {
        let now = time::now();
        let mut report = PartyLineReport::default();
        assert!(!report_is_fresh_at(&report, now));

        report.summary.cache_expires = report_expiry(now);
        assert!(report_is_fresh_at(&report, now));
        assert!(!report_is_fresh_at(&report, now + Duration::hours(3)));
    }
}
