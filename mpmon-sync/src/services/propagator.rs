//! Derived cache propagation
//!
//! Keeps the per-legislator voting records and the bills-with-votes index in
//! step with the vote detail corpus. New details are folded into existing
//! records incrementally; missing or stale records are rebuilt by streaming
//! the corpus in fixed-size batches.

use crate::services::member_directory::{Member, MemberDirectory};
use mpmon_common::config::SyncConfig;
use mpmon_common::models::{MpVote, MpVotingRecord, VoteDetail, VoteId};
use mpmon_common::{ArtifactKind, CacheStore};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Legislators rebuilt per corpus pass, bounding records held in memory
const REBUILD_GROUP: usize = 64;

#[derive(Debug, Default, Clone)]
pub struct PropagationReport {
    pub records_updated: usize,
    pub entries_added: usize,
    pub unmatched_ballots: usize,
    pub bills_index_rebuilt: bool,
    pub write_failures: usize,
}

#[derive(Debug, Default, Clone)]
pub struct RebuildReport {
    pub records_written: usize,
    pub details_scanned: usize,
    pub unreadable_details: usize,
    pub write_failures: usize,
    pub cancelled: bool,
}

/// Rebuild the set of bill URLs that have at least one vote
pub fn rebuild_bills_index(store: &CacheStore) -> mpmon_common::Result<usize> {
    let mut bills: BTreeSet<String> = BTreeSet::new();
    for id in store.list_items(ArtifactKind::VoteDetails) {
        if let Some(envelope) = store.load_item::<VoteDetail>(ArtifactKind::VoteDetails, &id) {
            if let Some(bill) = envelope.payload.vote.bill_url.filter(|b| !b.is_empty()) {
                bills.insert(bill);
            }
        }
    }
    store.save(ArtifactKind::BillsWithVotes, &bills)?;
    info!(bills = bills.len(), "Built bills-with-votes index");
    Ok(bills.len())
}

pub struct Propagator<'a> {
    store: &'a CacheStore,
    directory: &'a MemberDirectory,
    config: &'a SyncConfig,
}

impl<'a> Propagator<'a> {
    pub fn new(store: &'a CacheStore, directory: &'a MemberDirectory, config: &'a SyncConfig) -> Self {
        Self {
            store,
            directory,
            config,
        }
    }

    /// Fold newly written vote details into the records that already exist
    pub fn propagate_incremental(&self, written: &[VoteId]) -> PropagationReport {
        let mut report = PropagationReport::default();
        if written.is_empty() {
            return report;
        }

        let mut touched: BTreeMap<String, MpVotingRecord> = BTreeMap::new();
        let mut missing_views: HashSet<String> = HashSet::new();
        let mut new_bills: BTreeSet<String> = BTreeSet::new();

        for id in written {
            let Some(envelope) = self.store.load_item::<VoteDetail>(ArtifactKind::VoteDetails, id.as_str()) else {
                warn!(vote_id = %id, "Newly written vote detail unreadable, skipping propagation");
                continue;
            };
            let detail = envelope.payload;
            if let Some(bill) = detail.vote.bill_url.as_ref().filter(|b| !b.is_empty()) {
                new_bills.insert(bill.clone());
            }

            for ballot in &detail.ballots {
                if ballot.ballot.trim().is_empty() {
                    continue;
                }
                let slug = match self.directory.resolve_owner(ballot) {
                    Some((slug, Some(_))) => slug,
                    _ => {
                        report.unmatched_ballots += 1;
                        continue;
                    }
                };
                if missing_views.contains(&slug) {
                    continue;
                }
                if !touched.contains_key(&slug) {
                    match self.store.load_item::<MpVotingRecord>(ArtifactKind::MpVotes, &slug) {
                        Some(existing) => {
                            touched.insert(slug.clone(), existing.payload);
                        }
                        None => {
                            // No view yet; the rebuild pass creates it
                            missing_views.insert(slug);
                            continue;
                        }
                    }
                }
                if let Some(record) = touched.get_mut(&slug) {
                    let added = record.insert(MpVote {
                        vote: detail.vote.clone(),
                        mp_ballot: ballot.ballot.clone(),
                    });
                    if added {
                        report.entries_added += 1;
                    }
                }
            }
        }

        for (slug, mut record) in touched {
            record.normalize(self.config.max_record_len);
            match self.store.save_item(ArtifactKind::MpVotes, &slug, &record) {
                Ok(_) => report.records_updated += 1,
                Err(e) => {
                    error!(mp = %slug, error = %e, "Failed to save voting record");
                    report.write_failures += 1;
                }
            }
        }

        if !new_bills.is_empty() {
            let known: BTreeSet<String> = self
                .store
                .load::<BTreeSet<String>>(ArtifactKind::BillsWithVotes)
                .map(|e| e.payload)
                .unwrap_or_default();
            if !new_bills.is_subset(&known) {
                match rebuild_bills_index(self.store) {
                    Ok(_) => report.bills_index_rebuilt = true,
                    Err(e) => {
                        error!(error = %e, "Failed to rebuild bills-with-votes index");
                        report.write_failures += 1;
                    }
                }
            }
        }

        if report.unmatched_ballots > 0 {
            warn!(unmatched = report.unmatched_ballots, "Ballots with no matching legislator");
        }
        info!(
            records = report.records_updated,
            entries = report.entries_added,
            bills_index_rebuilt = report.bills_index_rebuilt,
            "Incremental propagation complete"
        );
        report
    }

    /// Rebuild voting records from the whole corpus for the given members
    ///
    /// Ballots are matched by exact `politician_url`. The cancel check runs
    /// between corpus batches.
    pub fn rebuild_views(
        &self,
        members: &[&Member],
        cancel: &CancellationToken,
    ) -> RebuildReport {
        let mut report = RebuildReport::default();
        if members.is_empty() {
            return report;
        }
        let files = self.store.list_items(ArtifactKind::VoteDetails);
        info!(mps = members.len(), details = files.len(), "Rebuilding voting records");

        for group in members.chunks(REBUILD_GROUP) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let by_url: HashMap<&str, usize> = group
                .iter()
                .enumerate()
                .map(|(i, m)| (m.url.as_str(), i))
                .collect();
            let mut records: Vec<MpVotingRecord> = group
                .iter()
                .map(|m| MpVotingRecord::new(m.slug.clone(), m.name.clone()))
                .collect();
            let mut seen_votes: HashSet<String> = HashSet::new();

            for chunk in files.chunks(self.config.rebuild_batch) {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                for id in chunk {
                    let Some(envelope) = self.store.load_item::<VoteDetail>(ArtifactKind::VoteDetails, id) else {
                        report.unreadable_details += 1;
                        continue;
                    };
                    report.details_scanned += 1;
                    let detail = envelope.payload;
                    if !seen_votes.insert(detail.vote.url.clone()) {
                        continue;
                    }
                    for ballot in &detail.ballots {
                        if ballot.ballot.trim().is_empty() {
                            continue;
                        }
                        let Some(&slot) = ballot.politician_url.as_deref().and_then(|u| by_url.get(u)) else {
                            continue;
                        };
                        records[slot].votes.push(MpVote {
                            vote: detail.vote.clone(),
                            mp_ballot: ballot.ballot.clone(),
                        });
                    }
                }
                // Keep memory bounded between batches
                for record in records.iter_mut() {
                    if record.votes.len() > self.config.max_record_len * 2 {
                        record.normalize(self.config.max_record_len);
                    }
                }
            }

            if report.cancelled {
                break;
            }

            for mut record in records {
                record.normalize(self.config.max_record_len);
                match self.store.save_item(ArtifactKind::MpVotes, &record.mp_slug, &record) {
                    Ok(_) => {
                        debug!(mp = %record.mp_slug, votes = record.votes.len(), "Rebuilt voting record");
                        report.records_written += 1;
                    }
                    Err(e) => {
                        error!(mp = %record.mp_slug, error = %e, "Failed to save voting record");
                        report.write_failures += 1;
                    }
                }
            }
        }

        info!(
            records = report.records_written,
            write_failures = report.write_failures,
            "Voting record rebuild complete"
        );
        report
    }
}
