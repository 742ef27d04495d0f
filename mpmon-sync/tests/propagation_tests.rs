//! Derived views: per-legislator voting records and the bills-with-votes index

mod helpers;

use helpers::{ballot_for, quick_sync_config, seed_detail, test_store, vote, vote_on_bill, Corpus};
use mpmon_common::models::{MpVotingRecord, VoteId};
use mpmon_common::{ArtifactKind, CacheStore};
use mpmon_sync::services::party_line::checkpoint;
use mpmon_sync::services::{rebuild_bills_index, Member, MemberDirectory, PartyLineEngine, Propagator};
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;

fn record(store: &CacheStore, slug: &str) -> MpVotingRecord {
    store
        .load_item::<MpVotingRecord>(ArtifactKind::MpVotes, slug)
        .unwrap()
        .payload
}

/// Seed every vote but the newest and build views for the current roster
fn seeded_without_newest(corpus: &Corpus, store: &CacheStore, directory: &MemberDirectory) {
    let (_, older) = corpus.votes.split_last().unwrap();
    for (v, ballots) in older {
        seed_detail(store, v, ballots.clone());
    }
    let config = quick_sync_config();
    let members: Vec<&Member> = directory.current().collect();
    let report = Propagator::new(store, directory, &config).rebuild_views(&members, &CancellationToken::new());
    assert_eq!(report.records_written, 5);
}

#[test]
fn test_rebuild_orders_newest_first() {
    let (_dir, store) = test_store();
    let corpus = Corpus::standard();
    corpus.seed_cache(&store);
    let directory = MemberDirectory::new(&corpus.roster, &corpus.former);
    let config = quick_sync_config();
    let members: Vec<&Member> = directory.current().collect();

    let report = Propagator::new(&store, &directory, &config).rebuild_views(&members, &CancellationToken::new());

    assert_eq!(report.records_written, 5);
    assert_eq!(report.details_scanned, 4);
    let carol = record(&store, "carol-diaz");
    assert_eq!(carol.mp_name, "Carol Diaz");
    let urls: Vec<&str> = carol.votes.iter().map(|v| v.vote.url.as_str()).collect();
    assert_eq!(
        urls,
        vec!["/votes/45-1/3/", "/votes/45-1/2/", "/votes/45-1/1/", "/votes/44-1/10/"]
    );
    assert_eq!(carol.votes[1].mp_ballot, "Yes");
    // Former members get no view
    assert!(!store.item_exists(ArtifactKind::MpVotes, "frank-oak"));
}

#[test]
fn test_views_agree_with_party_line_buckets() {
    let (_dir, store) = test_store();
    let corpus = Corpus::standard();
    corpus.seed_cache(&store);
    let directory = MemberDirectory::new(&corpus.roster, &corpus.former);
    let config = quick_sync_config();
    let members: Vec<&Member> = directory.current().collect();

    Propagator::new(&store, &directory, &config).rebuild_views(&members, &CancellationToken::new());
    let engine = PartyLineEngine::new(&store, &directory, &config, None);
    engine
        .run(engine.select_plan(false, true), &CancellationToken::new())
        .unwrap();
    let report = checkpoint::load_report(&store).unwrap();

    // Every ballot in the corpus is Yes/No with a defined party majority
    for member in &members {
        let view = record(&store, &member.slug);
        let stats = &report.mp_stats[&member.slug];
        for (session, bucket) in &stats.party_loyalty_by_session {
            assert_eq!(
                view.session_count(session),
                bucket.total as usize,
                "{} in {}",
                member.slug,
                session
            );
        }
    }
}

#[test]
fn test_incremental_adds_new_vote_to_existing_views() {
    let (_dir, store) = test_store();
    let corpus = Corpus::standard();
    let directory = MemberDirectory::new(&corpus.roster, &corpus.former);
    seeded_without_newest(&corpus, &store, &directory);
    assert_eq!(record(&store, "alice-ng").votes.len(), 3);

    let (newest, ballots) = corpus.votes.last().unwrap();
    seed_detail(&store, newest, ballots.clone());
    let config = quick_sync_config();
    let propagator = Propagator::new(&store, &directory, &config);

    let report = propagator.propagate_incremental(&[VoteId::from_raw("45-1_3")]);

    assert_eq!(report.records_updated, 5);
    assert_eq!(report.entries_added, 5);
    let alice = record(&store, "alice-ng");
    assert_eq!(alice.votes.len(), 4);
    assert_eq!(alice.votes[0].vote.url, "/votes/45-1/3/");
    assert_eq!(alice.votes[0].mp_ballot, "Yes");

    // Folding the same vote again adds nothing
    let again = propagator.propagate_incremental(&[VoteId::from_raw("45-1_3")]);
    assert_eq!(again.entries_added, 0);
    assert_eq!(record(&store, "alice-ng").votes.len(), 4);
}

#[test]
fn test_missing_views_are_left_for_rebuild() {
    let (_dir, store) = test_store();
    let corpus = Corpus::standard();
    corpus.seed_cache(&store);
    let directory = MemberDirectory::new(&corpus.roster, &corpus.former);
    let config = quick_sync_config();

    let report = Propagator::new(&store, &directory, &config)
        .propagate_incremental(&[VoteId::from_raw("45-1_1"), VoteId::from_raw("45-1_2")]);

    assert_eq!(report.records_updated, 0);
    assert!(store.list_items(ArtifactKind::MpVotes).is_empty());
}

#[test]
fn test_unknown_ballot_owner_is_counted() {
    let (_dir, store) = test_store();
    let corpus = Corpus::standard();
    let directory = MemberDirectory::new(&corpus.roster, &corpus.former);
    seeded_without_newest(&corpus, &store, &directory);
    seed_detail(
        &store,
        &vote("45-1", 9, "2025-06-09"),
        vec![ballot_for("alice-ng", "No"), ballot_for("ghost-mp", "Yes")],
    );
    let config = quick_sync_config();

    let report = Propagator::new(&store, &directory, &config).propagate_incremental(&[VoteId::from_raw("45-1_9")]);

    assert_eq!(report.unmatched_ballots, 1);
    assert_eq!(report.records_updated, 1);
    assert!(!store.item_exists(ArtifactKind::MpVotes, "ghost-mp"));
}

#[test]
fn test_new_bill_rebuilds_index() {
    let (_dir, store) = test_store();
    let corpus = Corpus::standard();
    corpus.seed_cache(&store);
    assert_eq!(rebuild_bills_index(&store).unwrap(), 2);

    seed_detail(
        &store,
        &vote_on_bill("45-1", 5, "2025-06-05", "/bills/45-1/C-9/"),
        vec![ballot_for("alice-ng", "Yes")],
    );
    let directory = MemberDirectory::new(&corpus.roster, &corpus.former);
    let config = quick_sync_config();

    let report = Propagator::new(&store, &directory, &config).propagate_incremental(&[VoteId::from_raw("45-1_5")]);

    assert!(report.bills_index_rebuilt);
    let bills = store
        .load::<BTreeSet<String>>(ArtifactKind::BillsWithVotes)
        .unwrap()
        .payload;
    assert_eq!(bills.len(), 3);
    assert!(bills.contains("/bills/45-1/C-9/"));
}

#[test]
fn test_known_bill_leaves_index_alone() {
    let (_dir, store) = test_store();
    let corpus = Corpus::standard();
    corpus.seed_cache(&store);
    rebuild_bills_index(&store).unwrap();
    let directory = MemberDirectory::new(&corpus.roster, &corpus.former);
    let config = quick_sync_config();

    let report = Propagator::new(&store, &directory, &config).propagate_incremental(&[VoteId::from_raw("45-1_2")]);

    assert!(!report.bills_index_rebuilt);
}

#[test]
fn test_cancelled_rebuild_writes_nothing() {
    let (_dir, store) = test_store();
    let corpus = Corpus::standard();
    corpus.seed_cache(&store);
    let directory = MemberDirectory::new(&corpus.roster, &corpus.former);
    let config = quick_sync_config();
    let members: Vec<&Member> = directory.current().collect();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = Propagator::new(&store, &directory, &config).rebuild_views(&members, &cancel);

    assert!(report.cancelled);
    assert_eq!(report.records_written, 0);
    assert!(store.list_items(ArtifactKind::MpVotes).is_empty());
}
