//! Change detection and vote detail fetching against a fake upstream

mod helpers;

use helpers::{ballot_for, quick_sync_config, seed_detail, test_store, vote, FakeUpstream};
use mpmon_common::models::{IndexEntry, VoteCacheIndex, VoteDetail, VoteId};
use mpmon_common::ArtifactKind;
use mpmon_sync::services::detail_fetcher::{load_index, persist_index};
use mpmon_sync::services::{detect_new_votes, DetailFetcher};
use mpmon_sync::upstream::ParliamentSource;
use tokio_util::sync::CancellationToken;

fn indexed(ids: &[&str]) -> VoteCacheIndex {
    let mut index = VoteCacheIndex::default();
    for id in ids {
        let id = VoteId::from_raw(*id);
        index.insert(
            &id,
            IndexEntry {
                url: String::new(),
                date: None,
                cached_at: "2025-01-01T00:00:00+00:00".into(),
            },
        );
    }
    index
}

fn three_vote_upstream() -> FakeUpstream {
    let upstream = FakeUpstream::new();
    for (number, date) in [(1, "2025-06-01"), (2, "2025-06-02"), (3, "2025-06-03")] {
        upstream.add_vote(
            vote("45-1", number, date),
            vec![ballot_for("alice-ng", "Yes"), ballot_for("dave-roy", "No")],
        );
    }
    upstream
}

#[tokio::test]
async fn test_only_unindexed_vote_is_fetched() {
    let (_dir, store) = test_store();
    let upstream = three_vote_upstream();
    let config = quick_sync_config();
    let mut index = indexed(&["45-1_1", "45-1_2"]);

    let summaries = upstream.recent_votes(config.detection_window).await.unwrap();
    let detection = detect_new_votes(&summaries, &index, None);
    assert_eq!(detection.examined, 3);
    assert_eq!(detection.new_votes.len(), 1);
    assert_eq!(detection.new_votes[0].id.as_str(), "45-1_3");

    let fetcher = DetailFetcher::new(&upstream, &store, &config);
    let outcome = fetcher
        .fetch_all(&detection.new_votes, &mut index, &CancellationToken::new())
        .await;

    assert_eq!(outcome.written, vec![VoteId::from_raw("45-1_3")]);
    assert_eq!(upstream.detail_fetches(), 1);
    assert!(store.item_exists(ArtifactKind::VoteDetails, "45-1_3"));
    assert!(!store.item_exists(ArtifactKind::VoteDetails, "45-1_1"));
    assert!(index.contains(&VoteId::from_raw("45-1_3")));
}

#[tokio::test]
async fn test_fetched_detail_combines_vote_and_ballots() {
    let (_dir, store) = test_store();
    let upstream = three_vote_upstream();
    let config = quick_sync_config();
    let mut index = VoteCacheIndex::default();

    let summaries = upstream.recent_votes(10).await.unwrap();
    let detection = detect_new_votes(&summaries, &index, None);
    DetailFetcher::new(&upstream, &store, &config)
        .fetch_all(&detection.new_votes, &mut index, &CancellationToken::new())
        .await;

    let detail = store
        .load_item::<VoteDetail>(ArtifactKind::VoteDetails, "45-1_2")
        .unwrap()
        .payload;
    assert_eq!(detail.vote.date, "2025-06-02");
    assert_eq!(detail.total_ballots, 2);
    assert_eq!(detail.ballots[0].ballot, "Yes");

    // The index was persisted batch by batch
    let persisted = load_index(&store);
    assert_eq!(persisted.len(), 3);
    assert_eq!(persisted.total_cached, 3);
}

#[tokio::test]
async fn test_failed_fetch_stays_out_of_the_index() {
    let (_dir, store) = test_store();
    let upstream = three_vote_upstream();
    upstream.fail_vote("/votes/45-1/2/");
    let config = quick_sync_config();
    let mut index = VoteCacheIndex::default();

    let summaries = upstream.recent_votes(10).await.unwrap();
    let detection = detect_new_votes(&summaries, &index, None);
    let outcome = DetailFetcher::new(&upstream, &store, &config)
        .fetch_all(&detection.new_votes, &mut index, &CancellationToken::new())
        .await;

    assert_eq!(outcome.written.len(), 2);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].0.as_str(), "45-1_2");
    assert!(!index.contains(&VoteId::from_raw("45-1_2")));
    assert!(!store.item_exists(ArtifactKind::VoteDetails, "45-1_2"));

    // Next pass picks up only the failed vote
    let retry = detect_new_votes(&summaries, &index, None);
    assert_eq!(retry.new_votes.len(), 1);
    assert_eq!(retry.new_votes[0].id.as_str(), "45-1_2");
}

#[tokio::test]
async fn test_cancelled_before_start_writes_nothing() {
    let (_dir, store) = test_store();
    let upstream = three_vote_upstream();
    let config = quick_sync_config();
    let mut index = VoteCacheIndex::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summaries = upstream.recent_votes(10).await.unwrap();
    let detection = detect_new_votes(&summaries, &index, None);
    let outcome = DetailFetcher::new(&upstream, &store, &config)
        .fetch_all(&detection.new_votes, &mut index, &cancel)
        .await;

    assert!(outcome.cancelled);
    assert!(outcome.written.is_empty());
    assert_eq!(upstream.detail_fetches(), 0);
    assert!(store.list_items(ArtifactKind::VoteDetails).is_empty());
}

#[tokio::test]
async fn test_watermark_catches_votes_after_index_loss() {
    let upstream = three_vote_upstream();
    let summaries = upstream.recent_votes(10).await.unwrap();
    let index = indexed(&["45-1_1", "45-1_2", "45-1_3"]);

    // Everything indexed: only summaries strictly after the watermark count
    let detection = detect_new_votes(&summaries, &index, Some("2025-06-02"));
    assert!(detection.via_watermark);
    assert_eq!(detection.new_votes.len(), 1);
    assert_eq!(detection.new_votes[0].id.as_str(), "45-1_3");

    let detection = detect_new_votes(&summaries, &index, Some("2025-06-03"));
    assert!(detection.new_votes.is_empty());
    assert!(!detection.via_watermark);
}

#[test]
fn test_every_index_entry_has_a_file() {
    let (_dir, store) = test_store();
    let v = vote("45-1", 7, "2025-06-07");
    seed_detail(&store, &v, vec![ballot_for("alice-ng", "Yes")]);

    let mut index = indexed(&["45-1_7", "45-1_8"]);
    let dropped = index.reconcile(|id| store.item_exists(ArtifactKind::VoteDetails, id));
    persist_index(&store, &mut index).unwrap();

    assert_eq!(dropped, vec!["45-1_8".to_string()]);
    let reloaded = load_index(&store);
    assert!(reloaded
        .ids()
        .all(|id| store.item_exists(ArtifactKind::VoteDetails, id.as_str())));
}
