//! Politicians, votes and ballots for sync tests

use super::FakeUpstream;
use mpmon_common::config::SyncConfig;
use mpmon_common::models::{Ballot, Bill, Politician, Vote, VoteDetail};
use mpmon_common::{ArtifactKind, CacheStore};
use serde_json::json;
use tempfile::TempDir;

pub fn politician(slug: &str, name: &str, party: &str) -> Politician {
    serde_json::from_value(json!({
        "url": format!("/politicians/{}/", slug),
        "name": name,
        "current_party": {"short_name": {"en": party}}
    }))
    .unwrap()
}

/// Someone who sat in an earlier parliament; party only through memberships
pub fn former_politician(slug: &str, name: &str, party: &str) -> Politician {
    serde_json::from_value(json!({
        "url": format!("/politicians/{}/", slug),
        "name": name,
        "memberships": [{"party": {"short_name": {"en": party}}, "end_date": "2021-08-15"}]
    }))
    .unwrap()
}

pub fn vote(session: &str, number: u32, date: &str) -> Vote {
    serde_json::from_value(json!({
        "url": format!("/votes/{}/{}/", session, number),
        "session": session,
        "number": number,
        "date": date,
        "description": {"en": format!("Motion {} of {}", number, session), "fr": "Motion"},
        "result": "Passed"
    }))
    .unwrap()
}

pub fn vote_on_bill(session: &str, number: u32, date: &str, bill_url: &str) -> Vote {
    let mut v = vote(session, number, date);
    v.bill_url = Some(bill_url.to_string());
    v
}

pub fn ballot(value: serde_json::Value) -> Ballot {
    serde_json::from_value(value).unwrap()
}

pub fn ballot_for(slug: &str, choice: &str) -> Ballot {
    ballot(json!({
        "politician_url": format!("/politicians/{}/", slug),
        "ballot": choice
    }))
}

pub fn bill(session: &str, number: &str) -> Bill {
    serde_json::from_value(json!({
        "url": format!("/bills/{}/{}/", session, number),
        "session": session,
        "number": number
    }))
    .unwrap()
}

/// No pacing, small batches
pub fn quick_sync_config() -> SyncConfig {
    SyncConfig {
        request_delay_ms: 0,
        batch_delay_ms: 0,
        batch_size: 2,
        rebuild_batch: 2,
        memory_check_interval: 1,
        ..SyncConfig::default()
    }
}

pub fn test_store() -> (TempDir, CacheStore) {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(dir.path());
    store.ensure_layout().unwrap();
    (dir, store)
}

/// Write a vote detail straight into the corpus
pub fn seed_detail(store: &CacheStore, vote: &Vote, ballots: Vec<Ballot>) {
    let id = vote.id().unwrap();
    let detail = VoteDetail::new(vote.clone(), ballots, "2025-01-01T00:00:00+00:00".into());
    store
        .save_item(ArtifactKind::VoteDetails, id.as_str(), &detail)
        .unwrap();
}

/// Two parties, one former member, four votes over two sessions
///
/// | vote    | alice | bob | carol | dave | erin | frank |
/// |---------|-------|-----|-------|------|------|-------|
/// | 44-1/10 | Yes   | Yes | No    | No   | No   | Yes   |
/// | 45-1/1  | Yes   | Yes | Yes   | Yes  | No   |       |
/// | 45-1/2  | No    | No  | Yes   | Yes  | Yes  |       |
/// | 45-1/3  | Yes   | Yes | Yes   | No   | No   |       |
///
/// alice, bob, carol are NDP; dave, erin Liberal; frank a former Conservative.
/// carol breaks with the NDP on 44-1/10 and 45-1/2; dave breaks on 45-1/1,
/// where the Liberal tie resolves to No.
pub struct Corpus {
    pub roster: Vec<Politician>,
    pub former: Vec<Politician>,
    pub votes: Vec<(Vote, Vec<Ballot>)>,
    pub bills: Vec<Bill>,
}

impl Corpus {
    pub fn standard() -> Self {
        let roster = vec![
            politician("alice-ng", "Alice Ng", "NDP"),
            politician("bob-lee", "Bob Lee", "New Democratic Party"),
            politician("carol-diaz", "Carol Diaz", "NDP"),
            politician("dave-roy", "Dave Roy", "Liberal"),
            politician("erin-kay", "Erin Kay", "Liberal Party of Canada"),
        ];
        let former = vec![former_politician("frank-oak", "Frank Oak", "Conservative")];

        let rows: [(&str, u32, &str, Option<&str>, [&str; 6]); 4] = [
            ("44-1", 10, "2023-03-01", Some("/bills/44-1/C-1/"), ["Yes", "Yes", "No", "No", "No", "Yes"]),
            ("45-1", 1, "2025-06-01", None, ["Yes", "Yes", "Yes", "Yes", "No", ""]),
            ("45-1", 2, "2025-06-02", Some("/bills/45-1/C-2/"), ["No", "No", "Yes", "Yes", "Yes", ""]),
            ("45-1", 3, "2025-06-03", None, ["Yes", "Yes", "Yes", "No", "No", ""]),
        ];
        let slugs = ["alice-ng", "bob-lee", "carol-diaz", "dave-roy", "erin-kay", "frank-oak"];

        let votes = rows
            .iter()
            .map(|(session, number, date, bill_url, choices)| {
                let v = match bill_url {
                    Some(b) => vote_on_bill(session, *number, date, b),
                    None => vote(session, *number, date),
                };
                let ballots = slugs
                    .iter()
                    .zip(choices.iter())
                    .filter(|(_, c)| !c.is_empty())
                    .map(|(slug, c)| ballot_for(slug, c))
                    .collect();
                (v, ballots)
            })
            .collect();

        Self {
            roster,
            former,
            votes,
            bills: vec![bill("44-1", "C-1"), bill("45-1", "C-2"), bill("45-1", "C-3")],
        }
    }

    pub fn upstream(&self) -> FakeUpstream {
        let upstream = FakeUpstream::new();
        upstream.set_roster(self.roster.clone());
        for p in &self.former {
            upstream.add_former_member(p.clone());
        }
        for (v, ballots) in &self.votes {
            upstream.add_vote(v.clone(), ballots.clone());
        }
        upstream.set_bills(self.bills.clone());
        upstream
    }

    /// Roster and every vote detail, as if already mirrored
    pub fn seed_cache(&self, store: &CacheStore) {
        store.save(ArtifactKind::Politicians, &self.roster).unwrap();
        for (v, ballots) in &self.votes {
            seed_detail(store, v, ballots.clone());
        }
    }
}
