//! In-memory `ParliamentSource` with call counters

use async_trait::async_trait;
use mpmon_common::models::{Ballot, Bill, Politician, Vote};
use mpmon_sync::upstream::{ParliamentSource, UpstreamError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeUpstream {
    /// Newest first
    votes: Mutex<Vec<Vote>>,
    ballots: Mutex<HashMap<String, Vec<Ballot>>>,
    roster: Mutex<Vec<Politician>>,
    others: Mutex<HashMap<String, Politician>>,
    bills: Mutex<Vec<Bill>>,
    failing_votes: Mutex<HashSet<String>>,
    roster_down: Mutex<bool>,

    pub recent_votes_calls: AtomicU64,
    pub vote_calls: AtomicU64,
    pub ballot_calls: AtomicU64,
    pub roster_calls: AtomicU64,
    pub politician_calls: AtomicU64,
    pub bill_calls: AtomicU64,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a vote and its ballots; keeps the list newest first
    pub fn add_vote(&self, vote: Vote, ballots: Vec<Ballot>) {
        self.ballots.lock().unwrap().insert(vote.url.clone(), ballots);
        let mut votes = self.votes.lock().unwrap();
        votes.retain(|v| v.url != vote.url);
        votes.push(vote);
        votes.sort_by(|a, b| a.cmp_recency(b));
    }

    pub fn set_roster(&self, roster: Vec<Politician>) {
        *self.roster.lock().unwrap() = roster;
    }

    /// Politician reachable by URL but not on the roster
    pub fn add_former_member(&self, politician: Politician) {
        self.others
            .lock()
            .unwrap()
            .insert(politician.url.clone(), politician);
    }

    pub fn set_bills(&self, bills: Vec<Bill>) {
        *self.bills.lock().unwrap() = bills;
    }

    pub fn fail_vote(&self, url: &str) {
        self.failing_votes.lock().unwrap().insert(url.to_string());
    }

    pub fn set_roster_down(&self, down: bool) {
        *self.roster_down.lock().unwrap() = down;
    }

    pub fn detail_fetches(&self) -> u64 {
        self.vote_calls.load(Ordering::SeqCst)
    }

    fn total(&self) -> u64 {
        [
            &self.recent_votes_calls,
            &self.vote_calls,
            &self.ballot_calls,
            &self.roster_calls,
            &self.politician_calls,
            &self.bill_calls,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }
}

#[async_trait]
impl ParliamentSource for FakeUpstream {
    async fn recent_votes(&self, limit: usize) -> Result<Vec<Vote>, UpstreamError> {
        self.recent_votes_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.votes.lock().unwrap().iter().take(limit).cloned().collect())
    }

    async fn vote(&self, url: &str) -> Result<Vote, UpstreamError> {
        self.vote_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_votes.lock().unwrap().contains(url) {
            return Err(UpstreamError::ApiError(503, "unavailable".into()));
        }
        self.votes
            .lock()
            .unwrap()
            .iter()
            .find(|v| v.url == url)
            .cloned()
            .ok_or_else(|| UpstreamError::ApiError(404, url.to_string()))
    }

    async fn ballots(&self, vote_url: &str) -> Result<Vec<Ballot>, UpstreamError> {
        self.ballot_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .ballots
            .lock()
            .unwrap()
            .get(vote_url)
            .cloned()
            .unwrap_or_default())
    }

    async fn politicians(&self) -> Result<Vec<Politician>, UpstreamError> {
        self.roster_calls.fetch_add(1, Ordering::SeqCst);
        if *self.roster_down.lock().unwrap() {
            return Err(UpstreamError::NetworkError("connection refused".into()));
        }
        Ok(self.roster.lock().unwrap().clone())
    }

    async fn politician(&self, url: &str) -> Result<Politician, UpstreamError> {
        self.politician_calls.fetch_add(1, Ordering::SeqCst);
        let found = self.others.lock().unwrap().get(url).cloned().or_else(|| {
            self.roster
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.url == url)
                .cloned()
        });
        found.ok_or_else(|| UpstreamError::ApiError(404, url.to_string()))
    }

    async fn bills(&self) -> Result<Vec<Bill>, UpstreamError> {
        self.bill_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.bills.lock().unwrap().clone())
    }

    fn request_count(&self) -> u64 {
        self.total()
    }
}
