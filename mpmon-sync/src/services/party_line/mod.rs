//! Party-line analytics engine
//!
//! Computes, for each current legislator and each historical legislator with
//! ballots in the corpus, how often they voted with their party's majority.
//! Work happens one legislator at a time over the vote detail corpus:
//!
//! 1. One streaming pass builds the participation index (which votes each
//!    legislator cast a ballot in) and the per-vote party tallies. Vote ids
//!    and sessions are interned; each ballot costs one small `Copy` entry and
//!    a legislator's list is trimmed to the newest `max_votes_per_mp` votes
//!    while the pass runs.
//! 2. Each legislator's candidate votes, newest session first, are folded
//!    into a [`PartyLineRecord`] and then dropped from the index.
//! 3. The record is merged into the report on disk and the legislator is
//!    added to the checkpoint, so an interrupted run resumes where it stopped.
//!
//! A party's position in a vote is `Yes` when its Yes ballots outnumber its
//! No ballots, otherwise `No`; with no Yes/No ballots at all the vote has no
//! position and counts for nobody in that party.

pub mod checkpoint;
pub mod memory_guard;

use crate::services::member_directory::{Member, MemberDirectory};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use memory_guard::MemoryGuard;
use mpmon_common::config::SyncConfig;
use mpmon_common::models::party_line::AnalysisPlan;
use mpmon_common::models::vote::compare_sessions;
use mpmon_common::models::{
    round1, BallotChoice, DisciplineBreak, PartyLineCheckpoint, PartyLineRecord, PartyLineReport,
    VoteDetail,
};
use mpmon_common::{time, ArtifactKind, CacheStore};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Yes/No ballots cast by one party in one vote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub yes: u32,
    pub no: u32,
}

impl Tally {
    pub fn add(&mut self, choice: BallotChoice) {
        match choice {
            BallotChoice::Yes => self.yes += 1,
            BallotChoice::No => self.no += 1,
            BallotChoice::Paired | BallotChoice::Absent => {}
        }
    }

    /// `None` when nobody in the party voted Yes or No
    pub fn majority(&self) -> Option<BallotChoice> {
        match (self.yes, self.no) {
            (0, 0) => None,
            (yes, no) if yes > no => Some(BallotChoice::Yes),
            _ => Some(BallotChoice::No),
        }
    }

    /// Share of the party's Yes/No ballots on the majority side, 1 dp
    pub fn cohesion(&self) -> Option<f64> {
        let total = self.yes + self.no;
        if total == 0 {
            return None;
        }
        let winning = self.yes.max(self.no);
        Some(round1(f64::from(winning) / f64::from(total) * 100.0))
    }
}

/// What the engine reads from one vote detail
#[derive(Debug, Clone)]
struct VoteFacts {
    date: String,
    description: String,
    tallies: HashMap<String, Tally>,
}

/// Votes of the corpus in scan order, with sessions interned
#[derive(Debug, Default)]
struct CorpusIndex {
    votes: Vec<IndexedVote>,
    sessions: Vec<String>,
    session_ids: HashMap<String, u32>,
}

#[derive(Debug)]
struct IndexedVote {
    id: String,
    session: u32,
    date: Option<NaiveDate>,
}

impl CorpusIndex {
    fn push(&mut self, id: String, session: &str, date: &str) -> u32 {
        let session = match self.session_ids.get(session) {
            Some(&idx) => idx,
            None => {
                let idx = self.sessions.len() as u32;
                self.sessions.push(session.to_string());
                self.session_ids.insert(session.to_string(), idx);
                idx
            }
        };
        self.votes.push(IndexedVote {
            id,
            session,
            date: time::parse_vote_date(date),
        });
        (self.votes.len() - 1) as u32
    }

    fn len(&self) -> usize {
        self.votes.len()
    }

    fn id(&self, vote: u32) -> &str {
        &self.votes[vote as usize].id
    }

    fn session(&self, vote: u32) -> &str {
        &self.sessions[self.votes[vote as usize].session as usize]
    }

    /// Newest session first, then newest date, then highest id
    fn newest_first(&self, a: u32, b: u32) -> Ordering {
        let (va, vb) = (&self.votes[a as usize], &self.votes[b as usize]);
        compare_sessions(self.session(b), self.session(a))
            .then_with(|| vb.date.cmp(&va.date))
            .then_with(|| vb.id.cmp(&va.id))
    }

    fn ids(&self) -> BTreeSet<String> {
        self.votes.iter().map(|v| v.id.clone()).collect()
    }
}

/// One ballot cast by a tracked legislator
#[derive(Debug, Clone, Copy)]
struct Participation {
    vote: u32,
    choice: BallotChoice,
}

/// What the corpus says about one legislator
#[derive(Debug, Default)]
struct Gathered {
    entries: Vec<Participation>,
    /// First party named on their own ballots, kept only when the directory has none
    ballot_party: Option<String>,
}

impl Gathered {
    /// Order newest first, drop repeats and keep at most `cap`
    fn trim(&mut self, corpus: &CorpusIndex, cap: usize) {
        self.entries.sort_by(|a, b| corpus.newest_first(a.vote, b.vote));
        self.entries.dedup_by_key(|p| p.vote);
        self.entries.truncate(cap);
    }
}

/// Which work the engine should do
#[derive(Debug, Clone, PartialEq)]
pub enum PlanChoice {
    /// Continue an interrupted run
    Resume(PartyLineCheckpoint),
    /// Start a new run; `discard` clears existing records first
    Start { plan: AnalysisPlan, discard: bool },
    /// Report is current and nothing is pending
    UpToDate,
}

impl PlanChoice {
    pub fn label(&self) -> String {
        match self {
            PlanChoice::Resume(cp) => format!("resume {}", plan_label(&cp.plan)),
            PlanChoice::Start { plan, discard: true } => format!("recompute {}", plan_label(plan)),
            PlanChoice::Start { plan, .. } => plan_label(plan),
            PlanChoice::UpToDate => "up to date".to_string(),
        }
    }
}

fn plan_label(plan: &AnalysisPlan) -> String {
    match plan {
        AnalysisPlan::Full => "full".to_string(),
        AnalysisPlan::Extend { votes } => format!("extend ({} votes)", votes.len()),
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnalyticsOutcome {
    pub plan: String,
    pub mps_computed: usize,
    /// Already done by the run being resumed
    pub mps_resumed: usize,
    pub mps_without_party: usize,
    pub votes_indexed: usize,
    pub memory_reclaims: usize,
    pub write_failures: usize,
    pub completed: bool,
    pub cancelled: bool,
}

pub struct PartyLineEngine<'a> {
    store: &'a CacheStore,
    directory: &'a MemberDirectory,
    config: &'a SyncConfig,
    max_mps: Option<usize>,
}

impl<'a> PartyLineEngine<'a> {
    pub fn new(
        store: &'a CacheStore,
        directory: &'a MemberDirectory,
        config: &'a SyncConfig,
        max_mps: Option<usize>,
    ) -> Self {
        Self {
            store,
            directory,
            config,
            max_mps,
        }
    }

    /// Decide what to do this run
    ///
    /// `recompute` throws away prior results. Otherwise an interrupted run is
    /// resumed, votes missing from `analyzed_votes` are folded in, and a stale
    /// report is recomputed only when `refresh_stale` is set.
    pub fn select_plan(&self, recompute: bool, refresh_stale: bool) -> PlanChoice {
        if recompute {
            return PlanChoice::Start {
                plan: AnalysisPlan::Full,
                discard: true,
            };
        }
        if let Some(cp) = checkpoint::load_checkpoint(self.store) {
            return PlanChoice::Resume(cp);
        }
        let report = match checkpoint::load_report(self.store) {
            Some(report) if !report.mp_stats.is_empty() => report,
            _ => {
                return PlanChoice::Start {
                    plan: AnalysisPlan::Full,
                    discard: false,
                }
            }
        };

        let pending: BTreeSet<String> = self
            .store
            .list_items(ArtifactKind::VoteDetails)
            .into_iter()
            .filter(|id| !report.analyzed_votes.contains(id))
            .collect();
        if !pending.is_empty() {
            return PlanChoice::Start {
                plan: AnalysisPlan::Extend { votes: pending },
                discard: false,
            };
        }
        if refresh_stale && !checkpoint::report_is_fresh_at(&report, time::now()) {
            return PlanChoice::Start {
                plan: AnalysisPlan::Full,
                discard: false,
            };
        }
        PlanChoice::UpToDate
    }

    pub fn run(&self, choice: PlanChoice, cancel: &CancellationToken) -> Result<AnalyticsOutcome> {
        let mut outcome = AnalyticsOutcome {
            plan: choice.label(),
            ..AnalyticsOutcome::default()
        };

        let mut cp = match choice {
            PlanChoice::UpToDate => {
                info!("Party-line report up to date");
                outcome.completed = true;
                return Ok(outcome);
            }
            PlanChoice::Resume(cp) => {
                info!(run_id = %cp.run_id, done = cp.completed.len(), "Resuming party-line analysis");
                cp
            }
            PlanChoice::Start { plan, discard } => {
                if discard {
                    checkpoint::clear_checkpoint(self.store)?;
                    checkpoint::save_report(self.store, &PartyLineReport::default())
                        .context("discarding party-line records")?;
                }
                let mut cp = PartyLineCheckpoint::new(Uuid::new_v4().to_string(), plan);
                checkpoint::save_checkpoint(self.store, &mut cp).context("writing checkpoint")?;
                cp
            }
        };
        info!(plan = %outcome.plan, "Party-line analysis starting");

        let mut facts: HashMap<String, VoteFacts> = HashMap::new();
        let Some((mut gathered, corpus)) = self.index_corpus(&mut facts, cancel) else {
            outcome.cancelled = true;
            return Ok(outcome);
        };
        outcome.votes_indexed = corpus.len();

        let targets = self.targets(&gathered);
        let target_slugs: HashSet<&str> = targets.iter().map(|m| m.slug.as_str()).collect();
        gathered.retain(|slug, _| target_slugs.contains(slug.as_str()));

        let pending: Option<BTreeSet<String>> = match &cp.plan {
            AnalysisPlan::Full => None,
            AnalysisPlan::Extend { votes } => Some(votes.clone()),
        };
        let mut guard = MemoryGuard::new(self.config.memory_ceiling_mb, self.config.memory_check_interval);

        for member in &targets {
            if cancel.is_cancelled() {
                warn!(done = cp.completed.len(), "Party-line analysis interrupted");
                outcome.cancelled = true;
                break;
            }
            let mine = gathered.remove(&member.slug).unwrap_or_default();
            if cp.is_done(&member.slug) {
                outcome.mps_resumed += 1;
                continue;
            }

            let Some(party) = member.party.clone().or(mine.ballot_party) else {
                debug!(mp = %member.slug, "No party known, skipping");
                outcome.mps_without_party += 1;
                cp.completed.insert(member.slug.clone());
                checkpoint::save_checkpoint(self.store, &mut cp)?;
                continue;
            };

            let mut report = checkpoint::load_report(self.store).unwrap_or_default();
            let existing = report.mp_stats.remove(&member.slug);
            let record = match (pending.as_ref(), existing) {
                (Some(votes), Some(mut record)) => {
                    let fresh: Vec<Participation> = mine
                        .entries
                        .iter()
                        .filter(|p| votes.contains(corpus.id(p.vote)))
                        .copied()
                        .collect();
                    self.fold(&mut record, &party, &fresh, &corpus, &mut facts);
                    record
                }
                _ => {
                    let mut record = PartyLineRecord::new(member.slug.clone(), party.clone());
                    self.fold(&mut record, &party, &mine.entries, &corpus, &mut facts);
                    record
                }
            };

            debug!(
                mp = %member.slug,
                eligible = record.total_eligible_votes,
                party_line = record.party_line_votes,
                "Party-line record computed"
            );
            report.mp_stats.insert(member.slug.clone(), record);
            if let Err(e) = checkpoint::save_report(self.store, &report) {
                warn!(mp = %member.slug, error = %e, "Failed to save party-line record");
                outcome.write_failures += 1;
                continue;
            }
            cp.completed.insert(member.slug.clone());
            checkpoint::save_checkpoint(self.store, &mut cp)?;
            outcome.mps_computed += 1;

            if guard.tick() {
                facts.clear();
                facts.shrink_to_fit();
                gathered.shrink_to_fit();
            }
        }
        outcome.memory_reclaims = guard.reclaims();

        if outcome.cancelled || outcome.write_failures > 0 {
            info!(
                computed = outcome.mps_computed,
                write_failures = outcome.write_failures,
                "Party-line analysis left resumable"
            );
            return Ok(outcome);
        }

        self.finish(&cp, corpus.ids())?;
        outcome.completed = true;
        info!(
            computed = outcome.mps_computed,
            resumed = outcome.mps_resumed,
            without_party = outcome.mps_without_party,
            "Party-line analysis complete"
        );
        Ok(outcome)
    }

    /// Current legislators and historical ones with ballots, ordered by slug, capped by `max_mps`
    fn targets(&self, gathered: &HashMap<String, Gathered>) -> Vec<&'a Member> {
        let limit = self.max_mps.unwrap_or(usize::MAX);
        self.directory
            .all()
            .filter(|m| m.current || gathered.contains_key(&m.slug))
            .take(limit)
            .collect()
    }

    /// One pass over the corpus; `None` when cancelled part way
    ///
    /// Every directory member's ballots are gathered. A list is trimmed to the
    /// newest `max_votes_per_mp` votes whenever it reaches twice that.
    fn index_corpus(
        &self,
        facts: &mut HashMap<String, VoteFacts>,
        cancel: &CancellationToken,
    ) -> Option<(HashMap<String, Gathered>, CorpusIndex)> {
        let cap = self.config.max_votes_per_mp;
        let trim_at = cap.saturating_mul(2).max(1);
        let mut gathered: HashMap<String, Gathered> = HashMap::new();
        let mut corpus = CorpusIndex::default();

        for id in self.store.list_items(ArtifactKind::VoteDetails) {
            if cancel.is_cancelled() {
                return None;
            }
            let Some(envelope) = self.store.load_item::<VoteDetail>(ArtifactKind::VoteDetails, &id) else {
                debug!(vote_id = %id, "Skipping unreadable vote detail");
                continue;
            };
            let detail = envelope.payload;
            let vote = corpus.push(id.clone(), &detail.vote.session, &detail.vote.date);

            for ballot in &detail.ballots {
                if ballot.ballot.trim().is_empty() {
                    continue;
                }
                let Some((slug, _)) = self.directory.resolve_owner(ballot) else {
                    continue;
                };
                let Some(member) = self.directory.get(&slug) else {
                    continue;
                };
                let entry = gathered.entry(slug).or_default();
                if member.party.is_none() && entry.ballot_party.is_none() {
                    entry.ballot_party = self.directory.ballot_party(ballot);
                }
                entry.entries.push(Participation {
                    vote,
                    choice: ballot.choice(),
                });
                if entry.entries.len() >= trim_at {
                    entry.trim(&corpus, cap);
                }
            }
            facts.insert(id, self.facts_of(&detail));
        }

        for entry in gathered.values_mut() {
            entry.trim(&corpus, cap);
        }
        info!(
            votes = corpus.len(),
            mps = gathered.len(),
            "Participation index built"
        );
        Some((gathered, corpus))
    }

    fn facts_of(&self, detail: &VoteDetail) -> VoteFacts {
        let mut tallies: HashMap<String, Tally> = HashMap::new();
        for ballot in &detail.ballots {
            let choice = ballot.choice();
            if !choice.is_substantive() {
                continue;
            }
            if let Some(party) = self.directory.ballot_party(ballot) {
                tallies.entry(party).or_default().add(choice);
            }
        }
        VoteFacts {
            date: detail.vote.date.clone(),
            description: detail.vote.short_description(),
            tallies,
        }
    }

    /// Facts for a vote, reloading from disk after a reclaim
    fn facts_for<'f>(&self, vote_id: &str, cache: &'f mut HashMap<String, VoteFacts>) -> Option<&'f VoteFacts> {
        if !cache.contains_key(vote_id) {
            let detail = self
                .store
                .load_item::<VoteDetail>(ArtifactKind::VoteDetails, vote_id)?
                .payload;
            cache.insert(vote_id.to_string(), self.facts_of(&detail));
        }
        cache.get(vote_id)
    }

    fn fold(
        &self,
        record: &mut PartyLineRecord,
        party: &str,
        entries: &[Participation],
        corpus: &CorpusIndex,
        facts: &mut HashMap<String, VoteFacts>,
    ) {
        let mut breaks = Vec::new();
        for entry in entries {
            if !entry.choice.is_substantive() {
                continue;
            }
            let vote_id = corpus.id(entry.vote);
            let Some(vote) = self.facts_for(vote_id, facts) else {
                continue;
            };
            let Some(tally) = vote.tallies.get(party) else {
                continue;
            };
            let (Some(position), Some(cohesion)) = (tally.majority(), tally.cohesion()) else {
                continue;
            };

            let with_party = entry.choice == position;
            record.record_eligible(corpus.session(entry.vote), with_party, cohesion);
            if !with_party {
                breaks.push(DisciplineBreak {
                    vote_id: vote_id.to_string(),
                    mp_vote: entry.choice.as_str().to_string(),
                    party_position: position.as_str().to_string(),
                    party_cohesion: cohesion,
                    date: vote.date.clone(),
                    description: vote.description.clone(),
                });
            }
        }
        record.add_breaks(breaks);
        record.finish(time::timestamp_string(time::now()));
    }

    /// Stamp the summary, record analyzed votes and drop the checkpoint
    fn finish(&self, cp: &PartyLineCheckpoint, corpus: BTreeSet<String>) -> Result<()> {
        let mut report = checkpoint::load_report(self.store).unwrap_or_default();
        match &cp.plan {
            AnalysisPlan::Full => {
                report.mp_stats.retain(|slug, _| cp.completed.contains(slug));
                report.analyzed_votes = corpus;
            }
            AnalysisPlan::Extend { votes } => {
                report.analyzed_votes.extend(votes.iter().cloned());
            }
        }
        report.rebuild_session_summary();

        let now = time::now();
        let mut sessions: Vec<String> = report.session_summary.keys().cloned().collect();
        sessions.sort_by(|a, b| compare_sessions(b, a));
        report.summary.total_mps_analyzed = report.mp_stats.len();
        report.summary.total_votes_analyzed = report.analyzed_votes.len();
        report.summary.avg_party_line_percentage = report.average_party_line_percentage();
        report.summary.calculation_date = time::timestamp_string(now);
        report.summary.cache_expires = checkpoint::report_expiry(now);
        report.summary.sessions_analyzed = sessions;

        checkpoint::save_report(self.store, &report).context("saving party-line report")?;
        checkpoint::clear_checkpoint(self.store).context("clearing checkpoint")?;
        Ok(())
    }
}
