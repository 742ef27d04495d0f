//! Party-line analytics: report document, per-MP records and the run checkpoint

use super::{percentage, round1};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Document name of the report under the cache root
pub const PARTY_LINE_REPORT: &str = "party_line_stats";
/// Document name of the in-progress checkpoint
pub const PARTY_LINE_CHECKPOINT: &str = "party_line_checkpoint";

pub const METHODOLOGY: &str = "actual_party_majority";
/// Most recent discipline breaks kept per record
pub const MAX_DISCIPLINE_BREAKS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisciplineBreak {
    pub vote_id: String,
    pub mp_vote: String,
    pub party_position: String,
    pub party_cohesion: f64,
    pub date: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionLoyalty {
    pub party_line: u32,
    pub total: u32,
    pub percentage: f64,
}

impl SessionLoyalty {
    pub fn record(&mut self, with_party: bool) {
        self.total += 1;
        if with_party {
            self.party_line += 1;
        }
        self.percentage = percentage(self.party_line, self.total);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyLineRecord {
    pub mp_slug: String,
    pub mp_party: String,
    pub party_line_votes: u32,
    pub total_eligible_votes: u32,
    pub party_line_percentage: f64,
    pub party_discipline_breaks: Vec<DisciplineBreak>,
    pub party_loyalty_by_session: BTreeMap<String, SessionLoyalty>,
    pub avg_party_cohesion: f64,
    /// Sum of per-vote cohesion values, kept so later votes can be folded in
    #[serde(default)]
    pub cohesion_sum: f64,
    pub methodology: String,
    pub calculated_at: String,
}

impl PartyLineRecord {
    pub fn new(mp_slug: impl Into<String>, mp_party: impl Into<String>) -> Self {
        Self {
            mp_slug: mp_slug.into(),
            mp_party: mp_party.into(),
            party_line_votes: 0,
            total_eligible_votes: 0,
            party_line_percentage: 0.0,
            party_discipline_breaks: Vec::new(),
            party_loyalty_by_session: BTreeMap::new(),
            avg_party_cohesion: 0.0,
            cohesion_sum: 0.0,
            methodology: METHODOLOGY.to_string(),
            calculated_at: String::new(),
        }
    }

    /// Fold one eligible vote into the totals
    pub fn record_eligible(&mut self, session: &str, with_party: bool, cohesion: f64) {
        self.total_eligible_votes += 1;
        if with_party {
            self.party_line_votes += 1;
        }
        self.cohesion_sum += cohesion;
        self.party_loyalty_by_session
            .entry(session.to_string())
            .or_default()
            .record(with_party);
    }

    /// Add breaks, keeping the most recent [`MAX_DISCIPLINE_BREAKS`]
    pub fn add_breaks(&mut self, breaks: Vec<DisciplineBreak>) {
        if breaks.is_empty() {
            return;
        }
        self.party_discipline_breaks.extend(breaks);
        // Stable sort keeps processing order among same-date breaks
        self.party_discipline_breaks
            .sort_by(|a, b| b.date.cmp(&a.date));
        self.party_discipline_breaks.truncate(MAX_DISCIPLINE_BREAKS);
    }

    /// Recompute derived percentages and stamp the record
    pub fn finish(&mut self, calculated_at: String) {
        self.party_line_percentage = percentage(self.party_line_votes, self.total_eligible_votes);
        self.avg_party_cohesion = if self.total_eligible_votes == 0 {
            0.0
        } else {
            round1(self.cohesion_sum / f64::from(self.total_eligible_votes))
        };
        self.calculated_at = calculated_at;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartyLineSummary {
    pub total_mps_analyzed: usize,
    pub total_votes_analyzed: usize,
    pub avg_party_line_percentage: f64,
    pub calculation_date: String,
    /// RFC 3339 expiry of the whole report
    pub cache_expires: String,
    #[serde(default)]
    pub sessions_analyzed: Vec<String>,
}

/// Aggregate over every legislator's bucket for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub mps: usize,
    pub party_line: u32,
    pub total: u32,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartyLineReport {
    #[serde(default)]
    pub summary: PartyLineSummary,
    #[serde(default)]
    pub mp_stats: BTreeMap<String, PartyLineRecord>,
    #[serde(default)]
    pub session_summary: BTreeMap<String, SessionSummary>,
    /// Vote ids already folded into `mp_stats`
    #[serde(default)]
    pub analyzed_votes: BTreeSet<String>,
}

impl PartyLineReport {
    /// Rebuild `session_summary` from the per-MP buckets
    pub fn rebuild_session_summary(&mut self) {
        let mut sessions: BTreeMap<String, SessionSummary> = BTreeMap::new();
        for record in self.mp_stats.values() {
            for (session, loyalty) in &record.party_loyalty_by_session {
                let entry = sessions.entry(session.clone()).or_default();
                entry.mps += 1;
                entry.party_line += loyalty.party_line;
                entry.total += loyalty.total;
            }
        }
        for summary in sessions.values_mut() {
            summary.percentage = percentage(summary.party_line, summary.total);
        }
        self.session_summary = sessions;
    }

    /// Mean of per-MP party-line percentages
    pub fn average_party_line_percentage(&self) -> f64 {
        if self.mp_stats.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.mp_stats.values().map(|r| r.party_line_percentage).sum();
        round1(sum / self.mp_stats.len() as f64)
    }
}

/// What an analytics run is doing, persisted so an interrupted run resumes
/// the same work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisPlan {
    /// Compute every legislator from the whole corpus
    Full,
    /// Fold the listed votes into existing records
    Extend { votes: BTreeSet<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyLineCheckpoint {
    pub run_id: String,
    pub plan: AnalysisPlan,
    /// Legislator slugs whose result is already in the report
    #[serde(default)]
    pub completed: BTreeSet<String>,
    #[serde(default)]
    pub updated: String,
}

impl PartyLineCheckpoint {
    pub fn new(run_id: impl Into<String>, plan: AnalysisPlan) -> Self {
        Self {
            run_id: run_id.into(),
            plan,
            completed: BTreeSet::new(),
            updated: String::new(),
        }
    }

    pub fn is_done(&self, slug: &str) -> bool {
        self.completed.contains(slug)
    }
}
