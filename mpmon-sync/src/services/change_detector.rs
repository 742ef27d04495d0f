//! Upstream change detection
//!
//! Compares the newest upstream vote summaries against the vote cache index.
//! Primary rule is an id diff. When that finds nothing, summaries dated
//! strictly after the local watermark are treated as new. The watermark is
//! the later of the newest date in the recent-votes artifact (as it was
//! before this run touched it) and the newest date in the index, so a vote
//! fetched through the wider detection window never looks new again.

use chrono::NaiveDate;
use mpmon_common::models::{Vote, VoteCacheIndex, VoteId};
use mpmon_common::time::parse_vote_date;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// A vote that needs its detail fetched
#[derive(Debug, Clone, PartialEq)]
pub struct NewVote {
    pub id: VoteId,
    pub summary: Vote,
}

#[derive(Debug, Clone, Default)]
pub struct Detection {
    /// Upstream order (newest first), de-duplicated
    pub new_votes: Vec<NewVote>,
    /// Summaries examined
    pub examined: usize,
    /// True when the date fallback produced the result
    pub via_watermark: bool,
}

/// Newest `YYYY-MM-DD` date among summaries
pub fn watermark(votes: &[Vote]) -> Option<String> {
    votes
        .iter()
        .filter_map(|v| parse_vote_date(&v.date))
        .max()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

pub fn detect_new_votes(
    upstream: &[Vote],
    index: &VoteCacheIndex,
    watermark: Option<&str>,
) -> Detection {
    let mut seen = HashSet::new();
    let identified: Vec<NewVote> = upstream
        .iter()
        .filter_map(|vote| match vote.id() {
            Some(id) => Some(NewVote {
                id,
                summary: vote.clone(),
            }),
            None => {
                warn!(url = %vote.url, "Upstream vote without a usable URL");
                None
            }
        })
        .filter(|nv| seen.insert(nv.id.clone()))
        .collect();

    let examined = identified.len();
    let by_id: Vec<NewVote> = identified
        .iter()
        .filter(|nv| !index.contains(&nv.id))
        .cloned()
        .collect();

    if !by_id.is_empty() {
        info!(new = by_id.len(), examined, "Detected new votes by id");
        return Detection {
            new_votes: by_id,
            examined,
            via_watermark: false,
        };
    }

    let local: Option<NaiveDate> = watermark.and_then(parse_vote_date);
    let Some(mark) = local.max(index.newest_date()) else {
        debug!(examined, "No new votes and no watermark");
        return Detection {
            examined,
            ..Detection::default()
        };
    };

    let by_date: Vec<NewVote> = identified
        .into_iter()
        .filter(|nv| parse_vote_date(&nv.summary.date).is_some_and(|d| d > mark))
        .collect();
    if !by_date.is_empty() {
        info!(new = by_date.len(), watermark = %mark, "Detected new votes by date watermark");
    }
    Detection {
        via_watermark: !by_date.is_empty(),
        new_votes: by_date,
        examined,
    }
}
