//! Legislator lookup and ballot ownership / party resolution
//!
//! Ballot payloads are loosely shaped: most carry `politician_url`, some only
//! slug or name fields, some carry party fields directly. Every lookup here
//! walks an explicit, ordered resolution chain.

use mpmon_common::models::{slug_from_url, Ballot, Politician};
use std::collections::{BTreeMap, HashMap};

/// Slug fields checked on a ballot, in order
const SLUG_FIELDS: [&str; 4] = ["mp_slug", "politician_slug", "politician.slug", "slug"];
/// Name fields checked on a ballot, in order
const NAME_FIELDS: [&str; 4] = ["mp_name", "politician_name", "politician.name", "name"];
/// Party fields checked on a ballot, in order
const PARTY_FIELDS: [&str; 5] = [
    "mp_party",
    "politician_party",
    "party",
    "politician.current_party.short_name.en",
    "politician.party",
];

/// How a ballot owner was identified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Url,
    Slug,
    Name,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub slug: String,
    pub url: String,
    pub name: String,
    pub party: Option<String>,
    pub current: bool,
}

impl Member {
    fn from_politician(p: &Politician, current: bool) -> Self {
        Self {
            slug: p.slug(),
            url: p.url.clone(),
            name: p.name.clone(),
            party: p.party().map(normalize_party),
            current,
        }
    }
}

/// Current roster merged with historical members; current entries win
#[derive(Debug, Default)]
pub struct MemberDirectory {
    members: BTreeMap<String, Member>,
    by_url: HashMap<String, String>,
}

impl MemberDirectory {
    pub fn new(current: &[Politician], historical: &[Politician]) -> Self {
        let mut directory = Self::default();
        for p in historical {
            directory.insert(Member::from_politician(p, false));
        }
        for p in current {
            directory.insert(Member::from_politician(p, true));
        }
        directory
    }

    fn insert(&mut self, member: Member) {
        if member.slug.is_empty() {
            return;
        }
        self.by_url.insert(member.url.clone(), member.slug.clone());
        self.members.insert(member.slug.clone(), member);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, slug: &str) -> Option<&Member> {
        self.members.get(slug)
    }

    pub fn by_url(&self, url: &str) -> Option<&Member> {
        self.by_url.get(url).and_then(|slug| self.members.get(slug))
    }

    /// Members of the current roster, ordered by slug
    pub fn current(&self) -> impl Iterator<Item = &Member> {
        self.members.values().filter(|m| m.current)
    }

    /// Current and historical members, ordered by slug
    pub fn all(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Resolve who cast a ballot
    ///
    /// Returns the member slug and how it matched. Ballots whose URL or slug
    /// names someone outside the directory still resolve to that slug
    /// (`matched = None`) so their ballots are not lost; callers count those as
    /// unmatched.
    pub fn resolve_owner(&self, ballot: &Ballot) -> Option<(String, Option<MatchKind>)> {
        if let Some(url) = ballot.politician_url.as_deref() {
            if let Some(member) = self.by_url(url) {
                return Some((member.slug.clone(), Some(MatchKind::Url)));
            }
        }
        for slug in SLUG_FIELDS.iter().filter_map(|f| ballot.field(f)) {
            if self.members.contains_key(slug) {
                return Some((slug.to_string(), Some(MatchKind::Slug)));
            }
        }
        let names: Vec<String> = NAME_FIELDS
            .iter()
            .filter_map(|f| ballot.field(f))
            .map(str::to_lowercase)
            .collect();
        if !names.is_empty() {
            for member in self.members.values() {
                let needle = member.slug.replace('-', " ").to_lowercase();
                if names.iter().any(|n| n.contains(&needle)) {
                    return Some((member.slug.clone(), Some(MatchKind::Name)));
                }
            }
        }

        // Outside the directory: keep the identity the ballot itself gives
        if let Some(url) = ballot.politician_url.as_deref() {
            let slug = slug_from_url(url);
            if !slug.is_empty() {
                return Some((slug, None));
            }
        }
        SLUG_FIELDS
            .iter()
            .find_map(|f| ballot.field(f))
            .map(|s| (s.to_string(), None))
    }

    /// Normalized party of a ballot's owner: ballot fields, then directory by URL
    pub fn ballot_party(&self, ballot: &Ballot) -> Option<String> {
        if let Some(raw) = PARTY_FIELDS.iter().find_map(|f| ballot.field(f)) {
            return Some(normalize_party(raw));
        }
        let url = ballot.politician_url.as_deref()?;
        self.by_url(url).and_then(|m| m.party.clone())
    }
}

/// Fold party name variants onto one label
pub fn normalize_party(raw: &str) -> String {
    let party = raw.trim();
    let lower = party.to_lowercase();

    if lower.contains("conservative") || lower.contains("cpc") || lower.contains("tory") {
        "Conservative".to_string()
    } else if lower.contains("liberal") && !lower.contains("new") {
        "Liberal".to_string()
    } else if lower.contains("ndp") || lower.contains("new democrat") {
        "NDP".to_string()
    } else if lower.contains("bloc") || lower == "bq" {
        "Bloc".to_string()
    } else if lower.contains("green") {
        "Green".to_string()
    } else if lower.contains("independent") || lower.contains("non-affiliated") {
        "Independent".to_string()
    } else {
        party.to_string()
    }
}
