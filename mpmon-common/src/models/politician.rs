//! Legislators

use super::LocalizedText;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Slug from a politician URL: `/politicians/jane-doe/` -> `jane-doe`
pub fn slug_from_url(url: &str) -> String {
    let tail = match url.find("/politicians/") {
        Some(pos) => &url[pos + "/politicians/".len()..],
        None => url,
    };
    tail.replace('/', "")
}

/// Canonical politician URL for a slug
pub fn url_from_slug(slug: &str) -> String {
    format!("/politicians/{}/", slug)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<LocalizedText>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<LocalizedText>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PartyRef {
    /// English short name, falling back to the English long name
    pub fn label(&self) -> Option<&str> {
        self.short_name
            .as_ref()
            .and_then(|n| n.en.as_deref())
            .or_else(|| self.name.as_ref().and_then(|n| n.en.as_deref()))
            .filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party: Option<PartyRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Upstream politician record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Politician {
    pub url: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_party: Option<PartyRef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memberships: Vec<Membership>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Politician {
    pub fn slug(&self) -> String {
        slug_from_url(&self.url)
    }

    /// Current party; historical members fall back to their last membership
    pub fn party(&self) -> Option<&str> {
        self.current_party
            .as_ref()
            .and_then(PartyRef::label)
            .or_else(|| {
                self.memberships
                    .last()
                    .and_then(|m| m.party.as_ref())
                    .and_then(PartyRef::label)
            })
    }
}
