//! Bills

use super::LocalizedText;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Upstream bill record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<LocalizedText>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introduced: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}
