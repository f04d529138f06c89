//! List and aggregated-list response envelopes.
//!
//! A `List` call returns a page of `items` plus an optional
//! `nextPageToken`. An `AggregatedList` call returns a map from scope name
//! (e.g. `zones/us-central1-a`) to a scoped list whose items live under the
//! collection's plural name (e.g. `instances`), alongside an optional
//! warning explaining why the scope is empty.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Resource;

/// Warning code the API sets on a scope it could not reach.
pub const UNREACHABLE: &str = "UNREACHABLE";

// ---------------------------------------------------------------------------
// Warning
// ---------------------------------------------------------------------------

/// Key/value detail attached to a warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningData {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Warning attached to an Operation or to one scope of an aggregated list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Warning {
    /// Machine-readable code, e.g. `UNREACHABLE` or `NO_RESULTS_ON_PAGE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<WarningData>,
}

impl Warning {
    /// Whether the API reported the scope as unreachable.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        self.code.as_deref() == Some(UNREACHABLE)
    }
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// One page of a `List` call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    #[serde(default)]
    pub items: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

// ---------------------------------------------------------------------------
// AggregatedList
// ---------------------------------------------------------------------------

/// The per-scope value of an aggregated list.
///
/// The item field name depends on the collection, so the items are kept in
/// a flattened map and looked up with [`ScopedList::items`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScopedList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<Warning>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl ScopedList {
    /// Items stored under `collection`. A missing or non-array field yields
    /// no items.
    #[must_use]
    pub fn items(&self, collection: &str) -> &[Resource] {
        match self.fields.get(collection) {
            Some(serde_json::Value::Array(items)) => items,
            _ => &[],
        }
    }
}

/// One page of an `AggregatedList` call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedListResponse {
    #[serde(default)]
    pub items: BTreeMap<String, ScopedList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Returns the page token only when it is present and non-empty.
fn non_empty(token: Option<&String>) -> Option<&str> {
    token.map(String::as_str).filter(|t| !t.is_empty())
}

impl ListResponse {
    /// Token for the next page, if the server returned a non-empty one.
    #[must_use]
    pub fn next_page(&self) -> Option<&str> {
        non_empty(self.next_page_token.as_ref())
    }
}

impl AggregatedListResponse {
    /// Token for the next page, if the server returned a non-empty one.
    #[must_use]
    pub fn next_page(&self) -> Option<&str> {
        non_empty(self.next_page_token.as_ref())
    }
}
