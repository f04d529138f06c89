//! The server-side `Operation` handle returned by asynchronous mutations.
//!
//! An Operation is created by the server when an insert/delete/update (or a
//! custom verb such as `setMetadata`) is accepted. The client never mutates
//! it; it re-fetches it until `status` is `DONE`.

use serde::{Deserialize, Serialize};

use crate::list::Warning;
use crate::path;
use crate::service::Scope;
use crate::types::RequestError;

/// Value of the `kind` field that identifies an Operation payload.
pub const OPERATION_KIND: &str = "compute#operation";

/// `operationType` of a deletion. Deleted resources are never fetched back.
pub const DELETE_OPERATION_TYPE: &str = "delete";

const HTTP_OK: u16 = 200;

/// Lifecycle state of an Operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Running,
    Done,
}

/// One entry of `error.errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationErrorDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// The structured `error` field of a failed Operation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperationErrorInfo {
    #[serde(default)]
    pub errors: Vec<OperationErrorDetail>,
}

/// An in-progress (or finished) asynchronous mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Operation id, used to re-poll it.
    pub name: String,
    pub status: OperationStatus,
    /// `insert`, `delete`, `update`, or a custom verb.
    #[serde(default)]
    pub operation_type: String,
    /// URI of the resource being mutated.
    #[serde(default)]
    pub target_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationErrorInfo>,
    /// Set by the server only when the operation did not succeed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_error_status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

impl Operation {
    /// Decodes `value` as an Operation when its `kind` says it is one.
    ///
    /// Returns `Ok(None)` for any other resource.
    ///
    /// # Errors
    ///
    /// Returns the decode error when the payload claims to be an Operation
    /// but does not match the Operation shape.
    pub fn from_resource(value: &serde_json::Value) -> Result<Option<Self>, serde_json::Error> {
        let is_operation = value
            .get("kind")
            .and_then(serde_json::Value::as_str)
            .is_some_and(|kind| kind == OPERATION_KIND);
        if !is_operation {
            return Ok(None);
        }
        Self::deserialize(value).map(Some)
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.status == OperationStatus::Done
    }

    #[must_use]
    pub fn is_delete(&self) -> bool {
        self.operation_type == DELETE_OPERATION_TYPE
    }

    /// Whether the finished operation left a resource worth fetching.
    ///
    /// `httpErrorStatusCode` is only reliable when set, so the `error`
    /// field is checked as well.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        let http_failed = self
            .http_error_status_code
            .is_some_and(|code| code != HTTP_OK);
        !http_failed && self.error.is_none()
    }

    /// Scope of the operation, derived from `zone`, then `region`.
    #[must_use]
    pub fn scope(&self) -> Scope {
        if let Some(zone) = self.zone.as_deref().filter(|z| !z.is_empty()) {
            Scope::Zone(path::name(zone).to_string())
        } else if let Some(region) = self.region.as_deref().filter(|r| !r.is_empty()) {
            Scope::Region(path::name(region).to_string())
        } else {
            Scope::Global
        }
    }

    /// Past-tense verb shown to the user once the operation is done.
    #[must_use]
    pub fn human_friendly_verb(&self) -> &'static str {
        match self.operation_type.as_str() {
            "insert" | "createSnapshot" => "Created",
            DELETE_OPERATION_TYPE => "Deleted",
            _ => "Updated",
        }
    }

    /// Messages of every `warnings` entry.
    pub fn warning_messages(&self) -> impl Iterator<Item = &str> {
        self.warnings.iter().map(|w| w.message.as_str())
    }

    /// One error descriptor per `error.errors` entry, tagged with
    /// `httpErrorStatusCode`.
    pub fn problems(&self) -> impl Iterator<Item = RequestError> + '_ {
        self.error
            .iter()
            .flat_map(|info| info.errors.iter())
            .map(|detail| RequestError::new(self.http_error_status_code, detail.message.clone()))
    }
}
