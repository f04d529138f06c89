use std::fmt;

use serde::{Deserialize, Serialize};

/// A resource returned by the API, kept as its JSON representation.
///
/// Resources flow through the batching layer untouched; only Operations and
/// list envelopes are decoded into typed structs.
pub type Resource = serde_json::Value;

/// Soft error descriptor: `(http_status_code_or_none, message)`.
///
/// Accumulated by the batching and polling layers instead of being raised,
/// so that one failing request never hides the results of its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestError {
    /// HTTP status code, when the failure came from an HTTP response.
    pub code: Option<u16>,
    /// Human-readable message.
    pub message: String,
}

impl RequestError {
    /// Creates an error descriptor with an optional status code.
    #[must_use]
    pub fn new(code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates an error descriptor that has no HTTP status code.
    #[must_use]
    pub fn uncoded(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{code}] {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}
