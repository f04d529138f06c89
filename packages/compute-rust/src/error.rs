//! Hard errors raised by this crate.
//!
//! Per-request failures are never raised; they are accumulated as
//! [`RequestError`](cloudsdk_core::RequestError) values. The types here
//! cover misuse of the API and the final decision to fail a command.

/// Errors from classifying a request set before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("all requests must be either list requests or non-list requests")]
    MixedRequestKinds,
}

/// Aggregated problems of a command, rendered as a titled list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ToolError(pub String);
