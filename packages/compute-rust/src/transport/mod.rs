//! The batch transport seam.
//!
//! A [`BatchTransport`] ships already-rendered REST calls to the batch
//! endpoint in one round trip and hands back one [`SubResponse`] per call,
//! in call order. The production implementation speaks `multipart/mixed`
//! over HTTPS ([`HttpBatchTransport`]); tests script responses in memory.

pub mod https;
pub mod multipart;

#[cfg(test)]
pub(crate) mod scripted;

use async_trait::async_trait;
use cloudsdk_core::{RenderedCall, Resource};

pub use self::https::HttpBatchTransport;

/// Outcome of one sub-request of a batch.
pub type SubResponse = Result<Resource, TransportError>;

/// Failures reported by a transport, either for a whole batch or for one
/// sub-request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {content}")]
    Http { status: u16, content: String },
    /// The request never produced an HTTP response.
    #[error("{0}")]
    Connection(String),
    /// The response could not be understood.
    #[error("malformed batch response: {0}")]
    Protocol(String),
}

/// Sends a set of independent REST calls as one batch.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    /// Executes `calls` against `batch_url`.
    ///
    /// On success the returned vector has exactly one entry per call, in the
    /// same order.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` when the batch as a whole fails; failures of
    /// individual calls are reported inside the returned vector instead.
    async fn execute(
        &self,
        batch_url: &str,
        calls: &[RenderedCall],
    ) -> Result<Vec<SubResponse>, TransportError>;
}
