//! Batch requests: many independent REST calls in one round trip.

use std::sync::Arc;

use cloudsdk_core::{ApiRequest, RequestError, Resource};
use tracing::debug;

use crate::transport::{BatchTransport, TransportError};

/// Calls per round trip unless configured otherwise.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 200;

/// Responses of one batch, positionally matching its requests.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// `responses[i]` answers `requests[i]`; `None` if that request failed.
    pub responses: Vec<Option<Resource>>,
    /// One entry per failed request, in request order.
    pub errors: Vec<RequestError>,
}

/// Sends request sets through a [`BatchTransport`] and splits the results
/// into payloads and error descriptors.
///
/// Performs no retries: a failure is reported once and left to the caller.
#[derive(Clone)]
pub struct BatchRequester {
    transport: Arc<dyn BatchTransport>,
    batch_url: String,
    max_batch_size: usize,
}

impl BatchRequester {
    #[must_use]
    pub fn new(transport: Arc<dyn BatchTransport>, batch_url: impl Into<String>) -> Self {
        Self {
            transport,
            batch_url: batch_url.into(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }

    /// Caps how many calls go into one round trip. Zero is treated as one.
    #[must_use]
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    /// Sends `requests` in as few batches as the size cap allows.
    ///
    /// Requests that cannot be rendered are reported without being sent. If
    /// a batch as a whole fails, every request sent in it is reported with
    /// that failure. An empty (or fully unrenderable) request set makes no
    /// network call.
    pub async fn make_requests(&self, requests: &[ApiRequest]) -> BatchOutcome {
        debug!(count = requests.len(), "Starting batch request...");

        let mut responses: Vec<Option<Resource>> = vec![None; requests.len()];
        let mut failures: Vec<Option<RequestError>> = vec![None; requests.len()];
        let mut calls = Vec::with_capacity(requests.len());
        let mut slots = Vec::with_capacity(requests.len());

        for (index, request) in requests.iter().enumerate() {
            debug!(%request, "Adding request");
            match request.render() {
                Ok(call) => {
                    calls.push(call);
                    slots.push(index);
                }
                Err(e) => failures[index] = Some(RequestError::uncoded(e.to_string())),
            }
        }

        for (chunk, chunk_slots) in calls
            .chunks(self.max_batch_size)
            .zip(slots.chunks(self.max_batch_size))
        {
            debug!(count = chunk.len(), "Making batch request...");
            match self.transport.execute(&self.batch_url, chunk).await {
                Ok(sub_responses) => {
                    let mut sub_responses = sub_responses.into_iter();
                    for &slot in chunk_slots {
                        match sub_responses.next() {
                            Some(Ok(value)) => responses[slot] = Some(value),
                            Some(Err(e)) => {
                                debug!(error = %e, "Error response");
                                failures[slot] = Some(extract_error(&e));
                            }
                            None => {
                                failures[slot] = Some(RequestError::uncoded(
                                    "batch response is missing a sub-response",
                                ));
                            }
                        }
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Batch request failed");
                    let error = extract_error(&e);
                    for &slot in chunk_slots {
                        failures[slot] = Some(error.clone());
                    }
                }
            }
        }

        let errors: Vec<RequestError> = failures.into_iter().flatten().collect();
        debug!(
            responses = responses.iter().filter(|r| r.is_some()).count(),
            errors = errors.len(),
            "Batch request done"
        );
        BatchOutcome { responses, errors }
    }
}

/// Turns a transport failure into a `(code, message)` descriptor.
///
/// HTTP errors surface the JSON `error.message` when the body has one and
/// the raw body otherwise; anything else carries no status code.
#[must_use]
pub fn extract_error(error: &TransportError) -> RequestError {
    match error {
        TransportError::Http { status, content } => {
            let message = serde_json::from_str::<serde_json::Value>(content)
                .ok()
                .and_then(|data| {
                    data.get("error")?
                        .get("message")?
                        .as_str()
                        .map(str::to_string)
                });
            RequestError::new(Some(*status), message.unwrap_or_else(|| content.clone()))
        }
        other => RequestError::uncoded(other.to_string()),
    }
}
