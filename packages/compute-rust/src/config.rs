//! Configuration for the batching, listing, and polling layers.

use std::time::Duration;

use crate::batch::DEFAULT_MAX_BATCH_SIZE;

/// Top-level configuration for talking to the Compute API.
#[derive(Debug, Clone)]
pub struct ComputeConfig {
    /// Root URL that relative API paths are resolved against.
    pub api_endpoint: String,
    /// URL that batch requests are posted to.
    pub batch_url: String,
    /// API prefix of every path, e.g. `compute/v1`.
    pub api_root: String,
    /// Maximum time to wait for one batch round trip.
    pub request_timeout: Duration,
    /// Calls per batch; larger request sets are split.
    pub max_batch_size: usize,
    /// `maxResults` sent with every list call.
    pub max_results_per_page: u32,
    /// Operation polling settings.
    pub poller: PollerConfig,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            api_endpoint: "https://compute.googleapis.com/".to_string(),
            batch_url: "https://compute.googleapis.com/batch/compute/v1".to_string(),
            api_root: "compute/v1".to_string(),
            request_timeout: Duration::from_secs(60),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_results_per_page: 500,
            poller: PollerConfig::default(),
        }
    }
}

/// Controls how long and how often operations are polled.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Give up waiting after this long. Eleven minutes lets nearly all
    /// image creations finish.
    pub timeout: Duration,
    /// Ceiling of the linear backoff between poll rounds.
    pub max_time_between_polls: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60 * 11),
            max_time_between_polls: Duration::from_secs(5),
        }
    }
}
