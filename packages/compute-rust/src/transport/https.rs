//! `reqwest`-backed batch transport.

use anyhow::Context;
use async_trait::async_trait;
use cloudsdk_core::RenderedCall;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use tracing::debug;

use super::multipart::{self, BatchPart};
use super::{BatchTransport, SubResponse, TransportError};
use crate::config::ComputeConfig;

/// Posts `multipart/mixed` batches to the batch endpoint over HTTPS.
pub struct HttpBatchTransport {
    client: Client,
    api_endpoint: Url,
    access_token: Option<String>,
}

impl HttpBatchTransport {
    /// Creates a transport from configuration.
    ///
    /// `access_token` is sent verbatim as a bearer token; obtaining and
    /// refreshing it is the caller's business.
    ///
    /// # Errors
    ///
    /// Returns an error if the API endpoint is not a valid URL or the HTTP
    /// client cannot be constructed.
    pub fn new(config: &ComputeConfig, access_token: Option<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let mut endpoint = config.api_endpoint.clone();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        let api_endpoint = Url::parse(&endpoint)
            .with_context(|| format!("Invalid API endpoint `{}`", config.api_endpoint))?;

        Ok(Self {
            client,
            api_endpoint,
            access_token,
        })
    }

    /// Origin-relative request line target of `call`, e.g.
    /// `/compute/v1/projects/p/zones/z/instances?maxResults=500`.
    fn target(&self, call: &RenderedCall) -> Result<String, TransportError> {
        let mut url = self
            .api_endpoint
            .join(&call.path)
            .map_err(|e| TransportError::Protocol(format!("bad path `{}`: {e}", call.path)))?;
        if !call.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&call.query);
        }
        Ok(match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        })
    }
}

#[async_trait]
impl BatchTransport for HttpBatchTransport {
    async fn execute(
        &self,
        batch_url: &str,
        calls: &[RenderedCall],
    ) -> Result<Vec<SubResponse>, TransportError> {
        let parts = calls
            .iter()
            .map(|call| {
                Ok(BatchPart {
                    method: &call.method,
                    target: self.target(call)?,
                    body: call.body.as_ref(),
                })
            })
            .collect::<Result<Vec<_>, TransportError>>()?;

        let boundary = multipart::new_boundary();
        let body = multipart::encode(&boundary, &parts);

        let mut request = self
            .client
            .post(batch_url)
            .header(CONTENT_TYPE, multipart::content_type(&boundary))
            .body(body);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        debug!(status = status.as_u16(), bytes = text.len(), "Batch response received");

        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                content: text,
            });
        }
        let content_type = content_type
            .ok_or_else(|| TransportError::Protocol("response without Content-Type".to_string()))?;
        multipart::decode(&content_type, &text, calls.len())
    }
}
