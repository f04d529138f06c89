//! The immutable `(service, method, payload)` request triple.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::service::{RenderError, RenderedCall, ServiceDescriptor};

/// Parameter carrying the pagination token of list calls.
pub const PAGE_TOKEN_PARAM: &str = "pageToken";

/// Parameter carrying the project of every Compute call.
pub const PROJECT_PARAM: &str = "project";

// ---------------------------------------------------------------------------
// Method
// ---------------------------------------------------------------------------

/// Method of a service a request dispatches to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    List,
    AggregatedList,
    Insert,
    Delete,
    Update,
    Patch,
    /// Custom verb such as `setMetadata` or `createSnapshot`.
    Custom(String),
}

impl Method {
    /// Whether responses to this method are paginated listings.
    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List | Self::AggregatedList)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "Get",
            Self::List => "List",
            Self::AggregatedList => "AggregatedList",
            Self::Insert => "Insert",
            Self::Delete => "Delete",
            Self::Update => "Update",
            Self::Patch => "Patch",
            Self::Custom(verb) => verb,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RequestPayload
// ---------------------------------------------------------------------------

/// Named parameters plus an optional JSON body.
///
/// Parameters consumed by the service's path template become path segments;
/// the remainder (e.g. `filter`, `maxResults`, `pageToken`) become the query
/// string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestPayload {
    params: BTreeMap<String, String>,
    body: Option<serde_json::Value>,
}

impl RequestPayload {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload scoped to `project`, the starting point of every Compute call.
    #[must_use]
    pub fn for_project(project: impl Into<String>) -> Self {
        Self::new().with_param(PROJECT_PARAM, project)
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn project(&self) -> Option<&str> {
        self.param(PROJECT_PARAM)
    }

    #[must_use]
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    #[must_use]
    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }
}

// ---------------------------------------------------------------------------
// ApiRequest
// ---------------------------------------------------------------------------

/// One REST call: which service, which method, with which payload.
///
/// Requests are never mutated; pagination builds a fresh copy with the
/// token substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    service: Arc<ServiceDescriptor>,
    method: Method,
    payload: RequestPayload,
}

impl ApiRequest {
    #[must_use]
    pub fn new(service: Arc<ServiceDescriptor>, method: Method, payload: RequestPayload) -> Self {
        Self {
            service,
            method,
            payload,
        }
    }

    #[must_use]
    pub fn service(&self) -> &Arc<ServiceDescriptor> {
        &self.service
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn payload(&self) -> &RequestPayload {
        &self.payload
    }

    /// Copy of this request asking for the page identified by `token`.
    #[must_use]
    pub fn with_page_token(&self, token: &str) -> Self {
        Self {
            service: Arc::clone(&self.service),
            method: self.method.clone(),
            payload: self.payload.clone().with_param(PAGE_TOKEN_PARAM, token),
        }
    }

    /// Renders the request into an HTTP method, path, query, and body.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::MissingParam` when a path parameter the service
    /// needs is absent from the payload.
    pub fn render(&self) -> Result<RenderedCall, RenderError> {
        self.service.render(&self.method, &self.payload)
    }
}

impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({:?})", self.service.name(), self.method, self.payload.params)
    }
}
