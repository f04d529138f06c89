//! Service descriptors and REST path rendering.
//!
//! A [`ServiceDescriptor`] names one collection of a REST API (e.g.
//! `instances` in `compute/v1`) together with how it is scoped. Rendering a
//! method against it produces the HTTP method and path the server expects:
//!
//! | Method           | HTTP   | Path                                              |
//! |------------------|--------|---------------------------------------------------|
//! | `Get`            | GET    | `projects/{project}/<scope>/{collection}/{name}`  |
//! | `List`           | GET    | `projects/{project}/<scope>/{collection}`         |
//! | `AggregatedList` | GET    | `projects/{project}/aggregated/{collection}`      |
//! | `Insert`         | POST   | `projects/{project}/<scope>/{collection}`         |
//! | `Delete`         | DELETE | `projects/{project}/<scope>/{collection}/{name}`  |
//! | `Update`         | PUT    | resource path                                     |
//! | `Patch`          | PATCH  | resource path                                     |
//! | custom `verb`    | POST   | `{resource path}/{verb}`                          |
//!
//! `<scope>` is `zones/{zone}`, `regions/{region}`, or `global`.

use std::collections::BTreeMap;

use crate::request::{Method, RequestPayload, PROJECT_PARAM};

pub const ZONE_OPERATIONS: &str = "zoneOperations";
pub const REGION_OPERATIONS: &str = "regionOperations";
pub const GLOBAL_OPERATIONS: &str = "globalOperations";

const ZONE_PARAM: &str = "zone";
const REGION_PARAM: &str = "region";

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// How a collection is partitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Zonal,
    Regional,
    Global,
}

/// A concrete scope: a named zone, a named region, or global.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Zone(String),
    Region(String),
    Global,
}

impl Scope {
    /// Adds the scope parameter (`zone` or `region`) to `payload`.
    #[must_use]
    pub fn apply(&self, payload: RequestPayload) -> RequestPayload {
        match self {
            Self::Zone(zone) => payload.with_param(ZONE_PARAM, zone.clone()),
            Self::Region(region) => payload.with_param(REGION_PARAM, region.clone()),
            Self::Global => payload,
        }
    }
}

// ---------------------------------------------------------------------------
// RenderedCall
// ---------------------------------------------------------------------------

/// An [`ApiRequest`](crate::ApiRequest) resolved to HTTP terms.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedCall {
    pub method: http::Method,
    /// Path relative to the API endpoint, e.g.
    /// `compute/v1/projects/p/zones/z/instances/i`.
    pub path: String,
    /// Parameters not consumed by the path, in key order.
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

/// Errors from rendering a request into a REST call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("{service}.{method} requires parameter `{param}`")]
    MissingParam {
        service: String,
        method: String,
        param: String,
    },
}

// ---------------------------------------------------------------------------
// ServiceDescriptor
// ---------------------------------------------------------------------------

/// One collection of a REST API.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceDescriptor {
    api_root: String,
    name: String,
    collection: String,
    scope_kind: ScopeKind,
    resource_param: String,
}

impl ServiceDescriptor {
    /// Creates a descriptor.
    ///
    /// - `api_root`: API prefix, e.g. `compute/v1`
    /// - `name`: service identifier, e.g. `instances` or `zoneOperations`
    /// - `collection`: path segment and aggregated-list item key
    /// - `resource_param`: payload parameter holding the resource name
    #[must_use]
    pub fn new(
        api_root: impl Into<String>,
        name: impl Into<String>,
        collection: impl Into<String>,
        scope_kind: ScopeKind,
        resource_param: impl Into<String>,
    ) -> Self {
        Self {
            api_root: api_root.into().trim_matches('/').to_string(),
            name: name.into(),
            collection: collection.into(),
            scope_kind,
            resource_param: resource_param.into(),
        }
    }

    /// Zonal collection whose service name equals its collection name.
    #[must_use]
    pub fn zonal(api_root: &str, collection: &str, resource_param: &str) -> Self {
        Self::new(api_root, collection, collection, ScopeKind::Zonal, resource_param)
    }

    /// Regional collection whose service name equals its collection name.
    #[must_use]
    pub fn regional(api_root: &str, collection: &str, resource_param: &str) -> Self {
        Self::new(api_root, collection, collection, ScopeKind::Regional, resource_param)
    }

    /// Global collection whose service name equals its collection name.
    #[must_use]
    pub fn global(api_root: &str, collection: &str, resource_param: &str) -> Self {
        Self::new(api_root, collection, collection, ScopeKind::Global, resource_param)
    }

    #[must_use]
    pub fn zone_operations(api_root: &str) -> Self {
        Self::new(api_root, ZONE_OPERATIONS, "operations", ScopeKind::Zonal, "operation")
    }

    #[must_use]
    pub fn region_operations(api_root: &str) -> Self {
        Self::new(api_root, REGION_OPERATIONS, "operations", ScopeKind::Regional, "operation")
    }

    #[must_use]
    pub fn global_operations(api_root: &str) -> Self {
        Self::new(api_root, GLOBAL_OPERATIONS, "operations", ScopeKind::Global, "operation")
    }

    /// The operations service of this API that tracks operations in `scope`.
    #[must_use]
    pub fn operations_for(&self, scope: &Scope) -> Self {
        match scope {
            Scope::Zone(_) => Self::zone_operations(&self.api_root),
            Scope::Region(_) => Self::region_operations(&self.api_root),
            Scope::Global => Self::global_operations(&self.api_root),
        }
    }

    /// Whether this is one of the three Operations collections.
    ///
    /// Operations returned by these services are status reports on existing
    /// work, not new work to wait for.
    #[must_use]
    pub fn is_operations_service(&self) -> bool {
        matches!(
            self.name.as_str(),
            ZONE_OPERATIONS | REGION_OPERATIONS | GLOBAL_OPERATIONS
        )
    }

    #[must_use]
    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub fn resource_param(&self) -> &str {
        &self.resource_param
    }

    /// Renders `method` with `payload` into a REST call.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::MissingParam` when the project, scope, or
    /// resource-name parameter the path needs is absent.
    pub fn render(
        &self,
        method: &Method,
        payload: &RequestPayload,
    ) -> Result<RenderedCall, RenderError> {
        let mut params = payload.params().clone();
        let project = self.take(&mut params, method, PROJECT_PARAM)?;
        let body = payload.body().cloned();

        let (verb, relative, body) = match method {
            Method::AggregatedList => (
                http::Method::GET,
                format!("projects/{project}/aggregated/{}", self.collection),
                None,
            ),
            Method::List => (
                http::Method::GET,
                self.collection_path(&project, &mut params, method)?,
                None,
            ),
            Method::Insert => (
                http::Method::POST,
                self.collection_path(&project, &mut params, method)?,
                body,
            ),
            Method::Get => (
                http::Method::GET,
                self.resource_path(&project, &mut params, method)?,
                None,
            ),
            Method::Delete => (
                http::Method::DELETE,
                self.resource_path(&project, &mut params, method)?,
                None,
            ),
            Method::Update => (
                http::Method::PUT,
                self.resource_path(&project, &mut params, method)?,
                body,
            ),
            Method::Patch => (
                http::Method::PATCH,
                self.resource_path(&project, &mut params, method)?,
                body,
            ),
            Method::Custom(custom) => (
                http::Method::POST,
                format!("{}/{custom}", self.resource_path(&project, &mut params, method)?),
                body,
            ),
        };

        Ok(RenderedCall {
            method: verb,
            path: format!("{}/{relative}", self.api_root),
            query: params.into_iter().collect(),
            body,
        })
    }

    fn collection_path(
        &self,
        project: &str,
        params: &mut BTreeMap<String, String>,
        method: &Method,
    ) -> Result<String, RenderError> {
        let scope = match self.scope_kind {
            ScopeKind::Zonal => format!("zones/{}", self.take(params, method, ZONE_PARAM)?),
            ScopeKind::Regional => format!("regions/{}", self.take(params, method, REGION_PARAM)?),
            ScopeKind::Global => "global".to_string(),
        };
        Ok(format!("projects/{project}/{scope}/{}", self.collection))
    }

    fn resource_path(
        &self,
        project: &str,
        params: &mut BTreeMap<String, String>,
        method: &Method,
    ) -> Result<String, RenderError> {
        let collection = self.collection_path(project, params, method)?;
        let name = self.take(params, method, &self.resource_param)?;
        Ok(format!("{collection}/{name}"))
    }

    fn take(
        &self,
        params: &mut BTreeMap<String, String>,
        method: &Method,
        param: &str,
    ) -> Result<String, RenderError> {
        params.remove(param).ok_or_else(|| RenderError::MissingParam {
            service: self.name.clone(),
            method: method.to_string(),
            param: param.to_string(),
        })
    }
}
