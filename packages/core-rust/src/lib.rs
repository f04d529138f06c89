//! Cloud SDK core: Operation handles, list envelopes, service descriptors, and
//! the soft error descriptor shared by the batching and polling layers.

pub mod list;
pub mod operation;
pub mod path;
pub mod request;
pub mod service;
pub mod types;

pub use list::{AggregatedListResponse, ListResponse, ScopedList, Warning};
pub use operation::{Operation, OperationStatus, OPERATION_KIND};
pub use request::{ApiRequest, Method, RequestPayload};
pub use service::{RenderError, RenderedCall, Scope, ScopeKind, ServiceDescriptor};
pub use types::{RequestError, Resource};
