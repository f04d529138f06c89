//! In-memory transport that answers each call from a script and records
//! every batch it receives.

use std::sync::Arc;

use async_trait::async_trait;
use cloudsdk_core::{RenderedCall, ServiceDescriptor};
use parking_lot::Mutex;
use serde_json::json;

use super::{BatchTransport, SubResponse, TransportError};

pub(crate) const API_ROOT: &str = "compute/v1";
pub(crate) const BATCH_URL: &str = "https://compute.test/batch/compute/v1";

type Handler = Box<dyn Fn(&RenderedCall) -> SubResponse + Send + Sync>;

pub(crate) struct ScriptedTransport {
    handler: Handler,
    failure: Option<TransportError>,
    batches: Mutex<Vec<Vec<RenderedCall>>>,
}

impl ScriptedTransport {
    /// Answers every call with `handler`.
    pub(crate) fn new(
        handler: impl Fn(&RenderedCall) -> SubResponse + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            failure: None,
            batches: Mutex::new(Vec::new()),
        }
    }

    /// Fails every batch as a whole with `error`.
    pub(crate) fn failing(error: TransportError) -> Self {
        Self {
            handler: Box::new(|_| Ok(serde_json::Value::Null)),
            failure: Some(error),
            batches: Mutex::new(Vec::new()),
        }
    }

    /// Every batch received so far, in order.
    pub(crate) fn batches(&self) -> Vec<Vec<RenderedCall>> {
        self.batches.lock().clone()
    }

    /// Paths of every call received so far, flattened across batches.
    pub(crate) fn paths(&self) -> Vec<String> {
        self.batches
            .lock()
            .iter()
            .flatten()
            .map(|call| call.path.clone())
            .collect()
    }
}

#[async_trait]
impl BatchTransport for ScriptedTransport {
    async fn execute(
        &self,
        batch_url: &str,
        calls: &[RenderedCall],
    ) -> Result<Vec<SubResponse>, TransportError> {
        assert_eq!(batch_url, BATCH_URL);
        self.batches.lock().push(calls.to_vec());
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        Ok(calls.iter().map(|call| (self.handler)(call)).collect())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub(crate) fn instances() -> Arc<ServiceDescriptor> {
    Arc::new(ServiceDescriptor::zonal(API_ROOT, "instances", "instance"))
}

pub(crate) fn zone_operations() -> Arc<ServiceDescriptor> {
    Arc::new(ServiceDescriptor::zone_operations(API_ROOT))
}

pub(crate) fn zone_url(zone: &str) -> String {
    format!("https://compute.test/{API_ROOT}/projects/my-project/zones/{zone}")
}

pub(crate) fn instance_link(zone: &str, name: &str) -> String {
    format!("{}/instances/{name}", zone_url(zone))
}

/// A zonal Operation payload on `instances` in `us-central1-a`.
pub(crate) fn operation_json(
    name: &str,
    status: &str,
    kind: &str,
    target: &str,
) -> serde_json::Value {
    json!({
        "kind": "compute#operation",
        "name": name,
        "status": status,
        "operationType": kind,
        "targetLink": instance_link("us-central1-a", target),
        "zone": zone_url("us-central1-a"),
    })
}

pub(crate) fn instance_json(name: &str) -> serde_json::Value {
    json!({
        "kind": "compute#instance",
        "name": name,
        "selfLink": instance_link("us-central1-a", name),
    })
}

/// Name segment of `call.path`, e.g. the operation or instance name.
pub(crate) fn last_segment(call: &RenderedCall) -> &str {
    cloudsdk_core::path::name(&call.path)
}
