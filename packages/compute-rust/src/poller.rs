//! Waiting for mutation Operations to finish.
//!
//! Each poll round re-fetches every unfinished Operation in one batch and,
//! for every Operation that reached `DONE` in the previous round, fetches
//! the mutated resource in the same batch. Rounds are spaced by a linear
//! backoff (1s, 2s, ...) capped at [`PollerConfig::max_time_between_polls`].

use std::borrow::BorrowMut;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cloudsdk_core::{
    path, ApiRequest, Method, Operation, RequestError, RequestPayload, Resource, ServiceDescriptor,
};
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::batch::BatchRequester;
use crate::config::PollerConfig;
use crate::problems::construct_list;
use crate::status::StatusReporter;

const WARNINGS_TITLE: &str = "Some requests generated warnings:";

/// A replacement for the default follow-up `Get` of one mutated resource.
#[derive(Debug, Clone)]
pub struct CustomGet {
    /// Link shown in the status line instead of the Operation's `targetLink`.
    pub link: String,
    pub request: ApiRequest,
}

/// Custom follow-up requests keyed by `targetLink`.
pub type CustomGetRequests = HashMap<String, CustomGet>;

/// Where the Operations being waited on live.
#[derive(Debug, Clone)]
pub struct PollScope {
    pub project: String,
    /// Service used to re-fetch Operations.
    pub operation_service: Arc<ServiceDescriptor>,
    /// Service of the collection being mutated; its `Get` fetches results.
    pub resource_service: Arc<ServiceDescriptor>,
}

impl PollScope {
    #[must_use]
    pub fn new(
        project: impl Into<String>,
        operation_service: Arc<ServiceDescriptor>,
        resource_service: Arc<ServiceDescriptor>,
    ) -> Self {
        Self {
            project: project.into(),
            operation_service,
            resource_service,
        }
    }

    /// Scope of the Operation `operation` returned for `request`.
    ///
    /// The operation service is picked from the Operation's zone or region;
    /// the project comes from the request that started the mutation.
    #[must_use]
    pub fn for_operation(request: &ApiRequest, operation: &Operation) -> Self {
        let resource_service = Arc::clone(request.service());
        let operation_service = Arc::new(resource_service.operations_for(&operation.scope()));
        Self {
            project: request.payload().project().unwrap_or_default().to_string(),
            operation_service,
            resource_service,
        }
    }
}

/// Drives Operations to a terminal state.
#[derive(Clone)]
pub struct OperationPoller {
    requester: BatchRequester,
    config: PollerConfig,
    status: Arc<dyn StatusReporter>,
}

impl OperationPoller {
    #[must_use]
    pub fn new(
        requester: BatchRequester,
        config: PollerConfig,
        status: Arc<dyn StatusReporter>,
    ) -> Self {
        Self {
            requester,
            config,
            status,
        }
    }

    #[must_use]
    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Waits until every Operation is `DONE` or `timeout` elapses.
    ///
    /// The returned stream yields the resources mutated by successful,
    /// non-delete Operations (or the results of their `custom_get_requests`
    /// override). Operation warnings go to `warnings`; Operation failures,
    /// failed requests, and an eventual timeout go to `errors`. `timeout`
    /// defaults to [`PollerConfig::timeout`].
    pub fn wait_for_operations<'a>(
        &'a self,
        operations: Vec<Operation>,
        scope: PollScope,
        custom_get_requests: Option<CustomGetRequests>,
        timeout: Option<Duration>,
        warnings: &'a mut Vec<String>,
        errors: &'a mut Vec<RequestError>,
    ) -> BoxStream<'a, Resource> {
        self.drive(
            operations,
            scope,
            custom_get_requests,
            timeout,
            warnings,
            errors,
            false,
        )
    }

    /// Shared polling loop. With `summarize_warnings`, collected warnings
    /// are reported once the stream ends.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn drive<'a, W>(
        &'a self,
        operations: Vec<Operation>,
        scope: PollScope,
        custom_get_requests: Option<CustomGetRequests>,
        timeout: Option<Duration>,
        warnings: W,
        errors: &'a mut Vec<RequestError>,
        summarize_warnings: bool,
    ) -> BoxStream<'a, Resource>
    where
        W: BorrowMut<Vec<String>> + Send + 'a,
    {
        let state = PollState {
            poller: self,
            operations,
            scope,
            custom: custom_get_requests.unwrap_or_default(),
            timeout: timeout.unwrap_or(self.config.timeout),
            start: Instant::now(),
            round: 0,
            pending_sleep: None,
            finished: false,
            warnings,
            errors,
            summarize_warnings,
        };
        stream::unfold(state, |mut state| async move {
            let batch = state.next_round().await?;
            Some((batch, state))
        })
        .flat_map(stream::iter)
        .boxed()
    }
}

/// Decodes `response` as an Operation, recording a malformed one as an
/// error.
pub(crate) fn decode_operation(response: &Resource) -> Result<Option<Operation>, RequestError> {
    Operation::from_resource(response)
        .map_err(|e| RequestError::uncoded(format!("malformed operation: {e}")))
}

struct PollState<'a, W> {
    poller: &'a OperationPoller,
    operations: Vec<Operation>,
    scope: PollScope,
    custom: CustomGetRequests,
    timeout: Duration,
    start: Instant,
    round: u64,
    pending_sleep: Option<Duration>,
    finished: bool,
    warnings: W,
    errors: &'a mut Vec<RequestError>,
    summarize_warnings: bool,
}

impl<W: BorrowMut<Vec<String>>> PollState<'_, W> {
    /// Runs one poll round and returns the resources it produced, or `None`
    /// once polling is over.
    async fn next_round(&mut self) -> Option<Vec<Resource>> {
        if self.finished {
            self.finish();
            return None;
        }
        if let Some(delay) = self.pending_sleep.take() {
            debug!(seconds = delay.as_secs(), "Sleeping");
            tokio::time::sleep(delay).await;
        }

        let requests = self.build_requests();
        if requests.is_empty() {
            self.finish();
            return None;
        }

        let outcome = self.poller.requester.make_requests(&requests).await;
        self.errors.extend(outcome.errors);

        let mut resources = Vec::new();
        for response in outcome.responses.into_iter().flatten() {
            match decode_operation(&response) {
                Ok(Some(operation)) => self.operations.push(operation),
                Ok(None) => resources.push(response),
                Err(e) => self.errors.push(e),
            }
        }

        if self.operations.is_empty() {
            self.finished = true;
        } else if self.start.elapsed() > self.timeout {
            debug!(seconds = self.timeout.as_secs(), "Timeout reached");
            self.errors
                .push(unfinished_error(&self.operations, self.timeout));
            self.finished = true;
        } else {
            self.round += 1;
            self.pending_sleep = Some(
                Duration::from_secs(self.round).min(self.poller.config.max_time_between_polls),
            );
        }
        Some(resources)
    }

    /// Builds this round's batch: resource fetches for finished Operations,
    /// then polls for unfinished ones. Consumes the tracked Operations.
    fn build_requests(&mut self) -> Vec<ApiRequest> {
        let operations = std::mem::take(&mut self.operations);
        debug!(
            operations = ?operations.iter().map(|op| op.name.as_str()).collect::<Vec<_>>(),
            "Operations to inspect"
        );

        let mut resource_requests = Vec::new();
        let mut operation_requests = Vec::new();
        for operation in &operations {
            if !operation.is_done() {
                operation_requests.push(self.operation_get(operation));
                continue;
            }

            let warnings: &mut Vec<String> = self.warnings.borrow_mut();
            warnings.extend(operation.warning_messages().map(str::to_string));
            self.errors.extend(operation.problems());
            if !operation.succeeded() {
                continue;
            }

            let link = if let Some(custom) = self.custom.get(&operation.target_link) {
                resource_requests.push(custom.request.clone());
                custom.link.as_str()
            } else {
                if !operation.is_delete() {
                    resource_requests.push(self.resource_get(operation));
                }
                operation.target_link.as_str()
            };
            self.poller.status.status(&format!(
                "{} [{link}].",
                operation.human_friendly_verb()
            ));
        }

        resource_requests.extend(operation_requests);
        resource_requests
    }

    fn resource_get(&self, operation: &Operation) -> ApiRequest {
        let service = &self.scope.resource_service;
        let payload = operation
            .scope()
            .apply(RequestPayload::for_project(&self.scope.project))
            .with_param(service.resource_param(), path::name(&operation.target_link));
        ApiRequest::new(Arc::clone(service), Method::Get, payload)
    }

    fn operation_get(&self, operation: &Operation) -> ApiRequest {
        let service = &self.scope.operation_service;
        let payload = operation
            .scope()
            .apply(RequestPayload::for_project(&self.scope.project))
            .with_param(service.resource_param(), &operation.name);
        ApiRequest::new(Arc::clone(service), Method::Get, payload)
    }

    fn finish(&mut self) {
        if !self.summarize_warnings {
            return;
        }
        let warnings: &Vec<String> = self.warnings.borrow();
        if warnings.is_empty() {
            return;
        }
        warn!(count = warnings.len(), "Some requests generated warnings");
        self.poller
            .status
            .warning(&construct_list(WARNINGS_TITLE, warnings));
    }
}

fn unfinished_error(operations: &[Operation], timeout: Duration) -> RequestError {
    let action = operations
        .first()
        .map_or("", |operation| operation.operation_type.as_str());
    let links: Vec<&str> = operations
        .iter()
        .map(|operation| operation.target_link.as_str())
        .collect();
    RequestError::uncoded(format!(
        "Did not {action} the following resources within {}s: {}. These operations may \
         still be underway remotely and may still succeed; use gcloud list and describe \
         commands or https://console.developers.google.com/ to check resource state",
        timeout.as_secs(),
        links.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::status::RecordingStatus;
    use crate::transport::scripted::{
        instance_json, instance_link, instances, last_segment, operation_json, zone_operations,
        ScriptedTransport, BATCH_URL,
    };

    fn poller(
        transport: ScriptedTransport,
    ) -> (OperationPoller, Arc<ScriptedTransport>, Arc<RecordingStatus>) {
        let transport = Arc::new(transport);
        let status = Arc::new(RecordingStatus::new());
        let poller = OperationPoller::new(
            BatchRequester::new(transport.clone(), BATCH_URL),
            PollerConfig::default(),
            status.clone(),
        );
        (poller, transport, status)
    }

    fn scope() -> PollScope {
        PollScope::new("my-project", zone_operations(), instances())
    }

    fn operation(value: serde_json::Value) -> Operation {
        Operation::from_resource(&value).unwrap().unwrap()
    }

    fn is_operation_poll(call: &cloudsdk_core::RenderedCall) -> bool {
        call.path.contains("/operations/")
    }

    /// Operations finish on their first poll; resources are served by name.
    fn finishing_transport() -> ScriptedTransport {
        ScriptedTransport::new(|call| {
            let name = last_segment(call);
            if is_operation_poll(call) {
                let target = name.trim_start_matches("op-");
                Ok(operation_json(name, "DONE", "insert", target))
            } else {
                Ok(instance_json(name))
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn inserts_are_polled_then_fetched() {
        let (poller, transport, status) = poller(finishing_transport());
        let operations = vec![
            operation(operation_json("op-a", "PENDING", "insert", "a")),
            operation(operation_json("op-b", "RUNNING", "insert", "b")),
        ];
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let resources: Vec<_> = poller
            .wait_for_operations(operations, scope(), None, None, &mut warnings, &mut errors)
            .collect()
            .await;

        assert_eq!(resources, vec![instance_json("a"), instance_json("b")]);
        assert!(errors.is_empty());
        assert!(warnings.is_empty());
        assert_eq!(
            transport.paths(),
            vec![
                "compute/v1/projects/my-project/zones/us-central1-a/operations/op-a",
                "compute/v1/projects/my-project/zones/us-central1-a/operations/op-b",
                "compute/v1/projects/my-project/zones/us-central1-a/instances/a",
                "compute/v1/projects/my-project/zones/us-central1-a/instances/b",
            ]
        );
        assert_eq!(
            status.lines(),
            vec![
                format!("Created [{}].", instance_link("us-central1-a", "a")),
                format!("Created [{}].", instance_link("us-central1-a", "b")),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn done_delete_has_no_follow_up() {
        let (poller, transport, status) = poller(finishing_transport());
        let operations = vec![operation(operation_json("op-a", "DONE", "delete", "a"))];
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let resources: Vec<_> = poller
            .wait_for_operations(operations, scope(), None, None, &mut warnings, &mut errors)
            .collect()
            .await;

        assert!(resources.is_empty());
        assert!(errors.is_empty());
        assert!(transport.batches().is_empty());
        assert_eq!(
            status.lines(),
            vec![format!("Deleted [{}].", instance_link("us-central1-a", "a"))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn no_operations_returns_immediately() {
        let (poller, transport, _) = poller(finishing_transport());
        let mut warnings = Vec::new();
        let mut errors = Vec::new();
        let started = Instant::now();

        let resources: Vec<_> = poller
            .wait_for_operations(Vec::new(), scope(), None, None, &mut warnings, &mut errors)
            .collect()
            .await;

        assert!(resources.is_empty());
        assert!(errors.is_empty());
        assert!(transport.batches().is_empty());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn unfinished_operations_time_out_with_one_error() {
        let (poller, transport, _) = poller(ScriptedTransport::new(|call| {
            let name = last_segment(call);
            Ok(operation_json(name, "RUNNING", "insert", name.trim_start_matches("op-")))
        }));
        let operations = vec![
            operation(operation_json("op-a", "PENDING", "insert", "a")),
            operation(operation_json("op-b", "PENDING", "insert", "b")),
        ];
        let timeout = Duration::from_secs(10);
        let mut warnings = Vec::new();
        let mut errors = Vec::new();
        let started = Instant::now();

        let resources: Vec<_> = poller
            .wait_for_operations(
                operations,
                scope(),
                None,
                Some(timeout),
                &mut warnings,
                &mut errors,
            )
            .collect()
            .await;

        assert!(resources.is_empty());
        assert!(started.elapsed() <= timeout + poller.config().max_time_between_polls);
        assert!(transport.batches().len() > 1);
        assert_eq!(errors.len(), 1);
        let message = &errors[0].message;
        assert_eq!(errors[0].code, None);
        assert!(message.starts_with("Did not insert the following resources within 10s: "));
        assert!(message.contains(&instance_link("us-central1-a", "a")));
        assert!(message.contains(&instance_link("us-central1-a", "b")));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_is_linear_and_capped() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&polls);
        let (poller, _, _) = poller(ScriptedTransport::new(move |call| {
            let name = last_segment(call);
            let status = if counter.fetch_add(1, Ordering::SeqCst) < 6 { "RUNNING" } else { "DONE" };
            Ok(operation_json(name, status, "delete", "a"))
        }));
        let mut warnings = Vec::new();
        let mut errors = Vec::new();
        let started = Instant::now();

        let resources: Vec<_> = poller
            .wait_for_operations(
                vec![operation(operation_json("op-a", "PENDING", "delete", "a"))],
                scope(),
                None,
                None,
                &mut warnings,
                &mut errors,
            )
            .collect()
            .await;

        assert!(resources.is_empty());
        assert_eq!(polls.load(Ordering::SeqCst), 7);
        // 1 + 2 + 3 + 4 + 5 + 5 seconds between the seven polls, then 5 more
        // before the finished operation is inspected.
        assert_eq!(started.elapsed(), Duration::from_secs(25));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_operation_records_errors_and_skips_fetch() {
        let (poller, transport, status) = poller(finishing_transport());
        let failed = operation(json!({
            "kind": "compute#operation",
            "name": "op-a",
            "status": "DONE",
            "operationType": "insert",
            "targetLink": instance_link("us-central1-a", "a"),
            "zone": "us-central1-a",
            "httpErrorStatusCode": 403,
            "error": {"errors": [
                {"code": "QUOTA_EXCEEDED", "message": "Quota 'CPUS' exceeded."},
            ]},
        }));
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let resources: Vec<_> = poller
            .wait_for_operations(vec![failed], scope(), None, None, &mut warnings, &mut errors)
            .collect()
            .await;

        assert!(resources.is_empty());
        assert_eq!(errors, vec![RequestError::new(Some(403), "Quota 'CPUS' exceeded.")]);
        assert!(transport.batches().is_empty());
        assert!(status.lines().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn custom_get_replaces_default_fetch() {
        let (poller, transport, status) = poller(finishing_transport());
        let custom_request = ApiRequest::new(
            instances(),
            Method::Get,
            RequestPayload::for_project("my-project")
                .with_param("zone", "us-central1-a")
                .with_param("instance", "a-renamed"),
        );
        let custom = CustomGetRequests::from([(
            instance_link("us-central1-a", "a"),
            CustomGet {
                link: "us-central1-a/instances/a-renamed".to_string(),
                request: custom_request,
            },
        )]);
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let resources: Vec<_> = poller
            .wait_for_operations(
                vec![operation(operation_json("op-a", "DONE", "setMetadata", "a"))],
                scope(),
                Some(custom),
                None,
                &mut warnings,
                &mut errors,
            )
            .collect()
            .await;

        assert_eq!(resources, vec![instance_json("a-renamed")]);
        assert_eq!(
            transport.paths(),
            vec!["compute/v1/projects/my-project/zones/us-central1-a/instances/a-renamed"]
        );
        assert_eq!(
            status.lines(),
            vec!["Updated [us-central1-a/instances/a-renamed]."]
        );
    }

    fn renamed_get() -> CustomGet {
        CustomGet {
            link: "us-central1-a/instances/a-renamed".to_string(),
            request: ApiRequest::new(
                instances(),
                Method::Get,
                RequestPayload::for_project("my-project")
                    .with_param("zone", "us-central1-a")
                    .with_param("instance", "a-renamed"),
            ),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn custom_get_is_issued_even_for_deletions() {
        let (poller, transport, status) = poller(finishing_transport());
        let custom =
            CustomGetRequests::from([(instance_link("us-central1-a", "a"), renamed_get())]);
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let resources: Vec<_> = poller
            .wait_for_operations(
                vec![operation(operation_json("op-a", "DONE", "delete", "a"))],
                scope(),
                Some(custom),
                None,
                &mut warnings,
                &mut errors,
            )
            .collect()
            .await;

        assert!(errors.is_empty());
        assert_eq!(resources, vec![instance_json("a-renamed")]);
        assert_eq!(
            transport.paths(),
            vec!["compute/v1/projects/my-project/zones/us-central1-a/instances/a-renamed"]
        );
        assert_eq!(
            status.lines(),
            vec!["Deleted [us-central1-a/instances/a-renamed]."]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_custom_gets_fall_back_to_default_fetch() {
        let (poller, transport, status) = poller(finishing_transport());
        let custom =
            CustomGetRequests::from([(instance_link("us-central1-a", "other"), renamed_get())]);
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let resources: Vec<_> = poller
            .wait_for_operations(
                vec![operation(operation_json("op-a", "DONE", "insert", "a"))],
                scope(),
                Some(custom),
                None,
                &mut warnings,
                &mut errors,
            )
            .collect()
            .await;

        assert!(errors.is_empty());
        assert_eq!(resources, vec![instance_json("a")]);
        assert_eq!(
            transport.paths(),
            vec!["compute/v1/projects/my-project/zones/us-central1-a/instances/a"]
        );
        assert_eq!(
            status.lines(),
            vec![format!("Created [{}].", instance_link("us-central1-a", "a"))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn warnings_are_accumulated_without_summary() {
        let (poller, _, status) = poller(finishing_transport());
        let mut done = operation_json("op-a", "DONE", "insert", "a");
        done["warnings"] = json!([{"code": "DISK_SIZE_LARGER_THAN_IMAGE_SIZE", "message": "disk is larger than image"}]);
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let resources: Vec<_> = poller
            .wait_for_operations(
                vec![operation(done)],
                scope(),
                None,
                None,
                &mut warnings,
                &mut errors,
            )
            .collect()
            .await;

        assert_eq!(resources, vec![instance_json("a")]);
        assert_eq!(warnings, vec!["disk is larger than image"]);
        assert!(status.warnings().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_is_skipped_and_recorded() {
        let (poller, _, _) = poller(ScriptedTransport::new(|_| {
            Err(crate::transport::TransportError::Http {
                status: 404,
                content: r#"{"error": {"message": "instance gone"}}"#.to_string(),
            })
        }));
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let resources: Vec<_> = poller
            .wait_for_operations(
                vec![operation(operation_json("op-a", "DONE", "insert", "a"))],
                scope(),
                None,
                None,
                &mut warnings,
                &mut errors,
            )
            .collect()
            .await;

        assert!(resources.is_empty());
        assert_eq!(errors, vec![RequestError::new(Some(404), "instance gone")]);
    }

    #[test]
    fn scope_follows_operation_location() {
        let request = ApiRequest::new(
            instances(),
            Method::Insert,
            RequestPayload::for_project("my-project").with_param("zone", "us-central1-a"),
        );
        let op = operation(operation_json("op-a", "PENDING", "insert", "a"));

        let scope = PollScope::for_operation(&request, &op);

        assert_eq!(scope.project, "my-project");
        assert_eq!(scope.operation_service.name(), "zoneOperations");
        assert_eq!(scope.resource_service.name(), "instances");
    }
}
