//! Routing request sets to list pagination or to Operation polling.

use std::sync::Arc;

use cloudsdk_core::{
    AggregatedListResponse, ApiRequest, ListResponse, Method, RequestError, Resource,
};
use futures_util::stream::{self, BoxStream, StreamExt};
use tracing::debug;

use crate::batch::BatchRequester;
use crate::config::ComputeConfig;
use crate::error::ClassifyError;
use crate::poller::{decode_operation, CustomGetRequests, OperationPoller, PollScope};
use crate::status::StatusReporter;
use crate::transport::BatchTransport;

/// Entry point for executing request sets.
///
/// A set is either all list calls, which are paginated to exhaustion, or
/// all non-list calls, whose Operations are waited on before the mutated
/// resources are yielded.
#[derive(Clone)]
pub struct RequestRouter {
    requester: BatchRequester,
    poller: OperationPoller,
}

impl RequestRouter {
    #[must_use]
    pub fn new(requester: BatchRequester, poller: OperationPoller) -> Self {
        Self { requester, poller }
    }

    /// Wires a requester and a poller sharing `transport`.
    #[must_use]
    pub fn from_config(
        transport: Arc<dyn BatchTransport>,
        config: &ComputeConfig,
        status: Arc<dyn StatusReporter>,
    ) -> Self {
        let requester = BatchRequester::new(transport, config.batch_url.clone())
            .with_max_batch_size(config.max_batch_size);
        let poller = OperationPoller::new(requester.clone(), config.poller.clone(), status);
        Self::new(requester, poller)
    }

    #[must_use]
    pub fn poller(&self) -> &OperationPoller {
        &self.poller
    }

    /// Executes `requests`, yielding resources as they become available.
    ///
    /// Every failure is appended to `errors`; the stream itself never
    /// fails. Deletions yield nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::MixedRequestKinds`] when list and non-list
    /// requests are mixed. Nothing is sent in that case.
    pub fn make_requests<'a>(
        &'a self,
        requests: Vec<ApiRequest>,
        errors: &'a mut Vec<RequestError>,
        custom_get_requests: Option<CustomGetRequests>,
    ) -> Result<BoxStream<'a, Resource>, ClassifyError> {
        if are_list_requests(&requests)? {
            Ok(self.list(requests, errors))
        } else {
            Ok(self.mutate(requests, errors, custom_get_requests))
        }
    }

    /// Pages through every list request until no page token remains.
    pub(crate) fn list<'a>(
        &'a self,
        requests: Vec<ApiRequest>,
        errors: &'a mut Vec<RequestError>,
    ) -> BoxStream<'a, Resource> {
        stream::unfold((requests, errors), move |(requests, errors)| async move {
            if requests.is_empty() {
                return None;
            }
            let outcome = self.requester.make_requests(&requests).await;
            errors.extend(outcome.errors);

            let mut items = Vec::new();
            let mut next_requests = Vec::new();
            for (request, response) in requests.iter().zip(outcome.responses) {
                let Some(response) = response else {
                    continue;
                };
                let token = if *request.method() == Method::AggregatedList {
                    aggregated_page(request, response, &mut items, errors)
                } else {
                    list_page(response, &mut items, errors)
                };
                if let Some(token) = token {
                    next_requests.push(request.with_page_token(&token));
                }
            }
            debug!(
                items = items.len(),
                follow_ups = next_requests.len(),
                "List round done"
            );
            Some((items, (next_requests, errors)))
        })
        .flat_map(stream::iter)
        .boxed()
    }

    /// Sends the mutations once, then waits on the Operations they started.
    fn mutate<'a>(
        &'a self,
        requests: Vec<ApiRequest>,
        errors: &'a mut Vec<RequestError>,
        custom_get_requests: Option<CustomGetRequests>,
    ) -> BoxStream<'a, Resource> {
        stream::once(async move {
            let outcome = self.requester.make_requests(&requests).await;
            errors.extend(outcome.errors);

            let mut immediate = Vec::new();
            let mut operations = Vec::new();
            let mut scope = None;
            for (request, response) in requests.iter().zip(outcome.responses) {
                let Some(response) = response else {
                    continue;
                };
                // Operations fetched from an operations service are status
                // reports, not work started by this call.
                if request.service().is_operations_service() {
                    immediate.push(response);
                    continue;
                }
                match decode_operation(&response) {
                    Ok(Some(operation)) => {
                        if scope.is_none() {
                            scope = Some(PollScope::for_operation(request, &operation));
                        }
                        operations.push(operation);
                    }
                    Ok(None) => immediate.push(response),
                    Err(e) => errors.push(e),
                }
            }

            let polled = match scope {
                Some(scope) => self.poller.drive(
                    operations,
                    scope,
                    custom_get_requests,
                    None,
                    Vec::new(),
                    errors,
                    true,
                ),
                None => stream::empty().boxed(),
            };
            stream::iter(immediate).chain(polled)
        })
        .flatten()
        .boxed()
    }
}

/// Whether `requests` are all list calls.
fn are_list_requests(requests: &[ApiRequest]) -> Result<bool, ClassifyError> {
    let lists = requests.iter().filter(|r| r.method().is_list()).count();
    if lists == 0 {
        Ok(false)
    } else if lists == requests.len() {
        Ok(true)
    } else {
        Err(ClassifyError::MixedRequestKinds)
    }
}

fn list_page(
    response: Resource,
    items: &mut Vec<Resource>,
    errors: &mut Vec<RequestError>,
) -> Option<String> {
    match serde_json::from_value::<ListResponse>(response) {
        Ok(page) => {
            let token = page.next_page().map(str::to_string);
            items.extend(page.items);
            token
        }
        Err(e) => {
            errors.push(RequestError::uncoded(format!("malformed list response: {e}")));
            None
        }
    }
}

/// Flattens one aggregated page. Unreachable scopes are reported as errors
/// but do not stop the listing.
fn aggregated_page(
    request: &ApiRequest,
    response: Resource,
    items: &mut Vec<Resource>,
    errors: &mut Vec<RequestError>,
) -> Option<String> {
    let page = match serde_json::from_value::<AggregatedListResponse>(response) {
        Ok(page) => page,
        Err(e) => {
            errors.push(RequestError::uncoded(format!(
                "malformed aggregated list response: {e}"
            )));
            return None;
        }
    };
    let collection = request.service().collection();
    for scoped in page.items.values() {
        if let Some(warning) = scoped.warning.as_ref().filter(|w| w.is_unreachable()) {
            errors.push(RequestError::uncoded(warning.message.clone()));
        }
        items.extend(scoped.items(collection).iter().cloned());
    }
    page.next_page().map(str::to_string)
}
