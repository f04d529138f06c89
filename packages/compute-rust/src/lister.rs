//! Listing resources across zones, regions, or the global scope.

use std::sync::Arc;

use cloudsdk_core::{
    ApiRequest, Method, RequestError, RequestPayload, Resource, Scope, ServiceDescriptor,
};
use futures_util::stream::BoxStream;

use crate::router::RequestRouter;

const FILTER_PARAM: &str = "filter";
const MAX_RESULTS_PARAM: &str = "maxResults";

/// Which scopes a listing covers.
enum Scopes<'s> {
    Zones(&'s [String]),
    Regions(&'s [String]),
    Global,
}

/// Builds list requests and pages through them.
#[derive(Clone)]
pub struct Lister {
    router: RequestRouter,
    max_results: u32,
}

impl Lister {
    #[must_use]
    pub fn new(router: RequestRouter, max_results: u32) -> Self {
        Self {
            router,
            max_results,
        }
    }

    /// Lists a zonal collection in `zones`, or in every zone through one
    /// aggregated list when `zones` is empty.
    pub fn zonal_resources<'a>(
        &'a self,
        service: &Arc<ServiceDescriptor>,
        project: &str,
        zones: &[String],
        filter: Option<&str>,
        errors: &'a mut Vec<RequestError>,
    ) -> BoxStream<'a, Resource> {
        let requests = self.requests(service, project, &Scopes::Zones(zones), filter);
        self.router.list(requests, errors)
    }

    /// Lists a regional collection in `regions`, or in every region through
    /// one aggregated list when `regions` is empty.
    pub fn regional_resources<'a>(
        &'a self,
        service: &Arc<ServiceDescriptor>,
        project: &str,
        regions: &[String],
        filter: Option<&str>,
        errors: &'a mut Vec<RequestError>,
    ) -> BoxStream<'a, Resource> {
        let requests = self.requests(service, project, &Scopes::Regions(regions), filter);
        self.router.list(requests, errors)
    }

    pub fn global_resources<'a>(
        &'a self,
        service: &Arc<ServiceDescriptor>,
        project: &str,
        filter: Option<&str>,
        errors: &'a mut Vec<RequestError>,
    ) -> BoxStream<'a, Resource> {
        let requests = self.requests(service, project, &Scopes::Global, filter);
        self.router.list(requests, errors)
    }

    fn requests(
        &self,
        service: &Arc<ServiceDescriptor>,
        project: &str,
        scopes: &Scopes<'_>,
        filter: Option<&str>,
    ) -> Vec<ApiRequest> {
        let request = |method: Method, scope: Scope| {
            let mut payload = scope.apply(
                RequestPayload::for_project(project)
                    .with_param(MAX_RESULTS_PARAM, self.max_results.to_string()),
            );
            if let Some(filter) = filter {
                payload = payload.with_param(FILTER_PARAM, filter);
            }
            ApiRequest::new(Arc::clone(service), method, payload)
        };

        match scopes {
            Scopes::Zones([]) | Scopes::Regions([]) => {
                vec![request(Method::AggregatedList, Scope::Global)]
            }
            Scopes::Zones(zones) => zones
                .iter()
                .map(|zone| request(Method::List, Scope::Zone(zone.clone())))
                .collect(),
            Scopes::Regions(regions) => regions
                .iter()
                .map(|region| request(Method::List, Scope::Region(region.clone())))
                .collect(),
            Scopes::Global => vec![request(Method::List, Scope::Global)],
        }
    }
}
