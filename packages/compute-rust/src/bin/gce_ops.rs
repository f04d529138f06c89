//! `gce-ops`: list Compute resources or wait on running Operations.
//!
//! ## Configuration
//!
//! - `CLOUDSDK_CORE_PROJECT` - project to operate on
//! - `CLOUDSDK_AUTH_ACCESS_TOKEN` - bearer token sent with every batch
//! - `CLOUDSDK_COMPUTE_BATCH_URL` - batch endpoint override
//! - `CLOUDSDK_API_ENDPOINT_OVERRIDES_COMPUTE` - API endpoint override

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use cloudsdk_compute::{
    construct_list, raise_on_problems, ComputeConfig, CustomGet, CustomGetRequests,
    HttpBatchTransport, Lister, OperationPoller, PollScope, RequestRouter, StatusReporter,
    StderrStatus,
};
use cloudsdk_core::{
    path, ApiRequest, Method, Operation, RequestError, RequestPayload, Resource, Scope,
    ScopeKind, ServiceDescriptor,
};
use futures_util::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Name given to the resource parameter of services derived from links.
const LINKED_RESOURCE_PARAM: &str = "resource";

#[derive(Debug, Parser)]
#[command(name = "gce-ops")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project to operate on.
    #[arg(long, env = "CLOUDSDK_CORE_PROJECT")]
    project: String,

    /// OAuth2 access token.
    #[arg(long, env = "CLOUDSDK_AUTH_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Batch endpoint URL.
    #[arg(long, env = "CLOUDSDK_COMPUTE_BATCH_URL")]
    batch_url: Option<String>,

    /// Root URL of the Compute API.
    #[arg(long, env = "CLOUDSDK_API_ENDPOINT_OVERRIDES_COMPUTE")]
    api_endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn config(&self) -> ComputeConfig {
        let mut config = ComputeConfig::default();
        if let Some(batch_url) = &self.batch_url {
            config.batch_url.clone_from(batch_url);
        }
        if let Some(api_endpoint) = &self.api_endpoint {
            config.api_endpoint.clone_from(api_endpoint);
        }
        config
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List a collection, following every page.
    List {
        /// Collection name, e.g. `instances`.
        collection: String,
        /// How the collection is scoped.
        #[arg(long, value_enum, default_value_t = ListScope::Zonal)]
        scope: ListScope,
        /// Zones or regions to list; all of them when omitted.
        #[arg(long, value_delimiter = ',')]
        locations: Vec<String>,
        /// Server-side filter expression.
        #[arg(long)]
        filter: Option<String>,
    },
    /// Wait for Operations and print the resources they produced.
    Wait {
        /// Zone of the Operations.
        #[arg(long, conflicts_with = "region")]
        zone: Option<String>,
        /// Region of the Operations.
        #[arg(long)]
        region: Option<String>,
        /// Operation names.
        #[arg(required = true)]
        operations: Vec<String>,
        /// Give up after this many seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ListScope {
    Zonal,
    Regional,
    Global,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let Cli {
        project,
        access_token,
        command,
        ..
    } = cli;
    runtime.block_on(async move {
        let transport = Arc::new(HttpBatchTransport::new(&config, access_token)?);
        let router = RequestRouter::from_config(transport, &config, Arc::new(StderrStatus));
        match command {
            Commands::List {
                collection,
                scope,
                locations,
                filter,
            } => {
                let target = ListTarget {
                    collection: &collection,
                    scope,
                    locations: &locations,
                    filter: filter.as_deref(),
                };
                list(&router, &config, &project, target).await
            }
            Commands::Wait {
                zone,
                region,
                operations,
                timeout,
            } => {
                let scope = match (zone, region) {
                    (Some(zone), _) => Scope::Zone(zone),
                    (None, Some(region)) => Scope::Region(region),
                    (None, None) => Scope::Global,
                };
                let timeout = timeout.map(Duration::from_secs);
                wait(&router, &config, &project, &scope, &operations, timeout).await
            }
        }
    })
}

/// What a `list` invocation covers.
struct ListTarget<'a> {
    collection: &'a str,
    scope: ListScope,
    locations: &'a [String],
    filter: Option<&'a str>,
}

async fn list(
    router: &RequestRouter,
    config: &ComputeConfig,
    project: &str,
    target: ListTarget<'_>,
) -> Result<()> {
    let ListTarget {
        collection,
        scope,
        locations,
        filter,
    } = target;
    let lister = Lister::new(router.clone(), config.max_results_per_page);
    let mut errors = Vec::new();
    let mut resources = match scope {
        ListScope::Zonal => {
            let service = Arc::new(ServiceDescriptor::zonal(
                &config.api_root,
                collection,
                LINKED_RESOURCE_PARAM,
            ));
            lister.zonal_resources(&service, project, locations, filter, &mut errors)
        }
        ListScope::Regional => {
            let service = Arc::new(ServiceDescriptor::regional(
                &config.api_root,
                collection,
                LINKED_RESOURCE_PARAM,
            ));
            lister.regional_resources(&service, project, locations, filter, &mut errors)
        }
        ListScope::Global => {
            let service = Arc::new(ServiceDescriptor::global(
                &config.api_root,
                collection,
                LINKED_RESOURCE_PARAM,
            ));
            lister.global_resources(&service, project, filter, &mut errors)
        }
    };
    while let Some(resource) = resources.next().await {
        print_resource(&resource)?;
    }
    drop(resources);

    raise_on_problems(&errors, None)?;
    Ok(())
}

async fn wait(
    router: &RequestRouter,
    config: &ComputeConfig,
    project: &str,
    scope: &Scope,
    names: &[String],
    timeout: Option<Duration>,
) -> Result<()> {
    let operation_service = Arc::new(match scope {
        Scope::Zone(_) => ServiceDescriptor::zone_operations(&config.api_root),
        Scope::Region(_) => ServiceDescriptor::region_operations(&config.api_root),
        Scope::Global => ServiceDescriptor::global_operations(&config.api_root),
    });
    let requests: Vec<_> = names
        .iter()
        .map(|name| {
            let payload = scope
                .apply(RequestPayload::for_project(project))
                .with_param(operation_service.resource_param(), name);
            ApiRequest::new(Arc::clone(&operation_service), Method::Get, payload)
        })
        .collect();

    let mut errors = Vec::new();
    let mut operations = Vec::new();
    {
        let mut fetched = router
            .make_requests(requests, &mut errors, None)
            .context("Failed to fetch operations")?;
        while let Some(resource) = fetched.next().await {
            if let Some(operation) = Operation::from_resource(&resource)? {
                operations.push(operation);
            }
        }
    }

    let (operations, custom) = follow_up_gets(&config.api_root, project, operations, &mut errors);
    // Every non-delete Operation left has a custom get, so the resource
    // service is only consulted when there is one to take it from.
    let resource_service = custom.values().next().map_or_else(
        || Arc::clone(&operation_service),
        |get| Arc::clone(get.request.service()),
    );
    let poll_scope = PollScope::new(project, operation_service, resource_service);

    let poller: &OperationPoller = router.poller();
    let mut warnings = Vec::new();
    {
        let mut resources = poller.wait_for_operations(
            operations,
            poll_scope,
            Some(custom),
            timeout,
            &mut warnings,
            &mut errors,
        );
        while let Some(resource) = resources.next().await {
            print_resource(&resource)?;
        }
    }
    if !warnings.is_empty() {
        let summary = construct_list("Some requests generated warnings:", &warnings);
        StderrStatus.warning(&summary);
    }

    raise_on_problems(&errors, None)?;
    Ok(())
}

/// Pairs every non-delete Operation with a `Get` derived from its
/// `targetLink`.
///
/// An Operation whose link cannot be turned into a `Get` is reported in
/// `errors` and not waited on.
fn follow_up_gets(
    api_root: &str,
    project: &str,
    operations: Vec<Operation>,
    errors: &mut Vec<RequestError>,
) -> (Vec<Operation>, CustomGetRequests) {
    let mut custom = CustomGetRequests::new();
    let mut waited = Vec::with_capacity(operations.len());
    for operation in operations {
        if operation.is_delete() {
            waited.push(operation);
            continue;
        }
        let link = &operation.target_link;
        let Some(request) = linked_resource_get(api_root, project, link) else {
            errors.push(RequestError::uncoded(format!(
                "Cannot fetch the resource of operation `{}`: unrecognized target link `{link}`",
                operation.name
            )));
            continue;
        };
        custom.insert(
            link.clone(),
            CustomGet {
                link: path::scoped_suffix(link).to_string(),
                request,
            },
        );
        waited.push(operation);
    }
    (waited, custom)
}

/// A `Get` for the resource at `link`, through a service derived from the
/// link itself.
fn linked_resource_get(api_root: &str, project: &str, link: &str) -> Option<ApiRequest> {
    let segments: Vec<&str> = path::project_suffix(link).split('/').collect();
    let (scope_kind, scope, collection, name) = match segments.as_slice() {
        [_, "zones", zone, collection, name] => {
            (ScopeKind::Zonal, Scope::Zone((*zone).to_string()), *collection, *name)
        }
        [_, "regions", region, collection, name] => (
            ScopeKind::Regional,
            Scope::Region((*region).to_string()),
            *collection,
            *name,
        ),
        [_, "global", collection, name] => (ScopeKind::Global, Scope::Global, *collection, *name),
        _ => return None,
    };
    let service = Arc::new(ServiceDescriptor::new(
        api_root,
        collection,
        collection,
        scope_kind,
        LINKED_RESOURCE_PARAM,
    ));
    let payload = scope
        .apply(RequestPayload::for_project(project))
        .with_param(LINKED_RESOURCE_PARAM, name);
    Some(ApiRequest::new(service, Method::Get, payload))
}

fn print_resource(resource: &Resource) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(resource)?);
    Ok(())
}
