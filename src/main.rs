// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{anyhow, Result};
use axum::{http::StatusCode, routing::get, Router};
use clap::Parser;
use dnsman::{
    config::ControllerConfig,
    constants::{
        ENTRY_TRIGGER_CHANNEL_CAPACITY, ERROR_REQUEUE_DURATION_SECS, KIND_DNS_ENTRY,
        KIND_DNS_PROVIDER, LOOKUP_RETRY_WAIT_MILLIS, MAX_LOOKUP_RETRIES, METRICS_SERVER_PATH,
        TOKIO_WORKER_THREADS,
    },
    context::{class_of, ChannelEntryTrigger, Context, Stores},
    crd::{DNSEntry, DNSProvider},
    lookup::{processor::LookupProcessor, HickoryHostLookup, HostResolver},
    metrics::{self, PrometheusLookupMetrics},
    provider::{inmemory::InMemoryAccountFactory, registry::ProviderRegistry, CompoundAccountFactory},
    reconcilers::{reconcile_dnsentry, reconcile_dnsprovider},
};
use futures::{Stream, StreamExt};
use kube::{
    runtime::{
        controller::{self, Action},
        reflector::ObjectRef,
        watcher, Controller,
    },
    Api, Client, Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("dnsman-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    // Respects RUST_LOG environment variable if set, otherwise defaults to INFO level
    // Example: RUST_LOG=debug cargo run
    //
    // Respects RUST_LOG_FORMAT environment variable for output format
    // Example: RUST_LOG_FORMAT=json cargo run
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    let config = ControllerConfig::parse();
    config.validate()?;
    info!(class = %config.class, namespace = ?config.namespace, "Starting DNS entry controller");
    debug!(?config, "Configuration loaded");

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let shutdown = CancellationToken::new();
    let (trigger_tx, trigger_rx) = mpsc::channel(ENTRY_TRIGGER_CHANNEL_CAPACITY);

    let account_factory = CompoundAccountFactory::new(
        config.enabled_provider_types.clone(),
        config.disabled_provider_types.clone(),
    )
    .with_factory(Box::new(InMemoryAccountFactory::new()));

    let resolver = HostResolver::new(Arc::new(HickoryHostLookup::from_system_conf()?))
        .with_retries(MAX_LOOKUP_RETRIES, Duration::from_millis(LOOKUP_RETRY_WAIT_MILLIS));
    let lookup_processor = Arc::new(LookupProcessor::new(
        resolver,
        Arc::new(ChannelEntryTrigger::new(trigger_tx)),
        Arc::new(PrometheusLookupMetrics),
        config.max_concurrent_lookups,
        config.lookup_check_period,
    ));

    let provider_controller = Controller::new(
        api_for::<DNSProvider>(&client, config.namespace.as_deref()),
        watcher::Config::default(),
    );
    let entry_controller = Controller::new(
        api_for::<DNSEntry>(&client, config.namespace.as_deref()),
        watcher::Config::default(),
    );
    let stores = Stores {
        dns_entries: entry_controller.store(),
        dns_providers: provider_controller.store(),
    };

    let ctx = Arc::new(Context {
        client: client.clone(),
        stores: stores.clone(),
        config: config.clone(),
        registry: Arc::new(ProviderRegistry::new()),
        account_factory: Arc::new(account_factory),
        lookup_processor: Arc::clone(&lookup_processor),
        shutdown: shutdown.clone(),
    });

    let lookup_task = tokio::spawn(Arc::clone(&lookup_processor).run(shutdown.clone()));

    info!("Starting all controllers");

    // Controllers only stop on a shutdown signal; any other exit ends the process
    let result = tokio::select! {
        result = run_dnsprovider_controller(provider_controller, ctx.clone()) => {
            controller_exited(KIND_DNS_PROVIDER, result)
        }
        result = run_dnsentry_controller(
            entry_controller,
            client.clone(),
            stores,
            entry_trigger_stream(trigger_rx),
            ctx.clone(),
        ) => {
            controller_exited(KIND_DNS_ENTRY, result)
        }
        result = run_metrics_server(&config, shutdown.clone()) => {
            error!("CRITICAL: metrics server exited unexpectedly: {:?}", result);
            result.and_then(|()| Err(anyhow!("metrics server exited unexpectedly without error")))
        }
    };

    shutdown.cancel();
    if let Err(e) = lookup_task.await {
        warn!("Lookup processor task failed: {e}");
    }
    info!("DNS entry controller stopped");
    result
}

fn controller_exited(kind: &str, result: Result<()>) -> Result<()> {
    if let Err(e) = &result {
        error!("CRITICAL: {kind} controller exited unexpectedly: {:?}", e);
    } else {
        info!("{kind} controller stopped");
    }
    result
}

/// Namespaced API if the controller is restricted to a namespace.
fn api_for<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Entries requeued by the lookup processor.
fn entry_trigger_stream(
    receiver: mpsc::Receiver<ObjectRef<DNSEntry>>,
) -> impl Stream<Item = ObjectRef<DNSEntry>> + Send + 'static {
    futures::stream::unfold(receiver, |mut receiver| async move {
        receiver.recv().await.map(|object_ref| (object_ref, receiver))
    })
}

/// Run the `DNSProvider` controller
async fn run_dnsprovider_controller(
    controller: Controller<DNSProvider>,
    ctx: Arc<Context>,
) -> Result<()> {
    info!("Starting DNSProvider controller");

    controller
        .shutdown_on_signal()
        .run(reconcile_dnsprovider_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Run the `DNSEntry` controller
///
/// Entries are reconciled again when a provider of their namespace changes
/// and when the lookup processor sees new addresses for their targets.
async fn run_dnsentry_controller(
    controller: Controller<DNSEntry>,
    client: Client,
    stores: Stores,
    triggered: impl Stream<Item = ObjectRef<DNSEntry>> + Send + 'static,
    ctx: Arc<Context>,
) -> Result<()> {
    info!("Starting DNSEntry controller");

    let providers = api_for::<DNSProvider>(&client, ctx.config.namespace.as_deref());
    controller
        .watches(providers, watcher::Config::default(), move |provider| {
            provider
                .namespace()
                .map(|ns| stores.entries_in_namespace(&ns))
                .unwrap_or_default()
        })
        .reconcile_on(triggered)
        .with_config(controller::Config::default().concurrency(1))
        .shutdown_on_signal()
        .run(reconcile_dnsentry_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Reconcile wrapper for `DNSEntry`
async fn reconcile_dnsentry_wrapper(
    entry: Arc<DNSEntry>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    if !ctx.config.is_responsible_for(class_of(entry.as_ref())) {
        debug!("Skipping DNSEntry {} of other class", entry.name_any());
        return Ok(Action::await_change());
    }

    let start = Instant::now();
    let timeout = ctx.config.reconcile_timeout;
    let result = match tokio::time::timeout(timeout, reconcile_dnsentry(ctx, &entry)).await {
        Ok(result) => result,
        Err(_) => {
            metrics::record_error(KIND_DNS_ENTRY, "timeout");
            Err(anyhow!("reconciliation timed out after {timeout:?}"))
        }
    };

    match result {
        Ok(action) => {
            debug!("Successfully reconciled DNSEntry: {}", entry.name_any());
            metrics::record_reconciliation_success(KIND_DNS_ENTRY, start.elapsed());
            Ok(action)
        }
        Err(e) => {
            error!("Failed to reconcile DNSEntry {}: {:#}", entry.name_any(), e);
            metrics::record_reconciliation_error(KIND_DNS_ENTRY, start.elapsed());
            Err(e.into())
        }
    }
}

/// Reconcile wrapper for `DNSProvider`
async fn reconcile_dnsprovider_wrapper(
    provider: Arc<DNSProvider>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    if !ctx.config.is_responsible_for(class_of(provider.as_ref())) {
        debug!("Skipping DNSProvider {} of other class", provider.name_any());
        return Ok(Action::await_change());
    }

    let start = Instant::now();
    match reconcile_dnsprovider(ctx, &provider).await {
        Ok(action) => {
            info!("Successfully reconciled DNSProvider: {}", provider.name_any());
            metrics::record_reconciliation_success(KIND_DNS_PROVIDER, start.elapsed());
            Ok(action)
        }
        Err(e) => {
            error!("Failed to reconcile DNSProvider {}: {:#}", provider.name_any(), e);
            metrics::record_reconciliation_error(KIND_DNS_PROVIDER, start.elapsed());
            Err(e.into())
        }
    }
}

/// Error policy for both controllers
fn error_policy<K: Resource<DynamicType = ()>>(
    resource: Arc<K>,
    err: &ReconcileError,
    _ctx: Arc<Context>,
) -> Action {
    let kind = K::kind(&());
    warn!(
        "Requeueing {} {} after error: {:#}",
        kind,
        resource.name_any(),
        err.0
    );
    metrics::record_reconciliation_requeue(&kind, "error");
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

/// Serve the Prometheus metrics until shutdown.
async fn run_metrics_server(config: &ControllerConfig, shutdown: CancellationToken) -> Result<()> {
    let app = Router::new().route(METRICS_SERVER_PATH, get(serve_metrics));

    let listener = tokio::net::TcpListener::bind(config.metrics_bind_address).await?;
    info!("Metrics server listening on {}", config.metrics_bind_address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}

async fn serve_metrics() -> (StatusCode, String) {
    match metrics::gather_metrics() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => {
            warn!("Failed to gather metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
