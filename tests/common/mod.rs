// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for integration tests

#![allow(dead_code)]

use dnsman::crd::{DNSEntry, DNSEntrySpec, DNSProvider, DNSProviderSpec};
use dnsman::provider::inmemory::PROVIDER_TYPE_IN_MEMORY;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, PostParams};
use kube::client::Client;
use kube::core::ObjectMeta;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::sleep;

/// Interval between two status polls
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Get a Kubernetes client or skip the test if not in a cluster
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test: not running in Kubernetes cluster: {e}");
            None
        }
    }
}

/// Create a test namespace
pub async fn create_test_namespace(
    client: &Client,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    let mut labels = BTreeMap::new();
    labels.insert("test".to_string(), "integration".to_string());
    labels.insert("managed-by".to_string(), "dnsman-test".to_string());

    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    };

    match namespaces.create(&PostParams::default(), &ns).await {
        Ok(_) => {
            println!("Created test namespace: {name}");
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 409 => {
            println!("Test namespace already exists: {name}");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// Cleanup test namespace
pub async fn cleanup_test_namespace(client: &Client, name: &str) {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    match namespaces.delete(name, &DeleteParams::default()).await {
        Ok(_) => println!("Deleted test namespace: {name}"),
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            println!("Test namespace already deleted: {name}");
        }
        Err(e) => eprintln!("Failed to delete test namespace {name}: {e}"),
    }
}

/// Create an in-memory provider serving the given zones
pub async fn create_in_memory_provider(
    client: &Client,
    namespace: &str,
    name: &str,
    zones: &[&str],
) -> Result<DNSProvider, Box<dyn std::error::Error>> {
    let providers: Api<DNSProvider> = Api::namespaced(client.clone(), namespace);

    let zone_configs: Vec<_> = zones.iter().map(|z| json!({ "dnsName": z })).collect();
    let mut provider = DNSProvider::new(
        name,
        DNSProviderSpec {
            provider_type: PROVIDER_TYPE_IN_MEMORY.to_string(),
            provider_config: Some(json!({ "zones": zone_configs })),
            ..Default::default()
        },
    );
    provider.metadata.namespace = Some(namespace.to_string());

    let created = providers.create(&PostParams::default(), &provider).await?;
    println!("Created DNSProvider: {namespace}/{name}");
    Ok(created)
}

/// Create an entry with plain targets
pub async fn create_entry(
    client: &Client,
    namespace: &str,
    name: &str,
    dns_name: &str,
    targets: &[&str],
) -> Result<DNSEntry, Box<dyn std::error::Error>> {
    let entries: Api<DNSEntry> = Api::namespaced(client.clone(), namespace);

    let mut entry = DNSEntry::new(
        name,
        DNSEntrySpec {
            dns_name: dns_name.to_string(),
            targets: targets.iter().map(ToString::to_string).collect(),
            ..Default::default()
        },
    );
    entry.metadata.namespace = Some(namespace.to_string());

    let created = entries.create(&PostParams::default(), &entry).await?;
    println!("Created DNSEntry: {namespace}/{name} ({dns_name})");
    Ok(created)
}

/// Poll an entry until its status reaches `state`
pub async fn wait_for_entry_state(
    client: &Client,
    namespace: &str,
    name: &str,
    state: &str,
    timeout: Duration,
) -> Result<DNSEntry, Box<dyn std::error::Error>> {
    let entries: Api<DNSEntry> = Api::namespaced(client.clone(), namespace);
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let entry = entries.get(name).await?;
        if entry.status.as_ref().is_some_and(|s| s.state == state) {
            return Ok(entry);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(format!(
                "entry {namespace}/{name} did not reach state {state}, status: {:?}",
                entry.status
            )
            .into());
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Poll a provider until its status reaches `state`
pub async fn wait_for_provider_state(
    client: &Client,
    namespace: &str,
    name: &str,
    state: &str,
    timeout: Duration,
) -> Result<DNSProvider, Box<dyn std::error::Error>> {
    let providers: Api<DNSProvider> = Api::namespaced(client.clone(), namespace);
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let provider = providers.get(name).await?;
        if provider.status.as_ref().is_some_and(|s| s.state == state) {
            return Ok(provider);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(format!(
                "provider {namespace}/{name} did not reach state {state}, status: {:?}",
                provider.status
            )
            .into());
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Wait until an object is gone
pub async fn wait_for_entry_deleted(
    client: &Client,
    namespace: &str,
    name: &str,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let entries: Api<DNSEntry> = Api::namespaced(client.clone(), namespace);
    let deadline = tokio::time::Instant::now() + timeout;

    while entries.get_opt(name).await?.is_some() {
        if tokio::time::Instant::now() >= deadline {
            return Err(format!("entry {namespace}/{name} still exists").into());
        }
        sleep(POLL_INTERVAL).await;
    }
    Ok(())
}
