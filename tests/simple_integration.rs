// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Integration tests for the dnsman controller
//!
//! These tests expect the CRDs to be installed and the controller running
//! in the cluster with the `in-memory` provider type enabled.
//!
//! Run with: cargo test --test simple_integration -- --ignored

mod common;

use common::{
    cleanup_test_namespace, create_entry, create_in_memory_provider, create_test_namespace,
    get_kube_client_or_skip, wait_for_entry_deleted, wait_for_entry_state,
    wait_for_provider_state,
};
use dnsman::constants::{API_GROUP, FINALIZER_DNSMAN, STATE_ERROR, STATE_INVALID, STATE_READY};
use dnsman::crd::DNSEntry;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, ListParams};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Basic Connectivity Tests
// ============================================================================

#[tokio::test]
#[ignore] // Run with: cargo test --test simple_integration -- --ignored
async fn test_kubernetes_connectivity() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };

    let namespaces: Api<Namespace> = Api::all(client);
    let ns_list = namespaces
        .list(&ListParams::default().limit(5))
        .await
        .expect("Failed to list namespaces");
    assert!(!ns_list.items.is_empty(), "Expected at least one namespace");
}

#[tokio::test]
#[ignore]
async fn test_crds_installed() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };

    let crds: Api<CustomResourceDefinition> = Api::all(client);
    let crd_list = crds.list(&ListParams::default()).await.expect("Failed to list CRDs");
    let mut kinds: Vec<String> = crd_list
        .items
        .iter()
        .filter(|crd| crd.spec.group == API_GROUP)
        .map(|crd| crd.spec.names.kind.clone())
        .collect();
    kinds.sort();

    assert_eq!(kinds, vec!["DNSEntry".to_string(), "DNSProvider".to_string()]);
}

// ============================================================================
// Entry Lifecycle Tests
// ============================================================================

#[tokio::test]
#[ignore]
async fn test_entry_lifecycle_with_in_memory_provider() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };
    let namespace = "dnsman-test-lifecycle";
    create_test_namespace(&client, namespace).await.unwrap();

    create_in_memory_provider(&client, namespace, "memory", &["example.com"])
        .await
        .unwrap();
    let provider = wait_for_provider_state(&client, namespace, "memory", STATE_READY, TIMEOUT)
        .await
        .unwrap();
    let status = provider.status.unwrap();
    assert_eq!(status.domains.included, vec!["example.com"]);

    create_entry(&client, namespace, "www", "www.example.com", &["1.2.3.4"])
        .await
        .unwrap();
    let entry = wait_for_entry_state(&client, namespace, "www", STATE_READY, TIMEOUT)
        .await
        .unwrap();

    let status = entry.status.clone().unwrap();
    assert_eq!(status.provider.as_deref(), Some("dnsman-test-lifecycle/memory"));
    assert_eq!(status.dns_name.as_deref(), Some("www.example.com"));
    assert_eq!(status.targets, vec!["1.2.3.4"]);
    assert!(entry
        .metadata
        .finalizers
        .unwrap_or_default()
        .contains(&FINALIZER_DNSMAN.to_string()));

    let entries: Api<DNSEntry> = Api::namespaced(client.clone(), namespace);
    entries.delete("www", &DeleteParams::default()).await.unwrap();
    wait_for_entry_deleted(&client, namespace, "www", TIMEOUT)
        .await
        .unwrap();

    cleanup_test_namespace(&client, namespace).await;
}

#[tokio::test]
#[ignore]
async fn test_invalid_entry_reports_invalid() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };
    let namespace = "dnsman-test-invalid";
    create_test_namespace(&client, namespace).await.unwrap();

    create_in_memory_provider(&client, namespace, "memory", &["example.com"])
        .await
        .unwrap();
    wait_for_provider_state(&client, namespace, "memory", STATE_READY, TIMEOUT)
        .await
        .unwrap();

    create_entry(&client, namespace, "mixed", "mixed.example.com", &["1.2.3.4", "a.example.org"])
        .await
        .unwrap();
    let entry = wait_for_entry_state(&client, namespace, "mixed", STATE_INVALID, TIMEOUT)
        .await
        .unwrap();
    assert!(entry
        .status
        .and_then(|s| s.message)
        .unwrap_or_default()
        .contains("cannot mix CNAME and other record types"));

    cleanup_test_namespace(&client, namespace).await;
}

#[tokio::test]
#[ignore]
async fn test_entry_without_provider_reports_error() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };
    let namespace = "dnsman-test-no-provider";
    create_test_namespace(&client, namespace).await.unwrap();

    create_entry(&client, namespace, "lonely", "lonely.example.net", &["1.2.3.4"])
        .await
        .unwrap();
    let entry = wait_for_entry_state(&client, namespace, "lonely", STATE_ERROR, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(
        entry.status.and_then(|s| s.message).as_deref(),
        Some("no matching DNS provider found")
    );

    cleanup_test_namespace(&client, namespace).await;
}
