// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation controllers for DNS resources.
//!
//! # Reconciliation Architecture
//!
//! dnsman follows the standard Kubernetes controller pattern:
//!
//! 1. **Watch** - Monitor `DNSEntry` and `DNSProvider` changes
//! 2. **Reconcile** - Compare the records of an entry with the records in its hosted zone
//! 3. **Update** - Execute change requests against the provider account
//! 4. **Status** - Report reconciliation results back to Kubernetes
//!
//! # Available Reconcilers
//!
//! - [`reconcile_dnsprovider`] - Registers provider accounts and their zones
//! - [`reconcile_dnsentry`] - Synchronizes the records of an entry
//!
//! Both entry points build their reconciler from the shared [`Context`]. The
//! reconcilers themselves only depend on the [`dnsentry::client::EntryClient`]
//! and [`dnsprovider::ProviderClient`] traits, so tests run them without a
//! cluster.

pub mod dnsentry;
pub mod dnsprovider;
pub mod finalizers;
pub mod retry;
pub mod status;

use crate::context::Context;
use crate::crd::{DNSEntry, DNSProvider};
use anyhow::Result;
use dnsentry::client::KubeEntryClient;
use dnsentry::EntryReconciler;
use dnsprovider::{KubeProviderClient, ProviderReconciler};
use kube::runtime::controller::Action;
use std::sync::Arc;

/// Reconcile a `DNSEntry` with the providers known to the context.
///
/// # Errors
///
/// Returns an error if the records cannot be synchronized or a Kubernetes API
/// call fails.
pub async fn reconcile_dnsentry(ctx: Arc<Context>, entry: &DNSEntry) -> Result<Action> {
    let client = KubeEntryClient::new(ctx.client.clone(), ctx.stores.clone(), ctx.config.clone());
    let reconciler = EntryReconciler::new(
        Arc::new(client),
        Arc::clone(&ctx.registry),
        Arc::clone(&ctx.lookup_processor),
        ctx.config.default_cname_lookup_interval,
        ctx.shutdown.clone(),
    );
    reconciler.reconcile(entry).await
}

/// Reconcile a `DNSProvider` into the provider registry.
///
/// # Errors
///
/// Returns an error if the zones of the provider account cannot be listed or
/// a Kubernetes API call fails.
pub async fn reconcile_dnsprovider(ctx: Arc<Context>, provider: &DNSProvider) -> Result<Action> {
    let reconciler = ProviderReconciler::new(
        Arc::new(KubeProviderClient::new(ctx.client.clone())),
        Arc::clone(&ctx.registry),
        Arc::clone(&ctx.account_factory),
        ctx.config.default_ttl,
        ctx.config.provider_recheck_period,
    );
    reconciler.reconcile(provider).await
}
