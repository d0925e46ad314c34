// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for all controllers.
//!
//! Both controllers receive an `Arc<Context>` that contains:
//! - Kubernetes client
//! - Reflector stores for `DNSEntry` and `DNSProvider`
//! - Controller configuration
//! - The provider registry, account factory and lookup processor
//!
//! The stores answer namespace queries in memory, so provider selection and
//! watch mappers never call the API server.

use crate::config::ControllerConfig;
use crate::constants::ANNOTATION_CLASS;
use crate::crd::{DNSEntry, DNSProvider, ObjectKey};
use crate::lookup::processor::{EntryTrigger, LookupProcessor};
use crate::provider::registry::ProviderRegistry;
use crate::provider::AccountFactory;
use anyhow::Context as _;
use async_trait::async_trait;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Client, ResourceExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Shared context passed to all controllers.
#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub stores: Stores,
    pub config: ControllerConfig,
    pub registry: Arc<ProviderRegistry>,
    pub account_factory: Arc<dyn AccountFactory>,
    pub lookup_processor: Arc<LookupProcessor>,
    /// Cancelled on shutdown
    pub shutdown: CancellationToken,
}

/// Reflector stores of the custom resources.
#[derive(Clone)]
pub struct Stores {
    pub dns_entries: Store<DNSEntry>,
    pub dns_providers: Store<DNSProvider>,
}

impl Stores {
    /// Providers of a namespace that belong to the controller class.
    #[must_use]
    pub fn providers_for_class(&self, namespace: &str, config: &ControllerConfig) -> Vec<DNSProvider> {
        let mut providers: Vec<DNSProvider> = self
            .dns_providers
            .state()
            .iter()
            .filter(|p| p.namespace().as_deref() == Some(namespace))
            .filter(|p| config.is_responsible_for(class_of(p.as_ref())))
            .map(|p| p.as_ref().clone())
            .collect();
        providers.sort_by_key(ResourceExt::name_any);
        providers
    }

    /// References of all entries in a namespace, for re-triggering them
    /// after a provider change.
    #[must_use]
    pub fn entries_in_namespace(&self, namespace: &str) -> Vec<ObjectRef<DNSEntry>> {
        self.dns_entries
            .state()
            .iter()
            .filter(|e| e.namespace().as_deref() == Some(namespace))
            .map(|e| ObjectRef::from_obj(e.as_ref()))
            .collect()
    }
}

/// Class annotation of a resource.
#[must_use]
pub fn class_of<K: ResourceExt>(resource: &K) -> Option<&str> {
    resource.annotations().get(ANNOTATION_CLASS).map(String::as_str)
}

/// Feeds entries to the entry controller through its `reconcile_on` stream.
pub struct ChannelEntryTrigger {
    sender: mpsc::Sender<ObjectRef<DNSEntry>>,
}

impl ChannelEntryTrigger {
    #[must_use]
    pub fn new(sender: mpsc::Sender<ObjectRef<DNSEntry>>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl EntryTrigger for ChannelEntryTrigger {
    async fn trigger_reconciliation(&self, key: &ObjectKey) -> anyhow::Result<()> {
        let object_ref = ObjectRef::new(&key.name).within(&key.namespace);
        self.sender
            .send(object_ref)
            .await
            .with_context(|| format!("entry controller stopped, cannot trigger {key}"))
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
