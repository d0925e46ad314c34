// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster access of the entry reconciler.

use crate::config::ControllerConfig;
use crate::constants::FINALIZER_DNSMAN;
use crate::context::Stores;
use crate::crd::{DNSEntry, DNSEntryStatus, DNSProvider};
use crate::reconcilers::{finalizers, status};
use anyhow::Result;
use async_trait::async_trait;
use kube::{Client, ResourceExt};

/// Reads providers and writes finalizers and status of entries.
#[async_trait]
pub trait EntryClient: Send + Sync {
    /// Providers of the entry's namespace that belong to the controller class.
    async fn list_providers(&self, namespace: &str) -> Result<Vec<DNSProvider>>;

    async fn add_finalizer(&self, entry: &DNSEntry) -> Result<()>;

    async fn remove_finalizer(&self, entry: &DNSEntry) -> Result<()>;

    async fn update_status(&self, entry: &DNSEntry, status: &DNSEntryStatus) -> Result<()>;
}

/// [`EntryClient`] backed by the API server and the reflector stores.
pub struct KubeEntryClient {
    client: Client,
    stores: Stores,
    config: ControllerConfig,
}

impl KubeEntryClient {
    #[must_use]
    pub fn new(client: Client, stores: Stores, config: ControllerConfig) -> Self {
        Self {
            client,
            stores,
            config,
        }
    }
}

#[async_trait]
impl EntryClient for KubeEntryClient {
    async fn list_providers(&self, namespace: &str) -> Result<Vec<DNSProvider>> {
        Ok(self.stores.providers_for_class(namespace, &self.config))
    }

    async fn add_finalizer(&self, entry: &DNSEntry) -> Result<()> {
        finalizers::ensure_finalizer(&self.client, entry, FINALIZER_DNSMAN).await?;
        Ok(())
    }

    async fn remove_finalizer(&self, entry: &DNSEntry) -> Result<()> {
        finalizers::remove_finalizer(&self.client, entry, FINALIZER_DNSMAN).await?;
        Ok(())
    }

    async fn update_status(&self, entry: &DNSEntry, new_status: &DNSEntryStatus) -> Result<()> {
        tracing::debug!(entry = %entry.name_any(), state = %new_status.state, "Writing entry status");
        status::patch_status(&self.client, entry, new_status).await
    }
}
