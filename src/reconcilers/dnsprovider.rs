// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `DNSProvider` reconciliation.
//!
//! A provider is turned into a [`ProviderState`] in the registry: the account
//! created from its `providerConfig`, the zones of that account and the
//! effective zone and domain selection. Entries only ever use providers found
//! in the registry; a provider that fails validation or cannot reach its
//! account is removed from it.

use crate::constants::{FINALIZER_DNSMAN, STATE_ERROR, STATE_INVALID, STATE_READY};
use crate::crd::{DNSProvider, DNSProviderStatus, ObjectKey};
use crate::dns_errors::ProviderError;
use crate::provider::registry::{ProviderRegistry, ProviderState};
use crate::provider::selection::calc_zone_and_domain_selection;
use crate::provider::AccountFactory;
use crate::reconcilers::finalizers::{self, has_finalizer};
use crate::reconcilers::status::{self, ProviderStatusUpdater};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Message of a provider in state `Ready`
const MESSAGE_OPERATIONAL: &str = "provider operational";

/// Writes finalizers and status of providers.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn add_finalizer(&self, provider: &DNSProvider) -> Result<()>;

    async fn remove_finalizer(&self, provider: &DNSProvider) -> Result<()>;

    async fn update_status(&self, provider: &DNSProvider, status: &DNSProviderStatus) -> Result<()>;
}

/// [`ProviderClient`] backed by the API server.
pub struct KubeProviderClient {
    client: Client,
}

impl KubeProviderClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderClient for KubeProviderClient {
    async fn add_finalizer(&self, provider: &DNSProvider) -> Result<()> {
        finalizers::ensure_finalizer(&self.client, provider, FINALIZER_DNSMAN).await?;
        Ok(())
    }

    async fn remove_finalizer(&self, provider: &DNSProvider) -> Result<()> {
        finalizers::remove_finalizer(&self.client, provider, FINALIZER_DNSMAN).await?;
        Ok(())
    }

    async fn update_status(&self, provider: &DNSProvider, new_status: &DNSProviderStatus) -> Result<()> {
        status::patch_status(&self.client, provider, new_status).await
    }
}

/// Reconciles `DNSProvider` resources into the provider registry.
pub struct ProviderReconciler {
    client: Arc<dyn ProviderClient>,
    registry: Arc<ProviderRegistry>,
    account_factory: Arc<dyn AccountFactory>,
    default_ttl: i64,
    recheck_period: Duration,
}

impl ProviderReconciler {
    #[must_use]
    pub fn new(
        client: Arc<dyn ProviderClient>,
        registry: Arc<ProviderRegistry>,
        account_factory: Arc<dyn AccountFactory>,
        default_ttl: i64,
        recheck_period: Duration,
    ) -> Self {
        Self {
            client,
            registry,
            account_factory,
            default_ttl,
            recheck_period,
        }
    }

    /// Reconcile one provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the zones of the account cannot be listed or a
    /// Kubernetes API call fails.
    pub async fn reconcile(&self, provider: &DNSProvider) -> Result<Action> {
        let key = ObjectKey::from_resource(provider);
        let provider_type = provider.spec.provider_type.as_str();

        if provider.metadata.deletion_timestamp.is_some() {
            info!(provider = %key, "Deleting provider");
            self.registry.delete(&key).await;
            if has_finalizer(provider, FINALIZER_DNSMAN) {
                self.client.remove_finalizer(provider).await?;
            }
            return Ok(Action::await_change());
        }

        let account = match self
            .account_factory
            .create(provider_type, provider.spec.provider_config.as_ref())
        {
            Err(e @ (ProviderError::TypeNotEnabled(_) | ProviderError::UnsupportedType(_))) => {
                info!(provider = %key, "Provider invalid: {e}");
                self.registry.delete(&key).await;
                self.update_status_failed(provider, STATE_INVALID, e.to_string())
                    .await?;
                return Ok(Action::await_change());
            }
            other => other,
        };

        if !has_finalizer(provider, FINALIZER_DNSMAN) {
            self.client.add_finalizer(provider).await?;
        }

        let account = match account {
            Ok(account) => account,
            Err(e) => {
                warn!(provider = %key, "Failed to create account: {e}");
                self.registry.delete(&key).await;
                self.update_status_failed(provider, STATE_ERROR, e.to_string())
                    .await?;
                return Ok(Action::requeue(self.recheck_period));
            }
        };

        let all_zones = match account.get_zones().await {
            Ok(zones) if zones.is_empty() => Err(anyhow!("no hosted zones available in account")),
            Ok(zones) => Ok(zones),
            Err(e) => Err(e.into()),
        };
        let all_zones = match all_zones {
            Ok(zones) => zones,
            Err(e) => {
                warn!(provider = %key, "Failed to get zones: {e:#}");
                self.registry.delete(&key).await;
                if let Err(status_err) = self
                    .update_status_failed(provider, STATE_ERROR, format!("{e:#}"))
                    .await
                {
                    warn!(provider = %key, "Failed to update provider status: {status_err:#}");
                }
                return Err(e);
            }
        };

        let selection = calc_zone_and_domain_selection(&provider.spec, &all_zones);
        for warning in &selection.warnings {
            warn!(provider = %key, "{warning}");
        }
        if let Some(err) = &selection.error {
            info!(provider = %key, "Zone selection failed: {err}");
            self.registry.delete(&key).await;
            self.update_status_failed(provider, STATE_ERROR, err.to_string())
                .await?;
            return Ok(Action::requeue(self.recheck_period));
        }

        let default_ttl = provider.spec.default_ttl.unwrap_or(self.default_ttl);
        let mut updater = ProviderStatusUpdater::for_provider(provider);
        let status = updater.status_mut();
        status.domains = selection.domain_sel.to_status();
        status.zones = selection.zone_sel.to_status();
        status.default_ttl = Some(default_ttl);
        updater.set_state(STATE_READY, MESSAGE_OPERATIONAL, provider.metadata.generation);

        debug!(
            provider = %key,
            zones = selection.zones.len(),
            all_zones = all_zones.len(),
            "Provider zones selected"
        );
        self.registry
            .upsert(ProviderState {
                key: key.clone(),
                provider_type: provider_type.to_string(),
                account,
                all_zones,
                selection,
                default_ttl,
            })
            .await;

        if let Some(new_status) = updater.finish() {
            info!(provider = %key, "Provider operational");
            self.client.update_status(provider, &new_status).await?;
        }
        Ok(Action::requeue(self.recheck_period))
    }

    async fn update_status_failed(
        &self,
        provider: &DNSProvider,
        state: &str,
        message: String,
    ) -> Result<()> {
        let mut updater = ProviderStatusUpdater::for_provider(provider);
        updater.set_state(state, message, provider.metadata.generation);
        if let Some(new_status) = updater.finish() {
            debug!(provider = %provider.name_any(), state = %state, "Writing provider status");
            self.client.update_status(provider, &new_status).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "dnsprovider_tests.rs"]
mod dnsprovider_tests;
