// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Process-wide provider registry.
//!
//! The provider reconciler stores a [`ProviderState`] for every successfully
//! reconciled `DNSProvider`. Entry reconciliation only reads it and requeues
//! while a state is missing.
//!
//! The registry also owns the DNS name lock table that keeps two entries with
//! the same DNS name from being reconciled at the same time.

use super::selection::SelectionResult;
use super::{AccountQueryHandler, DnsAccount, DnsQueryHandler, HostedZone};
use crate::crd::ObjectKey;
use crate::dns::ZoneId;
use crate::dns_errors::ProviderError;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;
use tracing::debug;

/// Account and zone information of a reconciled provider.
pub struct ProviderState {
    pub key: ObjectKey,
    pub provider_type: String,
    pub account: Arc<dyn DnsAccount>,
    /// All zones of the account, selected or not
    pub all_zones: Vec<HostedZone>,
    pub selection: SelectionResult,
    pub default_ttl: i64,
}

impl ProviderState {
    /// Selected zones of the provider.
    #[must_use]
    pub fn zones(&self) -> &[HostedZone] {
        &self.selection.zones
    }

    /// Find a selected zone by id.
    #[must_use]
    pub fn find_zone(&self, zone_id: &ZoneId) -> Option<&HostedZone> {
        self.selection.zones.iter().find(|z| z.zone_id == *zone_id)
    }
}

impl std::fmt::Debug for ProviderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderState")
            .field("key", &self.key)
            .field("provider_type", &self.provider_type)
            .field("zones", &self.selection.zones)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

/// Registry of provider states.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<BTreeMap<ObjectKey, Arc<ProviderState>>>,
    dns_name_locks: Mutex<HashSet<String>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &ObjectKey) -> Option<Arc<ProviderState>> {
        self.providers.read().await.get(key).cloned()
    }

    pub async fn upsert(&self, state: ProviderState) -> Arc<ProviderState> {
        let state = Arc::new(state);
        debug!(provider = %state.key, zones = state.selection.zones.len(), "Storing provider state");
        self.providers
            .write()
            .await
            .insert(state.key.clone(), Arc::clone(&state));
        state
    }

    /// Remove a provider state. Removing an unknown key is a no-op.
    pub async fn delete(&self, key: &ObjectKey) {
        if self.providers.write().await.remove(key).is_some() {
            debug!(provider = %key, "Removed provider state");
        }
    }

    /// Find the account and zone for a zone id across all providers.
    ///
    /// Used to clean up records in zones an entry no longer belongs to,
    /// which may be owned by a different provider than the current one.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NoAccountForZone`] if no provider sees the zone.
    pub async fn find_account_for_zone(
        &self,
        zone_id: &ZoneId,
    ) -> Result<(Arc<dyn DnsAccount>, HostedZone), ProviderError> {
        let providers = self.providers.read().await;
        providers
            .values()
            .find_map(|state| {
                state
                    .all_zones
                    .iter()
                    .find(|z| z.zone_id == *zone_id)
                    .map(|z| (Arc::clone(&state.account), z.clone()))
            })
            .ok_or_else(|| ProviderError::NoAccountForZone(zone_id.to_string()))
    }

    /// Query handler for a zone.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NoAccountForZone`] if no provider sees the zone.
    pub async fn query_handler_for_zone(
        &self,
        zone_id: &ZoneId,
    ) -> Result<Arc<dyn DnsQueryHandler>, ProviderError> {
        let (account, zone) = self.find_account_for_zone(zone_id).await?;
        Ok(Arc::new(AccountQueryHandler::new(account, zone)))
    }

    /// Lock DNS names for one reconciliation.
    ///
    /// Returns `None` if any of the names is already locked. The locks are
    /// released when the guard is dropped.
    pub fn try_lock_dns_names(&self, names: &[String]) -> Option<DnsNameLockGuard<'_>> {
        let mut locks = self
            .dns_name_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if names.iter().any(|name| locks.contains(name)) {
            return None;
        }
        let mut locked = Vec::with_capacity(names.len());
        for name in names {
            if locks.insert(name.clone()) {
                locked.push(name.clone());
            }
        }
        Some(DnsNameLockGuard {
            registry: self,
            names: locked,
        })
    }

    fn unlock_dns_names(&self, names: &[String]) {
        let mut locks = self
            .dns_name_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for name in names {
            locks.remove(name);
        }
    }
}

/// Releases DNS name locks on drop.
pub struct DnsNameLockGuard<'a> {
    registry: &'a ProviderRegistry,
    names: Vec<String>,
}

impl DnsNameLockGuard<'_> {
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Drop for DnsNameLockGuard<'_> {
    fn drop(&mut self) {
        self.registry.unlock_dns_names(&self.names);
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod registry_tests;
