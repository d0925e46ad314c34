// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The `in-memory` DNS account.
//!
//! Keeps all records in process memory. Used for local clusters and tests.
//!
//! # Provider config
//!
//! ```yaml
//! providerConfig:
//!   zones:
//!     - dnsName: example.com
//!     - dnsName: internal.example.com
//!       zoneId: internal
//!       private: true
//!   supportRoutingPolicy: true
//! ```
//!
//! Accounts created from identical configs share their records, so several
//! providers can manage the same zones.

use super::{AccountFactory, ChangeRequests, DnsAccount, HostedZone};
use crate::dns::{normalize_domain_name, DnsSetName, RecordSet, RecordType, ZoneId};
use crate::dns_errors::ProviderError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError};
use tokio::sync::Mutex;
use tracing::debug;

/// Provider type handled by this module
pub const PROVIDER_TYPE_IN_MEMORY: &str = "in-memory";

/// `providerConfig` of an in-memory provider.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InMemoryConfig {
    #[serde(default)]
    pub zones: Vec<InMemoryZoneConfig>,

    /// Make `get_zones` fail, for testing error paths
    #[serde(default)]
    pub fail_get_zones: bool,

    /// Accept record sets with a routing policy
    #[serde(default)]
    pub support_routing_policy: bool,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InMemoryZoneConfig {
    pub dns_name: String,

    /// Defaults to the DNS name
    #[serde(default)]
    pub zone_id: Option<String>,

    #[serde(default)]
    pub private: bool,
}

type ZoneRecords = BTreeMap<(DnsSetName, RecordType), RecordSet>;

/// Record storage shared by all accounts of the same config.
#[derive(Default)]
pub struct InMemoryStore {
    zones: Mutex<BTreeMap<ZoneId, ZoneRecords>>,
}

impl InMemoryStore {
    /// Record set of a zone, for inspection in tests and debugging.
    pub async fn get(
        &self,
        zone_id: &ZoneId,
        name: &DnsSetName,
        record_type: RecordType,
    ) -> Option<RecordSet> {
        let zones = self.zones.lock().await;
        zones
            .get(zone_id)
            .and_then(|records| records.get(&(name.normalize(), record_type)))
            .cloned()
    }

    /// Number of record sets stored in a zone.
    pub async fn record_set_count(&self, zone_id: &ZoneId) -> usize {
        self.zones.lock().await.get(zone_id).map_or(0, BTreeMap::len)
    }
}

/// A [`DnsAccount`] storing records in memory.
pub struct InMemoryAccount {
    config: InMemoryConfig,
    zones: Vec<HostedZone>,
    store: Arc<InMemoryStore>,
}

impl InMemoryAccount {
    #[must_use]
    pub fn new(config: InMemoryConfig, store: Arc<InMemoryStore>) -> Self {
        let zones = config
            .zones
            .iter()
            .map(|z| {
                let id = z
                    .zone_id
                    .clone()
                    .unwrap_or_else(|| normalize_domain_name(&z.dns_name));
                HostedZone {
                    private: z.private,
                    ..HostedZone::new(PROVIDER_TYPE_IN_MEMORY, &id, &z.dns_name)
                }
            })
            .collect();
        Self {
            config,
            zones,
            store,
        }
    }

    #[must_use]
    pub fn store(&self) -> Arc<InMemoryStore> {
        Arc::clone(&self.store)
    }

    fn check_zone(&self, zone: &HostedZone) -> Result<(), ProviderError> {
        if self.zones.iter().any(|z| z.zone_id == zone.zone_id) {
            Ok(())
        } else {
            Err(ProviderError::ZoneNotFound(zone.zone_id.to_string()))
        }
    }
}

#[async_trait]
impl DnsAccount for InMemoryAccount {
    fn provider_type(&self) -> &str {
        PROVIDER_TYPE_IN_MEMORY
    }

    async fn get_zones(&self) -> Result<Vec<HostedZone>, ProviderError> {
        if self.config.fail_get_zones {
            return Err(ProviderError::GetZones(
                "forced failure (failGetZones)".to_string(),
            ));
        }
        Ok(self.zones.clone())
    }

    async fn query(
        &self,
        zone: &HostedZone,
        name: &DnsSetName,
        record_type: RecordType,
    ) -> Result<Option<RecordSet>, ProviderError> {
        self.check_zone(zone)?;
        Ok(self.store.get(&zone.zone_id, name, record_type).await)
    }

    async fn execute_requests(
        &self,
        zone: &HostedZone,
        requests: &ChangeRequests,
    ) -> Result<(), ProviderError> {
        self.check_zone(zone)?;
        if !self.config.support_routing_policy
            && requests
                .updates
                .values()
                .filter_map(|u| u.new.as_ref())
                .any(|rs| rs.routing_policy.is_some())
        {
            return Err(ProviderError::RoutingPolicyNotSupported(
                PROVIDER_TYPE_IN_MEMORY.to_string(),
            ));
        }

        let name = requests.name.normalize();
        let mut zones = self.store.zones.lock().await;
        let records = zones.entry(zone.zone_id.clone()).or_default();
        for (rtype, update) in &requests.updates {
            let key = (name.clone(), *rtype);
            if update.old.is_some() {
                records.remove(&key);
            }
            if let Some(new) = &update.new {
                records.insert(key, new.clone());
            }
            debug!(
                zone = %zone.zone_id,
                name = %name,
                record_type = %rtype,
                "Applied in-memory record change"
            );
        }
        Ok(())
    }
}

/// Factory for [`InMemoryAccount`]s.
#[derive(Default)]
pub struct InMemoryAccountFactory {
    stores: std::sync::Mutex<HashMap<String, Arc<InMemoryStore>>>,
}

impl InMemoryAccountFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn store_for(&self, config_key: String) -> Arc<InMemoryStore> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(stores.entry(config_key).or_default())
    }

    /// Create an account directly from a parsed config.
    #[must_use]
    pub fn create_account(&self, config: InMemoryConfig, config_key: String) -> InMemoryAccount {
        let store = self.store_for(config_key);
        InMemoryAccount::new(config, store)
    }
}

impl AccountFactory for InMemoryAccountFactory {
    fn supports(&self, provider_type: &str) -> bool {
        provider_type == PROVIDER_TYPE_IN_MEMORY
    }

    fn create(
        &self,
        provider_type: &str,
        config: Option<&serde_json::Value>,
    ) -> Result<Arc<dyn DnsAccount>, ProviderError> {
        if !self.supports(provider_type) {
            return Err(ProviderError::UnsupportedType(provider_type.to_string()));
        }
        let raw = config.cloned().unwrap_or(serde_json::Value::Null);
        let parsed: InMemoryConfig = if raw.is_null() {
            InMemoryConfig::default()
        } else {
            serde_json::from_value(raw.clone()).map_err(|e| ProviderError::InvalidConfig {
                provider_type: provider_type.to_string(),
                reason: e.to_string(),
            })?
        };
        Ok(Arc::new(self.create_account(parsed, raw.to_string())))
    }
}

#[cfg(test)]
#[path = "inmemory_tests.rs"]
mod inmemory_tests;
