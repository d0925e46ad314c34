// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS account abstraction.
//!
//! A [`DnsAccount`] is the connection to one account of a DNS service. It
//! lists hosted zones, answers record queries and executes change requests.
//! Accounts are created from a `DNSProvider` by an [`AccountFactory`].
//!
//! # Modules
//!
//! - [`selection`] - effective zone and domain selection of a provider
//! - [`registry`] - process-wide provider states and DNS name locks
//! - [`inmemory`] - the `in-memory` account implementation

pub mod inmemory;
pub mod registry;
pub mod selection;

use crate::dns::{DnsSetName, RecordSet, RecordType, RoutingPolicy, Target, ZoneId};
use crate::dns_errors::ProviderError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A hosted zone of a DNS account.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HostedZone {
    pub zone_id: ZoneId,
    /// Normalized base domain of the zone
    pub domain: String,
    pub private: bool,
}

impl HostedZone {
    #[must_use]
    pub fn new(provider_type: &str, id: &str, domain: &str) -> Self {
        Self {
            zone_id: ZoneId::new(provider_type, id),
            domain: crate::dns::normalize_domain_name(domain),
            private: false,
        }
    }
}

/// Old and new state of one record set.
///
/// `old` only is a deletion, `new` only an addition, both an update.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeRequestUpdate {
    pub old: Option<RecordSet>,
    pub new: Option<RecordSet>,
}

/// All changes of one DNS set name in one zone, keyed by record type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeRequests {
    pub name: DnsSetName,
    pub updates: BTreeMap<RecordType, ChangeRequestUpdate>,
}

impl ChangeRequests {
    #[must_use]
    pub fn new(name: DnsSetName) -> Self {
        Self {
            name,
            updates: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Keep only deletions. Used for zones an entry has moved away from.
    #[must_use]
    pub fn deletions_only(&self) -> Self {
        let updates = self
            .updates
            .iter()
            .filter(|(_, update)| update.new.is_none() && update.old.is_some())
            .map(|(rtype, update)| (*rtype, update.clone()))
            .collect();
        Self {
            name: self.name.clone(),
            updates,
        }
    }
}

impl fmt::Display for ChangeRequests {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.name)?;
        for (rtype, update) in &self.updates {
            let action = match (&update.old, &update.new) {
                (None, Some(_)) => "create",
                (Some(_), None) => "delete",
                _ => "update",
            };
            write!(f, " {action} {rtype}")?;
        }
        Ok(())
    }
}

/// Connection to an account of a DNS service.
#[async_trait]
pub trait DnsAccount: Send + Sync {
    /// Provider type the account was created for.
    fn provider_type(&self) -> &str;

    /// All hosted zones reachable with the account.
    async fn get_zones(&self) -> Result<Vec<HostedZone>, ProviderError>;

    /// Current record set of a name and type, `None` if absent.
    async fn query(
        &self,
        zone: &HostedZone,
        name: &DnsSetName,
        record_type: RecordType,
    ) -> Result<Option<RecordSet>, ProviderError>;

    /// Apply the change requests of one DNS set name in a zone.
    async fn execute_requests(
        &self,
        zone: &HostedZone,
        requests: &ChangeRequests,
    ) -> Result<(), ProviderError>;
}

/// Creates accounts for the provider types it supports.
pub trait AccountFactory: Send + Sync {
    fn supports(&self, provider_type: &str) -> bool;

    /// Create an account from the raw `providerConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidConfig`] if the config cannot be parsed
    /// and [`ProviderError::UnsupportedType`] for unknown types.
    fn create(
        &self,
        provider_type: &str,
        config: Option<&serde_json::Value>,
    ) -> Result<Arc<dyn DnsAccount>, ProviderError>;
}

/// Answers record queries for one zone.
#[async_trait]
pub trait DnsQueryHandler: Send + Sync {
    async fn query(
        &self,
        dns_name: &str,
        set_identifier: &str,
        record_type: RecordType,
    ) -> Result<(Vec<Target>, Option<RoutingPolicy>), ProviderError>;
}

/// Query handler backed by the account owning the zone.
pub struct AccountQueryHandler {
    account: Arc<dyn DnsAccount>,
    zone: HostedZone,
}

impl AccountQueryHandler {
    #[must_use]
    pub fn new(account: Arc<dyn DnsAccount>, zone: HostedZone) -> Self {
        Self { account, zone }
    }
}

#[async_trait]
impl DnsQueryHandler for AccountQueryHandler {
    async fn query(
        &self,
        dns_name: &str,
        set_identifier: &str,
        record_type: RecordType,
    ) -> Result<(Vec<Target>, Option<RoutingPolicy>), ProviderError> {
        let name = DnsSetName::new(dns_name).with_set_identifier(set_identifier);
        let Some(record_set) = self.account.query(&self.zone, &name, record_type).await? else {
            return Ok((Vec::new(), None));
        };

        let targets = record_set
            .records
            .iter()
            .map(|value| Target::new(record_type, value.clone(), record_set.ttl))
            .collect();
        Ok((targets, record_set.routing_policy))
    }
}

/// Account factory dispatching to a list of factories, honoring the
/// enabled/disabled provider type configuration.
pub struct CompoundAccountFactory {
    factories: Vec<Box<dyn AccountFactory>>,
    enabled_types: Vec<String>,
    disabled_types: Vec<String>,
}

impl CompoundAccountFactory {
    #[must_use]
    pub fn new(enabled_types: Vec<String>, disabled_types: Vec<String>) -> Self {
        Self {
            factories: Vec::new(),
            enabled_types,
            disabled_types,
        }
    }

    #[must_use]
    pub fn with_factory(mut self, factory: Box<dyn AccountFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    /// Returns true if the type is allowed by configuration.
    #[must_use]
    pub fn is_enabled(&self, provider_type: &str) -> bool {
        if self.disabled_types.iter().any(|t| t == provider_type) {
            return false;
        }
        self.enabled_types.is_empty() || self.enabled_types.iter().any(|t| t == provider_type)
    }
}

impl AccountFactory for CompoundAccountFactory {
    fn supports(&self, provider_type: &str) -> bool {
        self.is_enabled(provider_type) && self.factories.iter().any(|f| f.supports(provider_type))
    }

    fn create(
        &self,
        provider_type: &str,
        config: Option<&serde_json::Value>,
    ) -> Result<Arc<dyn DnsAccount>, ProviderError> {
        if !self.is_enabled(provider_type) {
            return Err(ProviderError::TypeNotEnabled(provider_type.to_string()));
        }
        self.factories
            .iter()
            .find(|f| f.supports(provider_type))
            .ok_or_else(|| ProviderError::UnsupportedType(provider_type.to_string()))?
            .create(provider_type, config)
    }
}
