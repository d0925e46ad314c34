// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Selection of the provider and hosted zone of an entry.
//!
//! The provider whose effective domains match the DNS name longest wins.
//! Ready providers are preferred over providers that are not ready. On equal
//! match length the current provider of the entry is kept; otherwise the
//! provider key that sorts first wins.

use crate::constants::{PROVIDER_STATE_REQUEUE_SECS, STATE_READY};
use crate::crd::{DNSProvider, ObjectKey};
use crate::dns::{matches_domain, match_selection, normalize_domain_name, ZoneId};
use crate::provider::registry::{ProviderRegistry, ProviderState};
use crate::provider::HostedZone;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;

/// Provider, zone and state chosen for an entry.
#[derive(Debug)]
pub struct NewProviderData {
    pub provider: DNSProvider,
    pub provider_key: ObjectKey,
    pub zone_id: ZoneId,
    pub default_ttl: i64,
    pub provider_state: Arc<ProviderState>,
}

/// Outcome of [`calc_new_provider`].
#[derive(Debug)]
pub enum ProviderSelection {
    Found(Box<NewProviderData>),
    /// The best provider is not ready; the message goes into the entry status
    NotReady { provider_key: ObjectKey, message: String },
    /// The provider state is not populated yet
    Requeue(Duration),
    NoProvider,
}

#[derive(Default)]
struct ProviderMatch<'a> {
    found: Option<&'a DNSProvider>,
    length: usize,
}

impl<'a> ProviderMatch<'a> {
    fn offer(&mut self, provider: &'a DNSProvider, length: usize, is_current: bool) {
        if length > self.length || (length == self.length && is_current) {
            self.found = Some(provider);
            self.length = length;
        }
    }
}

/// Best matching provider for a DNS name.
///
/// `current_provider` is the provider key stored in the entry status.
#[must_use]
pub fn find_best_matching_provider<'a>(
    providers: &'a [DNSProvider],
    dns_name: &str,
    current_provider: Option<&str>,
) -> Option<&'a DNSProvider> {
    let dns_name = normalize_domain_name(dns_name);

    let mut sorted: Vec<(String, &DNSProvider)> = providers
        .iter()
        .map(|p| (ObjectKey::from_resource(p).to_string(), p))
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut ready = ProviderMatch::default();
    let mut not_ready = ProviderMatch::default();
    for (key, provider) in sorted {
        let Some(status) = provider.status.as_ref() else {
            continue;
        };
        let length = match_selection(
            &dns_name,
            &status.domains.included,
            &status.domains.excluded,
        );
        if length == 0 {
            continue;
        }
        let is_current = current_provider == Some(key.as_str());
        if status.state == STATE_READY {
            ready.offer(provider, length, is_current);
        } else {
            not_ready.offer(provider, length, is_current);
        }
    }

    ready.found.or(not_ready.found)
}

/// Selected zone of a provider with the longest domain matching the DNS name.
///
/// Zones are compared in zone id order, so equal lengths keep the first zone.
#[must_use]
pub fn find_best_zone<'a>(state: &'a ProviderState, dns_name: &str) -> Option<&'a HostedZone> {
    let dns_name = normalize_domain_name(dns_name);

    let mut zones: Vec<&HostedZone> = state.zones().iter().collect();
    zones.sort_by(|a, b| a.zone_id.cmp(&b.zone_id));

    let mut best: Option<&HostedZone> = None;
    for zone in zones {
        if !matches_domain(&dns_name, &zone.domain) {
            continue;
        }
        if best.is_none_or(|b| zone.domain.len() > b.domain.len()) {
            best = Some(zone);
        }
    }
    best
}

/// Choose the provider and zone for an entry.
///
/// `providers` must already be filtered by namespace and class.
///
/// # Errors
///
/// Returns an error if the chosen provider has no zone for the DNS name.
pub async fn calc_new_provider(
    providers: &[DNSProvider],
    dns_name: &str,
    current_provider: Option<&str>,
    registry: &ProviderRegistry,
) -> Result<ProviderSelection> {
    let Some(provider) = find_best_matching_provider(providers, dns_name, current_provider) else {
        return Ok(ProviderSelection::NoProvider);
    };
    let provider_key = ObjectKey::from_resource(provider);

    let status = provider.status.clone().unwrap_or_default();
    if status.state != STATE_READY {
        let message = if status.state.is_empty() {
            format!("provider {provider_key} is not ready yet")
        } else {
            format!(
                "provider {provider_key} has status {}: {}",
                status.state,
                status.message.as_deref().unwrap_or("unknown error")
            )
        };
        return Ok(ProviderSelection::NotReady {
            provider_key,
            message,
        });
    }

    let Some(provider_state) = registry.get(&provider_key).await else {
        return Ok(ProviderSelection::Requeue(Duration::from_secs(
            PROVIDER_STATE_REQUEUE_SECS,
        )));
    };

    let zone_id = find_best_zone(&provider_state, dns_name)
        .map(|zone| zone.zone_id.clone())
        .ok_or_else(|| {
            anyhow!(
                "no matching zone found for DNS name {dns_name:?} in provider {:?}",
                provider_key.to_string()
            )
        })?;

    Ok(ProviderSelection::Found(Box::new(NewProviderData {
        provider: provider.clone(),
        default_ttl: provider_state.default_ttl,
        provider_key,
        zone_id,
        provider_state,
    })))
}
