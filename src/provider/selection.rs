// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Zone and domain selection for DNS providers.
//!
//! Given the include/exclude filters of a `DNSProvider` and all hosted zones
//! visible to its account, [`calc_zone_and_domain_selection`] computes the
//! zones the provider is responsible for and the effective domain
//! include/exclude lists that entries are matched against.
//!
//! Forwarded zones need special care. A zone is *forwarded* under another
//! zone of the same account if its domain is a subdomain of the other zone's
//! domain. A parent zone is dropped when all of its included domains are
//! served by a more specific forwarded zone.

use super::HostedZone;
use crate::crd::{DNSProviderSpec, DNSSelection, DNSSelectionStatus};
use crate::dns::{matches_domain, normalize_domain_name};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Hard errors of the selection. The message is stored in the provider status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("wildcards are not allowed in {filter} '{domain}' (hint: remove the wildcard)")]
    WildcardDomain { filter: &'static str, domain: String },

    #[error("no zone available in account matches zone filter")]
    NoZoneMatchesFilter,

    #[error("no hosted zones found")]
    NoHostedZones,

    #[error("no domain matching hosting zones. Need to be a (sub)domain of [{}]", .zone_domains.join(", "))]
    NoMatchingDomain { zone_domains: Vec<String> },
}

/// A pair of include and exclude sets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubSelection {
    pub include: BTreeSet<String>,
    pub exclude: BTreeSet<String>,
}

impl SubSelection {
    /// Build a sub selection from an optional spec filter.
    #[must_use]
    pub fn prepare(selection: Option<&DNSSelection>) -> Self {
        selection
            .map(|sel| Self {
                include: sel.include.iter().cloned().collect(),
                exclude: sel.exclude.iter().cloned().collect(),
            })
            .unwrap_or_default()
    }

    /// Sorted status lists.
    #[must_use]
    pub fn to_status(&self) -> DNSSelectionStatus {
        DNSSelectionStatus {
            included: self.include.iter().cloned().collect(),
            excluded: self.exclude.iter().cloned().collect(),
        }
    }
}

/// Result of [`calc_zone_and_domain_selection`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionResult {
    /// Selected hosted zones, in account order
    pub zones: Vec<HostedZone>,
    /// Zone filter as given in the spec
    pub spec_zone_sel: SubSelection,
    /// Domain filter as given in the spec
    pub spec_domain_sel: SubSelection,
    /// Effective zone id selection
    pub zone_sel: SubSelection,
    /// Effective domain selection
    pub domain_sel: SubSelection,
    pub error: Option<SelectionError>,
    pub warnings: Vec<String>,
}

/// Compute the effective zone and domain selection of a provider.
///
/// `all_zones` are all zones of the account, including zones of other
/// provider types. Only zones whose `ZoneId::provider_type` equals the spec
/// type can be selected, but all zones take part in the forwarded zone
/// detection and in the final domain exclusion.
#[must_use]
pub fn calc_zone_and_domain_selection(
    spec: &DNSProviderSpec,
    all_zones: &[HostedZone],
) -> SelectionResult {
    let mut result = SelectionResult {
        spec_domain_sel: SubSelection::prepare(spec.domains.as_ref()),
        spec_zone_sel: SubSelection::prepare(spec.zones.as_ref()),
        ..Default::default()
    };

    if let Err(err) = validate_domains(&result.spec_domain_sel.include, "domains include")
        .and_then(|()| validate_domains(&result.spec_domain_sel.exclude, "domains exclude"))
    {
        result.error = Some(err);
        return result;
    }

    // zone id -> zones forwarded under it
    let mut forwarded_zones: BTreeMap<&str, Vec<&HostedZone>> = BTreeMap::new();
    for z1 in all_zones {
        for z2 in all_zones {
            if z1 == z2 {
                continue;
            }
            if matches_domain(&z1.domain, &z2.domain) && z1.domain != z2.domain {
                forwarded_zones.entry(z2.zone_id.id.as_str()).or_default().push(z1);
            }
        }
    }
    let forwarded_of = |id: &str| forwarded_zones.get(id).map(Vec::as_slice).unwrap_or_default();

    let zones: Vec<&HostedZone> = all_zones
        .iter()
        .filter(|z| z.zone_id.provider_type == spec.provider_type)
        .collect();

    if result.spec_zone_sel.include.is_empty() {
        for z in &zones {
            result.zone_sel.include.insert(z.zone_id.id.clone());
        }
    } else {
        for z in &zones {
            if result.spec_zone_sel.include.contains(&z.zone_id.id) {
                result.zone_sel.include.insert(z.zone_id.id.clone());
            } else {
                result.zone_sel.exclude.insert(z.zone_id.id.clone());
            }
        }
    }
    let excluded_ids: Vec<String> = result
        .zone_sel
        .include
        .intersection(&result.spec_zone_sel.exclude)
        .cloned()
        .collect();
    for id in excluded_ids {
        result.zone_sel.include.remove(&id);
        result.zone_sel.exclude.insert(id);
    }

    result.zones = selected_zones(&zones, &result.zone_sel.include);
    if !zones.is_empty() && result.zones.is_empty() {
        result.error = Some(SelectionError::NoZoneMatchesFilter);
        return result;
    }

    let (include, warning) =
        filter_by_zones(normalize_domains(&result.spec_domain_sel.include), &result.zones);
    result.domain_sel.include = include;
    result.warnings.extend(warning);
    let (exclude, warning) =
        filter_by_zones(normalize_domains(&result.spec_domain_sel.exclude), &result.zones);
    result.domain_sel.exclude = exclude;
    result.warnings.extend(warning);

    if result.spec_domain_sel.include.is_empty() {
        if result.zones.is_empty() {
            result.error = Some(SelectionError::NoHostedZones);
            return result;
        }
        for z in &result.zones {
            result.domain_sel.include.insert(z.domain.clone());
        }
    } else if result.domain_sel.include.is_empty() {
        let included = std::mem::take(&mut result.zone_sel.include);
        result.zone_sel.exclude.extend(included);
        let zone_domains = result.zones.drain(..).map(|z| z.domain).collect();
        result.error = Some(SelectionError::NoMatchingDomain { zone_domains });
        for z in all_zones {
            result.domain_sel.exclude.insert(z.domain.clone());
        }
        return result;
    }

    // A zone stays if some included domain is served by it rather than by
    // one of its forwarded zones.
    let mut exclude_candidates: BTreeSet<String> = BTreeSet::new();
    for zone in &result.zones {
        let served = result.domain_sel.include.iter().any(|domain| {
            matches_domain(domain, &zone.domain)
                && !forwarded_of(&zone.zone_id.id)
                    .iter()
                    .any(|fz| matches_domain(domain, &fz.domain))
        });
        if !served {
            exclude_candidates.insert(zone.zone_id.id.clone());
        }
    }

    for id in &result.zone_sel.include {
        for fz in forwarded_of(id) {
            let included = result
                .domain_sel
                .include
                .iter()
                .any(|domain| matches_domain(&fz.domain, domain));
            if included {
                exclude_candidates.remove(&fz.zone_id.id);
            }
        }
    }

    for zone in &result.zones {
        if result
            .domain_sel
            .exclude
            .iter()
            .any(|domain| matches_domain(&zone.domain, domain))
        {
            exclude_candidates.insert(zone.zone_id.id.clone());
        }
    }

    for id in exclude_candidates {
        result.zone_sel.include.remove(&id);
        result.zone_sel.exclude.insert(id);
    }

    for z in all_zones {
        if result.zone_sel.include.contains(&z.zone_id.id)
            || result.domain_sel.include.contains(&z.domain)
        {
            continue;
        }
        let covers_included_subdomain = result
            .domain_sel
            .include
            .iter()
            .any(|domain| matches_domain(domain, &z.domain) && *domain != z.domain);
        if !covers_included_subdomain {
            result.domain_sel.exclude.insert(z.domain.clone());
        }
    }

    if result.zone_sel.include.len() != result.zones.len() {
        result.zones = selected_zones(&zones, &result.zone_sel.include);
    }

    result
}

fn selected_zones(zones: &[&HostedZone], include: &BTreeSet<String>) -> Vec<HostedZone> {
    zones
        .iter()
        .filter(|z| include.contains(&z.zone_id.id))
        .map(|z| (*z).clone())
        .collect()
}

fn validate_domains(domains: &BTreeSet<String>, filter: &'static str) -> Result<(), SelectionError> {
    match domains.iter().find(|d| d.starts_with("*.")) {
        Some(domain) => Err(SelectionError::WildcardDomain {
            filter,
            domain: domain.clone(),
        }),
        None => Ok(()),
    }
}

fn normalize_domains(domains: &BTreeSet<String>) -> BTreeSet<String> {
    domains.iter().map(|d| normalize_domain_name(d)).collect()
}

/// Keep the domains that lie in one of the zones. Returns the warning for
/// the last domain outside all zones.
fn filter_by_zones(
    domains: BTreeSet<String>,
    zones: &[HostedZone],
) -> (BTreeSet<String>, Option<String>) {
    let mut warning = None;
    let mut result = BTreeSet::new();
    for domain in domains {
        if zones.iter().any(|z| matches_domain(&domain, &z.domain)) {
            result.insert(domain);
        } else {
            warning = Some(format!("domain {domain:?} not in hosted domains"));
        }
    }
    (result, warning)
}

#[cfg(test)]
#[path = "selection_tests.rs"]
mod selection_tests;
