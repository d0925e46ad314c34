// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Record queries and change request calculation.
//!
//! The keys of all record sets an entry may own (in its old and its new zone)
//! are queried, compared with the desired [`DnsSet`] and turned into change
//! requests grouped by zone and DNS set name. Zones other than the new one
//! only ever receive deletions.

use crate::crd;
use crate::dns::{
    DnsSet, DnsSetName, FullRecordSetKey, RecordSet, RecordType, RoutingPolicy, RoutingPolicyType,
    Target, ZoneId,
};
use crate::provider::registry::ProviderRegistry;
use crate::provider::{ChangeRequestUpdate, ChangeRequests};
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Keys of the record sets to query.
pub type RecordKeySet = BTreeSet<FullRecordSetKey>;

/// Record sets found in the zones.
pub type ActualRecords = BTreeMap<FullRecordSetKey, RecordSet>;

/// Change requests per zone and DNS set name.
pub type ZonedChangeRequests = BTreeMap<ZoneId, BTreeMap<DnsSetName, ChangeRequests>>;

/// DNS set name and converted routing policy of an entry.
///
/// # Errors
///
/// Returns an error for an unknown routing policy type.
pub fn to_dns_set_name(
    dns_name: &str,
    routing_policy: Option<&crd::RoutingPolicy>,
) -> Result<(DnsSetName, Option<RoutingPolicy>)> {
    let Some(policy) = routing_policy else {
        return Ok((DnsSetName::new(dns_name), None));
    };

    let policy_type = RoutingPolicyType::parse(&policy.policy_type).ok_or_else(|| {
        anyhow!(
            "failed to convert routing policy: unknown routing policy type {:?}",
            policy.policy_type
        )
    })?;
    let name = DnsSetName::new(dns_name).with_set_identifier(policy.set_identifier.clone());
    Ok((
        name,
        Some(RoutingPolicy {
            policy_type,
            parameters: policy.parameters.clone(),
        }),
    ))
}

/// Add one key per record type of `targets`.
pub fn insert_record_keys(
    keys: &mut RecordKeySet,
    zone_id: &ZoneId,
    name: &DnsSetName,
    targets: &[Target],
) {
    for target in targets {
        keys.insert(FullRecordSetKey::new(zone_id.clone(), name, target.record_type));
    }
}

/// Insert one key per record type for `name` in `zone_id`.
pub fn insert_record_type_keys(
    keys: &mut RecordKeySet,
    zone_id: &ZoneId,
    name: &DnsSetName,
    record_types: impl IntoIterator<Item = RecordType>,
) {
    for record_type in record_types {
        keys.insert(FullRecordSetKey::new(zone_id.clone(), name, record_type));
    }
}

/// Group targets by record type into record sets of `dns_set`.
///
/// The TTL of a record set is the TTL of its first target.
pub fn insert_record_sets(dns_set: &mut DnsSet, policy: Option<&RoutingPolicy>, targets: &[Target]) {
    let mut record_sets: BTreeMap<_, RecordSet> = BTreeMap::new();
    for target in targets {
        record_sets
            .entry(target.record_type)
            .or_insert_with(|| {
                RecordSet::new(target.record_type, target.ttl, Vec::new())
                    .with_routing_policy(policy.cloned())
            })
            .records
            .push(target.value.clone());
    }
    for record_set in record_sets.into_values() {
        dns_set.set_record_set(record_set);
    }
}

/// Query the current record sets of all keys.
///
/// Keys without records are absent from the result.
///
/// # Errors
///
/// Returns an error if no query handler exists for a zone or a query fails.
pub async fn query_records(registry: &ProviderRegistry, keys: &RecordKeySet) -> Result<ActualRecords> {
    let mut results = ActualRecords::new();

    let zones: BTreeSet<&ZoneId> = keys.iter().map(|key| &key.zone_id).collect();
    for zone_id in zones {
        let handler = registry.query_handler_for_zone(zone_id).await.map_err(|e| {
            anyhow!(
                "failed to get DNS query handler for zone {}: {e}",
                zone_id.id
            )
        })?;

        for key in keys.iter().filter(|key| key.zone_id == *zone_id) {
            let (targets, policy) = handler
                .query(&key.name.dns_name, &key.name.set_identifier, key.record_type)
                .await
                .map_err(|e| {
                    anyhow!(
                        "failed to query DNS records for {}, type {} in zone {}: {e}",
                        key.name,
                        key.record_type,
                        zone_id.id
                    )
                })?;
            if targets.is_empty() {
                continue;
            }

            let mut dns_set = DnsSet::new(&key.name);
            insert_record_sets(&mut dns_set, policy.as_ref(), &targets);
            if let Some(record_set) = dns_set.sets.remove(&key.record_type) {
                results.insert(key.clone(), record_set);
            }
        }
    }
    Ok(results)
}

/// Compare the desired set with the actual records.
///
/// An actual record set is deleted if it belongs to another zone or name or
/// its type is no longer desired, and updated if its content differs. Desired
/// record sets without actual counterpart are added.
#[must_use]
pub fn calculate_zoned_change_requests(
    new_set: &DnsSet,
    new_zone: &ZoneId,
    actual: &ActualRecords,
) -> ZonedChangeRequests {
    let mut requests = ZonedChangeRequests::new();
    let mut add = |key: &FullRecordSetKey, old: Option<RecordSet>, new: Option<RecordSet>| {
        requests
            .entry(key.zone_id.clone())
            .or_default()
            .entry(key.name.clone())
            .or_insert_with(|| ChangeRequests::new(key.name.clone()))
            .updates
            .insert(key.record_type, ChangeRequestUpdate { old, new });
    };

    for (key, record_set) in actual {
        let desired = if key.zone_id == *new_zone && key.name == new_set.name {
            new_set.sets.get(&key.record_type)
        } else {
            None
        };
        match desired {
            None => add(key, Some(record_set.clone()), None),
            Some(desired) if !desired.matches(record_set) => {
                add(key, Some(record_set.clone()), Some(desired.clone()));
            }
            Some(_) => {}
        }
    }

    for (record_type, record_set) in &new_set.sets {
        let key = FullRecordSetKey::new(new_zone.clone(), &new_set.name, *record_type);
        if !actual.contains_key(&key) {
            add(&key, None, Some(record_set.clone()));
        }
    }

    requests
}
