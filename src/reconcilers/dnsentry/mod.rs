// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `DNSEntry` reconciliation.
//!
//! One pass of [`EntryReconciler::reconcile`]:
//!
//! 1. Skip entries with an ignore annotation.
//! 2. Lock the DNS names of the entry.
//! 3. Validate the spec.
//! 4. Select provider and zone ([`providerselector`]).
//! 5. Rebuild the record keys written by the previous pass from the status.
//! 6. Build the desired targets ([`targets`]); none while deleting.
//! 7. Query the old and new zones, compute and apply the change requests
//!    ([`records`]). Zones the entry moved away from only get deletions.
//! 8. Write the status and drop the finalizer once no targets are left.
//!
//! The status is only written here. Helpers return errors and the reconciler
//! decides between `Invalid`, `Stale` and `Error`.

pub mod client;
pub mod providerselector;
pub mod records;
pub mod targets;

use self::client::EntryClient;
use self::providerselector::{calc_new_provider, NewProviderData, ProviderSelection};
use self::records::{
    calculate_zoned_change_requests, insert_record_keys, insert_record_sets,
    insert_record_type_keys, query_records, to_dns_set_name, RecordKeySet, ZonedChangeRequests,
};
use self::targets::{spec_record_types, status_to_targets, targets_to_strings, TargetsProducer};
use crate::constants::{
    ANNOTATION_HARD_IGNORE, ANNOTATION_IGNORE, ANNOTATION_IGNORE_VALUE_FULL,
    ANNOTATION_IGNORE_VALUE_RECONCILE, ANNOTATION_IGNORE_VALUE_TRUE, ANNOTATION_IP_STACK,
    DNS_NAME_LOCK_JITTER_MILLIS, DNS_NAME_LOCK_REQUEUE_SECS, FINALIZER_DNSMAN,
    PROVIDER_NOT_READY_REQUEUE_SECS, STATE_ERROR, STATE_IGNORED, STATE_INVALID, STATE_READY,
    STATE_STALE,
};
use crate::crd::{self, DNSEntry, DNSEntrySpec, ObjectKey};
use crate::dns::{
    normalize_domain_name, validate_domain_name, DnsSet, DnsSetName, IpStack, RoutingPolicy,
    Target, ZoneId,
};
use crate::lookup::processor::LookupProcessor;
use crate::metrics;
use crate::provider::registry::{ProviderRegistry, ProviderState};
use crate::provider::{ChangeRequests, DnsAccount};
use crate::reconcilers::finalizers::has_finalizer;
use crate::reconcilers::status::EntryStatusUpdater;
use anyhow::{anyhow, Result};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Message of a successfully reconciled entry
const MESSAGE_ACTIVE: &str = "dns entry active";

/// Message of an entry without matching provider
const MESSAGE_NO_PROVIDER: &str = "no matching DNS provider found";

/// Reconciles `DNSEntry` resources.
pub struct EntryReconciler {
    client: Arc<dyn EntryClient>,
    registry: Arc<ProviderRegistry>,
    lookup_processor: Arc<LookupProcessor>,
    default_cname_lookup_interval: i64,
    cancel: CancellationToken,
}

/// Records applied by one pass.
struct Synced {
    name: DnsSetName,
    policy: Option<RoutingPolicy>,
    targets: Vec<Target>,
    warnings: Vec<String>,
}

enum SyncError {
    /// The spec is invalid; the message goes into the status
    Invalid(String),
    Failed(anyhow::Error),
}

impl From<anyhow::Error> for SyncError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(err)
    }
}

impl EntryReconciler {
    #[must_use]
    pub fn new(
        client: Arc<dyn EntryClient>,
        registry: Arc<ProviderRegistry>,
        lookup_processor: Arc<LookupProcessor>,
        default_cname_lookup_interval: i64,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            registry,
            lookup_processor,
            default_cname_lookup_interval,
            cancel,
        }
    }

    /// Reconcile one entry.
    ///
    /// # Errors
    ///
    /// Returns an error for failures that should be retried with backoff. The
    /// entry status has been set to `Error` before, if possible.
    pub async fn reconcile(&self, entry: &DNSEntry) -> Result<Action> {
        let mut entry = entry.clone();
        let key = ObjectKey::from_resource(&entry);

        if let Some((annotation, full)) = ignored_by_annotation(&entry) {
            debug!(entry = %key, annotation = %annotation, "Ignoring entry due to annotation");
            if full || is_deleting(&entry) {
                self.remove_finalizer(&mut entry).await?;
            }
            if !is_deleting(&entry) {
                self.update_status_failed(
                    &mut entry,
                    STATE_IGNORED,
                    format!("entry is ignored due to annotation: {annotation}"),
                )
                .await?;
            }
            return Ok(Action::await_change());
        }

        let names = dns_names_to_lock(&entry);
        let Some(_lock) = self.registry.try_lock_dns_names(&names) else {
            debug!(entry = %key, names = ?names, "DNS name locked by another entry, requeueing");
            return Ok(Action::requeue(lock_requeue_delay()));
        };

        // a deleted entry is cleaned up from its status, whatever its spec says
        if !is_deleting(&entry) {
            if let Err(reason) = validate_entry(&entry.spec) {
                info!(entry = %key, "Entry validation failed: {reason}");
                self.update_status_failed(
                    &mut entry,
                    STATE_INVALID,
                    format!("validation failed: {reason}"),
                )
                .await?;
                return Ok(Action::await_change());
            }
        }

        let providers = self.client.list_providers(&key.namespace).await?;
        let current_provider = entry.status.as_ref().and_then(|s| s.provider.clone());
        let selection = match calc_new_provider(
            &providers,
            &entry.spec.dns_name,
            current_provider.as_deref(),
            &self.registry,
        )
        .await
        {
            Ok(selection) => selection,
            Err(e) => return self.fail_with_status_error(&mut entry, e).await,
        };

        let data = match selection {
            ProviderSelection::Found(data) => data,
            ProviderSelection::NoProvider if is_deleting(&entry) => {
                self.delete_without_provider(&mut entry, &key).await?;
                return Ok(Action::await_change());
            }
            ProviderSelection::NoProvider => {
                info!(entry = %key, "No matching DNS provider found");
                self.update_status_without_provider(&mut entry).await?;
                return Ok(Action::await_change());
            }
            ProviderSelection::Requeue(delay) => {
                debug!(entry = %key, "Provider state not yet available, requeueing");
                return Ok(Action::requeue(delay));
            }
            ProviderSelection::NotReady {
                provider_key,
                message,
            } => {
                info!(entry = %key, provider = %provider_key, "Provider not ready: {message}");
                self.update_status_failed(&mut entry, STATE_STALE, message)
                    .await?;
                return Ok(Action::requeue(Duration::from_secs(
                    PROVIDER_NOT_READY_REQUEUE_SECS,
                )));
            }
        };

        if !is_deleting(&entry) {
            self.add_finalizer(&mut entry).await?;
        }

        match self.sync_records(&entry, &key, &data).await {
            Ok(synced) => {
                self.update_status_with_provider(&mut entry, &data, synced)
                    .await?;
                Ok(Action::await_change())
            }
            Err(SyncError::Invalid(reason)) => {
                info!(entry = %key, "Entry targets invalid: {reason}");
                self.update_status_failed(&mut entry, STATE_INVALID, reason)
                    .await?;
                Ok(Action::await_change())
            }
            Err(SyncError::Failed(e)) => self.fail_with_status_error(&mut entry, e).await,
        }
    }

    /// Compute the desired records and apply the difference.
    async fn sync_records(
        &self,
        entry: &DNSEntry,
        key: &ObjectKey,
        data: &NewProviderData,
    ) -> Result<Synced, SyncError> {
        let ip_stack = entry_ip_stack(entry);
        let mut keys = status_record_keys(entry, ip_stack)?;

        if is_deleting(entry) {
            self.lookup_processor.delete(key);
            let name = to_dns_set_name(&entry.spec.dns_name, entry.spec.routing_policy.as_ref())
                .map_or_else(|_| DnsSetName::new(entry.spec.dns_name.clone()), |(name, _)| name);
            // Records applied by a pass whose status write was lost are only
            // known through the spec.
            insert_record_type_keys(
                &mut keys,
                &data.zone_id,
                &name,
                spec_record_types(&entry.spec),
            );
            let actual = query_records(&self.registry, &keys).await?;
            let zoned = calculate_zoned_change_requests(&DnsSet::new(&name), &data.zone_id, &actual);
            self.apply_change_requests(key, data, &zoned).await?;
            return Ok(Synced {
                name,
                policy: None,
                targets: Vec::new(),
                warnings: Vec::new(),
            });
        }

        let producer = TargetsProducer::new(
            data.default_ttl,
            self.default_cname_lookup_interval,
            Arc::clone(&self.lookup_processor),
            self.cancel.child_token(),
        );
        let produced = match producer.from_spec(key, &entry.spec, ip_stack).await {
            Ok(produced) => produced,
            Err(e) if e.is_validation_error() => return Err(SyncError::Invalid(e.to_string())),
            Err(e) => return Err(SyncError::Failed(e.into())),
        };
        let (name, policy) =
            to_dns_set_name(&entry.spec.dns_name, entry.spec.routing_policy.as_ref())
                .map_err(|e| SyncError::Invalid(e.to_string()))?;
        insert_record_keys(&mut keys, &data.zone_id, &name, &produced.targets);

        let mut dns_set = DnsSet::new(&name);
        insert_record_sets(&mut dns_set, policy.as_ref(), &produced.targets);

        let actual = query_records(&self.registry, &keys).await?;
        let zoned = calculate_zoned_change_requests(&dns_set, &data.zone_id, &actual);
        self.apply_change_requests(key, data, &zoned).await?;

        Ok(Synced {
            name,
            policy,
            targets: produced.targets,
            warnings: produced.warnings,
        })
    }

    /// Delete the records of a deleted entry whose provider is gone.
    ///
    /// Records in zones no provider serves anymore are left behind.
    async fn delete_without_provider(&self, entry: &mut DNSEntry, key: &ObjectKey) -> Result<()> {
        self.lookup_processor.delete(key);
        let keys = status_record_keys(entry, entry_ip_stack(entry))?;

        match query_records(&self.registry, &keys).await {
            Ok(actual) => {
                let zoned =
                    calculate_zoned_change_requests(&DnsSet::default(), &ZoneId::default(), &actual);
                for (zone_id, per_name) in &zoned {
                    self.cleanup_cross_zone_records(key, None, zone_id, per_name)
                        .await?;
                }
            }
            Err(e) => warn!(entry = %key, "Leaving records of deleted entry behind: {e:#}"),
        }
        self.remove_finalizer(entry).await
    }

    async fn apply_change_requests(
        &self,
        key: &ObjectKey,
        data: &NewProviderData,
        zoned: &ZonedChangeRequests,
    ) -> Result<()> {
        for (zone_id, per_name) in zoned {
            if *zone_id != data.zone_id {
                self.cleanup_cross_zone_records(key, Some(&data.provider_state), zone_id, per_name)
                    .await?;
            }
        }

        let Some(per_name) = zoned.get(&data.zone_id) else {
            debug!(entry = %key, zone = %data.zone_id, "Records up to date");
            return Ok(());
        };
        let state = &data.provider_state;
        let zone = state
            .all_zones
            .iter()
            .find(|z| z.zone_id == data.zone_id)
            .ok_or_else(|| {
                anyhow!(
                    "zone {} not found in provider {}",
                    data.zone_id.id,
                    data.provider_key
                )
            })?;
        for requests in per_name.values() {
            info!(
                entry = %key,
                provider = %data.provider_key,
                zone = %data.zone_id,
                "Applying change requests {requests}"
            );
            state
                .account
                .execute_requests(zone, requests)
                .await
                .map_err(|e| anyhow!("failed to execute DNS change requests: {e}"))?;
            record_change_requests(state.account.as_ref(), requests);
        }
        Ok(())
    }

    /// Delete records left in a zone the entry no longer belongs to.
    ///
    /// The zone may belong to another provider than `own`.
    async fn cleanup_cross_zone_records(
        &self,
        key: &ObjectKey,
        own: Option<&ProviderState>,
        zone_id: &ZoneId,
        per_name: &BTreeMap<DnsSetName, ChangeRequests>,
    ) -> Result<()> {
        let own_zone = own.and_then(|state| {
            state
                .all_zones
                .iter()
                .find(|z| z.zone_id == *zone_id)
                .map(|zone| (Arc::clone(&state.account), zone.clone()))
        });
        let (account, zone) = match own_zone {
            Some(found) => found,
            None => self
                .registry
                .find_account_for_zone(zone_id)
                .await
                .map_err(|e| anyhow!("failed to find account for zone {}: {e}", zone_id.id))?,
        };

        for (name, requests) in per_name {
            let deletions = requests.deletions_only();
            if deletions.is_empty() {
                continue;
            }
            info!(entry = %key, zone = %zone_id, "Deleting cross-zone records of {name}");
            account
                .execute_requests(&zone, &deletions)
                .await
                .map_err(|e| {
                    anyhow!(
                        "failed to delete cross-zone records for {name}[{}]: {e}",
                        zone_id.id
                    )
                })?;
            record_change_requests(account.as_ref(), &deletions);
        }
        Ok(())
    }

    async fn update_status_with_provider(
        &self,
        entry: &mut DNSEntry,
        data: &NewProviderData,
        synced: Synced,
    ) -> Result<()> {
        let generation = entry.metadata.generation;
        let mut updater = EntryStatusUpdater::for_entry(entry);

        let status = updater.status_mut();
        status.provider = Some(data.provider_key.to_string());
        status.provider_type = Some(data.provider.spec.provider_type.clone());
        status.zone = Some(data.zone_id.id.clone());
        status.dns_name = Some(synced.name.dns_name.clone());
        status.routing_policy = match &synced.policy {
            Some(policy) if !synced.name.set_identifier.is_empty() => Some(crd::RoutingPolicy {
                policy_type: policy.policy_type.as_str().to_string(),
                set_identifier: synced.name.set_identifier.clone(),
                parameters: policy.parameters.clone(),
            }),
            _ => None,
        };
        status.targets = targets_to_strings(&synced.targets);
        status.ttl = synced.targets.first().map(|t| t.ttl);

        let message = if synced.warnings.is_empty() {
            MESSAGE_ACTIVE.to_string()
        } else {
            format!("reconciled with warnings: {}", synced.warnings.join(", "))
        };
        updater.set_state(STATE_READY, message, generation);
        self.update_status(entry, updater).await
    }

    async fn update_status_without_provider(&self, entry: &mut DNSEntry) -> Result<()> {
        let generation = entry.metadata.generation;
        let mut updater = EntryStatusUpdater::for_entry(entry);

        let status = updater.status_mut();
        status.provider = None;
        let state = if !status.targets.is_empty() && status.zone.is_some() {
            STATE_STALE
        } else {
            status.provider_type = None;
            STATE_ERROR
        };
        updater.set_state(state, MESSAGE_NO_PROVIDER, generation);
        self.update_status(entry, updater).await
    }

    /// Write the status and drop the finalizer if no targets are left.
    async fn update_status(&self, entry: &mut DNSEntry, updater: EntryStatusUpdater) -> Result<()> {
        self.write_status(entry, updater).await?;
        let no_targets = entry.status.as_ref().is_none_or(|s| s.targets.is_empty());
        if no_targets {
            self.remove_finalizer(entry).await?;
        }
        Ok(())
    }

    async fn update_status_failed(
        &self,
        entry: &mut DNSEntry,
        state: &str,
        message: String,
    ) -> Result<()> {
        let mut updater = EntryStatusUpdater::for_entry(entry);
        updater.set_state(state, message, entry.metadata.generation);
        self.write_status(entry, updater).await
    }

    async fn write_status(&self, entry: &mut DNSEntry, updater: EntryStatusUpdater) -> Result<()> {
        if let Some(status) = updater.finish() {
            self.client.update_status(entry, &status).await?;
            entry.status = Some(status);
        }
        Ok(())
    }

    async fn fail_with_status_error(
        &self,
        entry: &mut DNSEntry,
        err: anyhow::Error,
    ) -> Result<Action> {
        error!(entry = %entry.name_any(), "Failed to reconcile entry: {err:#}");
        if let Err(status_err) = self
            .update_status_failed(entry, STATE_ERROR, format!("{err:#}"))
            .await
        {
            warn!(entry = %entry.name_any(), "Failed to update entry status: {status_err:#}");
        }
        Err(err)
    }

    async fn add_finalizer(&self, entry: &mut DNSEntry) -> Result<()> {
        if has_finalizer(entry, FINALIZER_DNSMAN) {
            return Ok(());
        }
        self.client.add_finalizer(entry).await?;
        entry
            .finalizers_mut()
            .push(FINALIZER_DNSMAN.to_string());
        Ok(())
    }

    async fn remove_finalizer(&self, entry: &mut DNSEntry) -> Result<()> {
        if !has_finalizer(entry, FINALIZER_DNSMAN) {
            return Ok(());
        }
        self.client.remove_finalizer(entry).await?;
        entry.finalizers_mut().retain(|f| f != FINALIZER_DNSMAN);
        Ok(())
    }
}

fn is_deleting(entry: &DNSEntry) -> bool {
    entry.metadata.deletion_timestamp.is_some()
}

/// Ignore annotation of an entry and whether it also covers deletion.
#[must_use]
pub fn ignored_by_annotation(entry: &DNSEntry) -> Option<(String, bool)> {
    let annotations = entry.annotations();
    if annotations.get(ANNOTATION_HARD_IGNORE).map(String::as_str) == Some("true") {
        return Some((format!("{ANNOTATION_HARD_IGNORE}=true"), true));
    }
    match annotations.get(ANNOTATION_IGNORE).map(String::as_str) {
        Some(ANNOTATION_IGNORE_VALUE_FULL) => Some((
            format!("{ANNOTATION_IGNORE}={ANNOTATION_IGNORE_VALUE_FULL}"),
            true,
        )),
        Some(value @ (ANNOTATION_IGNORE_VALUE_RECONCILE | ANNOTATION_IGNORE_VALUE_TRUE))
            if !is_deleting(entry) =>
        {
            Some((format!("{ANNOTATION_IGNORE}={value}"), false))
        }
        _ => None,
    }
}

/// Normalized DNS names of the spec and of the last applied status.
#[must_use]
pub fn dns_names_to_lock(entry: &DNSEntry) -> Vec<String> {
    let mut names = vec![normalize_domain_name(&entry.spec.dns_name)];
    if let Some(status_name) = entry.status.as_ref().and_then(|s| s.dns_name.as_deref()) {
        let status_name = normalize_domain_name(status_name);
        if !names.contains(&status_name) {
            names.push(status_name);
        }
    }
    names
}

fn entry_ip_stack(entry: &DNSEntry) -> IpStack {
    IpStack::from_annotation(entry.annotations().get(ANNOTATION_IP_STACK).map(String::as_str))
}

/// Keys of the record sets written by the last successful pass.
fn status_record_keys(entry: &DNSEntry, ip_stack: IpStack) -> Result<RecordKeySet> {
    let mut keys = RecordKeySet::new();
    let Some(status) = entry.status.as_ref() else {
        return Ok(keys);
    };
    let (Some(provider_type), Some(zone), Some(dns_name)) =
        (&status.provider_type, &status.zone, &status.dns_name)
    else {
        return Ok(keys);
    };

    let targets = status_to_targets(status, ip_stack)?;
    let (name, _) = to_dns_set_name(dns_name, status.routing_policy.as_ref())?;
    insert_record_keys(
        &mut keys,
        &ZoneId::new(provider_type.clone(), zone.clone()),
        &name,
        &targets,
    );
    Ok(keys)
}

fn lock_requeue_delay() -> Duration {
    Duration::from_secs(DNS_NAME_LOCK_REQUEUE_SECS)
        + Duration::from_millis(rand::random::<u64>() % DNS_NAME_LOCK_JITTER_MILLIS)
}

/// Checks done before provider selection.
///
/// # Errors
///
/// Returns the reason for the `validation failed` status message.
pub fn validate_entry(spec: &DNSEntrySpec) -> Result<(), String> {
    validate_domain_name(&spec.dns_name).map_err(|e| format!("invalid DNSName: {e}"))?;
    if !spec.targets.is_empty() && !spec.text.is_empty() {
        return Err("cannot specify both targets and text fields".to_string());
    }
    if let Some(i) = spec.targets.iter().position(|t| t.trim().is_empty()) {
        return Err(format!("target {} is empty", i + 1));
    }
    if let Some(i) = spec.text.iter().position(|t| t.trim().is_empty()) {
        return Err(format!("text {} is empty", i + 1));
    }
    Ok(())
}

fn record_change_requests(account: &dyn DnsAccount, requests: &ChangeRequests) {
    for update in requests.updates.values() {
        let action = match (&update.old, &update.new) {
            (None, Some(_)) => "create",
            (Some(_), None) => "delete",
            _ => "update",
        };
        metrics::record_change_request(account.provider_type(), action);
    }
}


#[cfg(test)]
#[path = "providerselector_tests.rs"]
mod providerselector_tests;


#[cfg(test)]
#[path = "targets_tests.rs"]
mod targets_tests;
