// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status updates for `DNSEntry` and `DNSProvider`.
//!
//! Reconcilers collect all status changes in a [`StatusUpdater`] and write
//! them with a single patch at the end. `lastUpdateTime` is only bumped when
//! the status actually changed, so an idempotent reconciliation leaves the
//! resource untouched.
//!
//! # Example
//!
//! ```rust,no_run
//! use dnsman::constants::STATE_READY;
//! use dnsman::crd::DNSEntry;
//! use dnsman::reconcilers::status::{patch_status, EntryStatusUpdater};
//! use kube::Client;
//!
//! async fn mark_ready(client: Client, entry: DNSEntry) -> anyhow::Result<()> {
//!     let mut updater = EntryStatusUpdater::for_entry(&entry);
//!     updater.set_state(STATE_READY, "dns entry active", entry.metadata.generation);
//!
//!     if let Some(status) = updater.finish() {
//!         patch_status(&client, &entry, &status).await?;
//!     }
//!     Ok(())
//! }
//! ```

use super::retry::{is_not_found, retry_api_call};
use crate::crd::{DNSEntry, DNSEntryStatus, DNSProvider, DNSProviderStatus, ObjectKey};
use anyhow::Result;
use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Status types with the common state fields.
pub trait ResourceStatus: Clone + Default + PartialEq + Serialize {
    fn set_state(&mut self, state: &str, message: Option<String>, generation: Option<i64>);
    fn set_last_update_time(&mut self, time: String);
}

impl ResourceStatus for DNSEntryStatus {
    fn set_state(&mut self, state: &str, message: Option<String>, generation: Option<i64>) {
        self.state = state.to_string();
        self.message = message;
        self.observed_generation = generation;
    }

    fn set_last_update_time(&mut self, time: String) {
        self.last_update_time = Some(time);
    }
}

impl ResourceStatus for DNSProviderStatus {
    fn set_state(&mut self, state: &str, message: Option<String>, generation: Option<i64>) {
        self.state = state.to_string();
        self.message = message;
        self.observed_generation = generation;
    }

    fn set_last_update_time(&mut self, time: String) {
        self.last_update_time = Some(time);
    }
}

/// Collects status changes in memory.
pub struct StatusUpdater<S> {
    key: ObjectKey,
    current: S,
    new_status: S,
}

pub type EntryStatusUpdater = StatusUpdater<DNSEntryStatus>;
pub type ProviderStatusUpdater = StatusUpdater<DNSProviderStatus>;

impl<S: ResourceStatus> StatusUpdater<S> {
    #[must_use]
    pub fn new(key: ObjectKey, current: Option<&S>) -> Self {
        let current = current.cloned().unwrap_or_default();
        Self {
            key,
            new_status: current.clone(),
            current,
        }
    }

    #[must_use]
    pub fn status(&self) -> &S {
        &self.new_status
    }

    pub fn status_mut(&mut self) -> &mut S {
        &mut self.new_status
    }

    pub fn set_state(&mut self, state: &str, message: impl Into<String>, generation: Option<i64>) {
        self.new_status
            .set_state(state, Some(message.into()), generation);
    }

    /// Returns true if the new status differs from the current one.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.current != self.new_status
    }

    /// The status to write, with `lastUpdateTime` set, or `None` if unchanged.
    #[must_use]
    pub fn finish(mut self) -> Option<S> {
        if !self.has_changes() {
            debug!("Status of {} unchanged, skipping update", self.key);
            return None;
        }
        self.new_status.set_last_update_time(Utc::now().to_rfc3339());
        Some(self.new_status)
    }
}

impl EntryStatusUpdater {
    #[must_use]
    pub fn for_entry(entry: &DNSEntry) -> Self {
        Self::new(ObjectKey::from_resource(entry), entry.status.as_ref())
    }
}

impl ProviderStatusUpdater {
    #[must_use]
    pub fn for_provider(provider: &DNSProvider) -> Self {
        Self::new(ObjectKey::from_resource(provider), provider.status.as_ref())
    }
}

/// JSON merge patch turning `previous` into `new`.
///
/// Keys missing from `new` become `null`, so cleared fields, including keys
/// of nested maps, are removed on the server. Arrays are replaced whole.
#[must_use]
pub fn merge_patch(previous: &Value, new: &Value) -> Value {
    let (Value::Object(previous), Value::Object(new)) = (previous, new) else {
        return new.clone();
    };
    let mut patch: Map<String, Value> = new
        .iter()
        .map(|(key, value)| {
            let value = match previous.get(key) {
                Some(old) => merge_patch(old, value),
                None => value.clone(),
            };
            (key.clone(), value)
        })
        .collect();
    for key in previous.keys() {
        if !new.contains_key(key) {
            patch.insert(key.clone(), Value::Null);
        }
    }
    Value::Object(patch)
}

/// Body of the status patch replacing the status currently on `resource`.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn status_patch_body<K: Serialize, S: Serialize>(resource: &K, status: &S) -> Result<Value> {
    let previous = serde_json::to_value(resource)?
        .get("status")
        .cloned()
        .unwrap_or(Value::Null);
    let status = serde_json::to_value(status)?;
    Ok(json!({ "status": merge_patch(&previous, &status) }))
}

/// Write the status subresource of a namespaced resource.
///
/// # Errors
///
/// Returns an error if the API call fails. A resource that is already gone
/// is not an error.
pub async fn patch_status<K, S>(client: &Client, resource: &K, status: &S) -> Result<()>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + Serialize
        + serde::de::DeserializeOwned,
    S: Serialize,
{
    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();
    let api: Api<K> = Api::namespaced(client.clone(), &namespace);

    let params = PatchParams::default();
    let patch = Patch::Merge(status_patch_body(resource, status)?);
    if let Err(err) = retry_api_call(
        || api.patch_status(&name, &params, &patch),
        &format!("patch status of {} {namespace}/{name}", K::kind(&())),
    )
    .await
    {
        if !is_not_found(&err) {
            return Err(err);
        }
        debug!("{} {}/{} is gone, status not written", K::kind(&()), namespace, name);
        return Ok(());
    }

    debug!("Updated {} {}/{} status", K::kind(&()), namespace, name);
    Ok(())
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
