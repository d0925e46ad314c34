// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Finalizer management for namespaced custom resources.
//!
//! Adding and removing are idempotent: the API is only called when the
//! finalizer list actually changes.
//!
//! # Example
//!
//! ```rust,no_run
//! use dnsman::constants::FINALIZER_DNSMAN;
//! use dnsman::crd::DNSEntry;
//! use dnsman::reconcilers::finalizers::{ensure_finalizer, remove_finalizer};
//! use kube::Client;
//!
//! async fn bind(client: Client, entry: DNSEntry) -> anyhow::Result<()> {
//!     ensure_finalizer(&client, &entry, FINALIZER_DNSMAN).await?;
//!     // ... write records ...
//!     remove_finalizer(&client, &entry, FINALIZER_DNSMAN).await?;
//!     Ok(())
//! }
//! ```

use super::retry::{is_not_found, retry_api_call};
use anyhow::Result;
use kube::api::{Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde_json::json;
use tracing::{debug, info};

/// Returns true if the resource carries the finalizer.
#[must_use]
pub fn has_finalizer<T: Resource>(resource: &T, finalizer: &str) -> bool {
    resource
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|name| name == finalizer))
}

/// Finalizer list with `finalizer` appended, `None` if already present.
#[must_use]
pub fn finalizers_with<T: Resource>(resource: &T, finalizer: &str) -> Option<Vec<String>> {
    if has_finalizer(resource, finalizer) {
        return None;
    }
    let mut finalizers = resource.meta().finalizers.clone().unwrap_or_default();
    finalizers.push(finalizer.to_string());
    Some(finalizers)
}

/// Finalizer list without `finalizer`, `None` if it was not present.
#[must_use]
pub fn finalizers_without<T: Resource>(resource: &T, finalizer: &str) -> Option<Vec<String>> {
    if !has_finalizer(resource, finalizer) {
        return None;
    }
    let mut finalizers = resource.meta().finalizers.clone().unwrap_or_default();
    finalizers.retain(|f| f != finalizer);
    Some(finalizers)
}

/// Add a finalizer to a resource if not already present.
///
/// Returns true if the resource was patched.
///
/// # Errors
///
/// Returns an error if the API patch fails.
pub async fn ensure_finalizer<T>(client: &Client, resource: &T, finalizer: &str) -> Result<bool>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned,
{
    let Some(finalizers) = finalizers_with(resource, finalizer) else {
        return Ok(false);
    };

    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();
    info!(
        "Adding finalizer {} to {} {}/{}",
        finalizer,
        T::kind(&()),
        namespace,
        name
    );
    patch_finalizers::<T>(client, &namespace, &name, finalizers).await?;
    Ok(true)
}

/// Remove a finalizer from a resource if present.
///
/// Returns true if the resource was patched. A resource that vanished in
/// the meantime counts as released.
///
/// # Errors
///
/// Returns an error if the API patch fails.
pub async fn remove_finalizer<T>(client: &Client, resource: &T, finalizer: &str) -> Result<bool>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned,
{
    let Some(finalizers) = finalizers_without(resource, finalizer) else {
        return Ok(false);
    };

    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();
    info!(
        "Removing finalizer {} from {} {}/{}",
        finalizer,
        T::kind(&()),
        namespace,
        name
    );
    match patch_finalizers::<T>(client, &namespace, &name, finalizers).await {
        Err(err) if is_not_found(&err) => {
            debug!("{} {}/{} already deleted", T::kind(&()), namespace, name);
            Ok(false)
        }
        other => other.map(|()| true),
    }
}

async fn patch_finalizers<T>(
    client: &Client,
    namespace: &str,
    name: &str,
    finalizers: Vec<String>,
) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned,
{
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    let params = PatchParams::default();
    let patch = Patch::Merge(json!({ "metadata": { "finalizers": finalizers } }));
    retry_api_call(
        || api.patch(name, &params, &patch),
        &format!("patch finalizers of {namespace}/{name}"),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
