// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for DNS management.
//!
//! This module defines the Kubernetes Custom Resource Definitions used by dnsman
//! to manage DNS records in external DNS services declaratively.
//!
//! # Resource Types
//!
//! - [`DNSEntry`] - A DNS name with its desired targets or text records
//! - [`DNSProvider`] - Access to a DNS account and the zones/domains it may manage
//!
//! # Example: Creating a DNS Entry
//!
//! ```rust,no_run
//! use dnsman::crd::DNSEntrySpec;
//!
//! let spec = DNSEntrySpec {
//!     dns_name: "www.example.com".to_string(),
//!     targets: vec!["192.0.2.1".to_string()],
//!     ttl: Some(300),
//!     ..Default::default()
//! };
//! ```

use kube::{CustomResource, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Namespace and name of a namespaced object.
///
/// Used as the in-memory identity of entries and providers. Renders as
/// `namespace/name`, which is also the form stored in `status.provider`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Build the key of a namespaced resource.
    #[must_use]
    pub fn from_resource<K: Resource>(resource: &K) -> Self {
        Self {
            namespace: resource.namespace().unwrap_or_default(),
            name: resource.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Legacy reference to another `DNSEntry`.
///
/// Kept only so that entries still using it can be detected and rejected.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntryReference {
    /// Name of the referenced entry
    pub name: String,

    /// Namespace of the referenced entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Routing policy of a record set.
///
/// Several entries may share one DNS name if each of them uses a different
/// `setIdentifier`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutingPolicy {
    /// Policy type: `weighted`, `latency`, `geolocation`, `ip-based` or `failover`
    #[serde(rename = "type")]
    pub policy_type: String,

    /// Identifies the record set among all sets of the same DNS name
    pub set_identifier: String,

    /// Type specific parameters, e.g. `weight` for weighted routing
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// `DNSEntry` describes the records of one DNS name.
///
/// Exactly one of `targets` or `text` must be set. IP addresses become A/AAAA
/// records, host names become a CNAME record. Multiple host names are resolved
/// to addresses periodically.
///
/// # Example
///
/// ```yaml
/// apiVersion: dnsman.firestoned.io/v1alpha1
/// kind: DNSEntry
/// metadata:
///   name: www
///   namespace: default
/// spec:
///   dnsName: www.example.com
///   ttl: 300
///   targets:
///     - 192.0.2.1
///     - 192.0.2.2
/// ```
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dnsman.firestoned.io",
    version = "v1alpha1",
    kind = "DNSEntry",
    namespaced,
    shortname = "dnse",
    doc = "DNSEntry describes the DNS records of a single DNS name that are maintained in the hosted zone of a matching DNSProvider.",
    printcolumn = r#"{"name":"DNS","type":"string","jsonPath":".spec.dnsName"}"#,
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".status.providerType"}"#,
    printcolumn = r#"{"name":"Provider","type":"string","jsonPath":".status.provider"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[kube(status = "DNSEntryStatus")]
#[serde(rename_all = "camelCase")]
pub struct DNSEntrySpec {
    /// Full DNS name of the records, may start with a wildcard label (`*.`)
    pub dns_name: String,

    /// Legacy reference to another entry. No longer supported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<EntryReference>,

    /// Owner id of the records (informational)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,

    /// TTL of the records in seconds. Defaults to the provider default TTL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,

    /// Interval in seconds between lookups of CNAME targets resolved to addresses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cname_lookup_interval: Option<i64>,

    /// Text records (TXT)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub text: Vec<String>,

    /// Targets: IPv4/IPv6 addresses or host names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,

    /// Optional routing policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_policy: Option<RoutingPolicy>,

    /// Resolve a single CNAME target to its addresses instead of writing a CNAME record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve_targets_to_addresses: Option<bool>,
}

/// Status of a `DNSEntry`.
///
/// Records what was last applied in the provider so that the next
/// reconciliation can compute deletions, even in a zone the entry no longer
/// belongs to. Every field is serialized, so a cleared field is written as
/// `null` (or `[]`) by a merge patch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DNSEntryStatus {
    /// Generation observed by the last reconciliation
    pub observed_generation: Option<i64>,

    /// `Ready`, `Error`, `Invalid`, `Stale`, `Ignored` or empty
    #[serde(default)]
    pub state: String,

    /// Human readable details about the state
    pub message: Option<String>,

    /// RFC3339 time of the last status change
    pub last_update_time: Option<String>,

    /// Type of the provider the records were written with
    pub provider_type: Option<String>,

    /// Provider key (`namespace/name`)
    pub provider: Option<String>,

    /// Zone id the records were written to
    pub zone: Option<String>,

    /// TTL of the applied records
    pub ttl: Option<i64>,

    /// DNS name of the applied records
    pub dns_name: Option<String>,

    /// Applied record values; TXT values are quoted
    #[serde(default)]
    pub targets: Vec<String>,

    /// Applied routing policy
    pub routing_policy: Option<RoutingPolicy>,
}

/// Include/exclude filter on zone ids or domain names.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DNSSelection {
    /// Values to include. Empty means everything.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,

    /// Values to exclude
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

/// Effective include/exclude lists reported in the provider status.
///
/// Empty lists are serialized so that a merge patch clears them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DNSSelectionStatus {
    #[serde(default)]
    pub included: Vec<String>,

    #[serde(default)]
    pub excluded: Vec<String>,
}

fn preserve_unknown_fields(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}

/// `DNSProvider` gives access to a DNS account.
///
/// The provider manages all zones of the account unless restricted by the
/// `zones` and `domains` filters. Entries in the same namespace are assigned to
/// the provider whose domains match their DNS name best.
///
/// # Example
///
/// ```yaml
/// apiVersion: dnsman.firestoned.io/v1alpha1
/// kind: DNSProvider
/// metadata:
///   name: local
///   namespace: default
/// spec:
///   type: in-memory
///   providerConfig:
///     zones:
///       - dnsName: example.com
///   domains:
///     include:
///       - example.com
///     exclude:
///       - private.example.com
/// ```
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dnsman.firestoned.io",
    version = "v1alpha1",
    kind = "DNSProvider",
    namespaced,
    shortname = "dnspr",
    doc = "DNSProvider configures access to a DNS account and selects the hosted zones and domains it is responsible for.",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[kube(status = "DNSProviderStatus")]
#[serde(rename_all = "camelCase")]
pub struct DNSProviderSpec {
    /// Provider type, e.g. `in-memory`
    #[serde(rename = "type")]
    pub provider_type: String,

    /// Type specific account configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub provider_config: Option<serde_json::Value>,

    /// Domain filter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domains: Option<DNSSelection>,

    /// Zone id filter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zones: Option<DNSSelection>,

    /// Default TTL for entries without their own TTL
    #[serde(rename = "defaultTTL", skip_serializing_if = "Option::is_none")]
    pub default_ttl: Option<i64>,
}

/// Status of a `DNSProvider`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DNSProviderStatus {
    pub observed_generation: Option<i64>,

    /// `Ready`, `Error`, `Invalid` or empty
    #[serde(default)]
    pub state: String,

    pub message: Option<String>,

    pub last_update_time: Option<String>,

    /// Effective domain selection
    #[serde(default)]
    pub domains: DNSSelectionStatus,

    /// Effective zone selection
    #[serde(default)]
    pub zones: DNSSelectionStatus,

    /// Default TTL in effect
    #[serde(rename = "defaultTTL")]
    pub default_ttl: Option<i64>,
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
