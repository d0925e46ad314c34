// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the dnsman operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for all dnsman CRDs
pub const API_GROUP: &str = "dnsman.firestoned.io";

/// API version for all dnsman CRDs
pub const API_VERSION: &str = "v1alpha1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "dnsman.firestoned.io/v1alpha1";

/// Kind name for `DNSEntry` resource
pub const KIND_DNS_ENTRY: &str = "DNSEntry";

/// Kind name for `DNSProvider` resource
pub const KIND_DNS_PROVIDER: &str = "DNSProvider";

// ============================================================================
// Status States
// ============================================================================

/// Entry or provider is reconciled and active
pub const STATE_READY: &str = "Ready";

/// Reconciliation failed with a hard error
pub const STATE_ERROR: &str = "Error";

/// Spec failed validation
pub const STATE_INVALID: &str = "Invalid";

/// Records may still exist but cannot be managed right now
pub const STATE_STALE: &str = "Stale";

/// Entry is skipped because of an ignore annotation
pub const STATE_IGNORED: &str = "Ignored";

// ============================================================================
// Annotations and Finalizers
// ============================================================================

/// Controller class annotation for entries and providers
pub const ANNOTATION_CLASS: &str = "dnsman.firestoned.io/class";

/// Class used when no class annotation is present
pub const DEFAULT_CLASS: &str = "dnsman";

/// Annotation to skip reconciliation of an entry
pub const ANNOTATION_IGNORE: &str = "dnsman.firestoned.io/ignore";

/// Ignore while not deleting (same as `reconcile`)
pub const ANNOTATION_IGNORE_VALUE_TRUE: &str = "true";

/// Ignore while not deleting (same as `true`)
pub const ANNOTATION_IGNORE_VALUE_RECONCILE: &str = "reconcile";

/// Ignore always, including deletion. Records may be orphaned.
pub const ANNOTATION_IGNORE_VALUE_FULL: &str = "full";

/// Hard ignore annotation, same effect as `ignore: full`
pub const ANNOTATION_HARD_IGNORE: &str = "dnsman.firestoned.io/target-hard-ignore";

/// IP stack hint for resolved targets
pub const ANNOTATION_IP_STACK: &str = "dnsman.firestoned.io/ip-stack";

/// IP stack value: IPv4 only (default)
pub const IP_STACK_IPV4: &str = "ipv4";

/// IP stack value: IPv4 and IPv6
pub const IP_STACK_DUAL_STACK: &str = "dual-stack";

/// IP stack value: IPv6 only
pub const IP_STACK_IPV6: &str = "ipv6";

/// Finalizer held by entries with live records and by providers
pub const FINALIZER_DNSMAN: &str = "dnsman.firestoned.io/finalizer";

// ============================================================================
// DNS Constants
// ============================================================================

/// Default TTL for records when neither entry nor provider sets one
pub const DEFAULT_TTL_SECS: i64 = 360;

/// Maximum number of raw CNAME targets per entry
pub const MAX_CNAME_TARGETS: usize = 25;

/// Maximum length of a domain name
pub const MAX_DOMAIN_NAME_LENGTH: usize = 253;

/// Maximum length of a single domain label
pub const MAX_DOMAIN_LABEL_LENGTH: usize = 63;

// ============================================================================
// Lookup Constants
// ============================================================================

/// Default interval between CNAME re-lookups
pub const DEFAULT_CNAME_LOOKUP_INTERVAL_SECS: i64 = 600;

/// Lower bound for a per-entry lookup interval
pub const MIN_CNAME_LOOKUP_INTERVAL_SECS: i64 = 30;

/// Hostnames resolved in parallel within one lookup job
pub const MAX_CONCURRENT_LOOKUPS_PER_JOB: usize = 4;

/// Attempts per hostname on timeout errors
pub const MAX_LOOKUP_RETRIES: u32 = 5;

/// Wait between lookup attempts
pub const LOOKUP_RETRY_WAIT_MILLIS: u64 = 500;

/// Upper bound for one sleep of the lookup processor loop
pub const MAX_LOOKUP_LOOP_SLEEP_SECS: u64 = 30;

// ============================================================================
// Controller Timing Constants
// ============================================================================

/// Requeue delay while a provider state is not yet loaded
pub const PROVIDER_STATE_REQUEUE_SECS: u64 = 3;

/// Requeue delay when a DNS name is locked by another entry
pub const DNS_NAME_LOCK_REQUEUE_SECS: u64 = 3;

/// Maximum random delay added to the DNS name lock requeue
pub const DNS_NAME_LOCK_JITTER_MILLIS: u64 = 500;

/// Requeue delay of an entry whose provider is not ready
pub const PROVIDER_NOT_READY_REQUEUE_SECS: u64 = 30;

/// Requeue delay after a reconciliation error
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Capacity of the channel feeding lookup-triggered reconciliations
pub const ENTRY_TRIGGER_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for the Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Default bind address of the metrics server
pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// HTTP path for Prometheus metrics
pub const METRICS_SERVER_PATH: &str = "/metrics";
