// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for DNS entry and provider processing.
//!
//! This module provides specialized error types for:
//! - Domain name validation
//! - Conversion of entry specs into record targets
//! - Hostname lookups for CNAME targets
//! - DNS account (provider backend) operations
//!
//! The `Display` texts are persisted into `status.message` of the custom
//! resources, so they are part of the user-visible surface.

use thiserror::Error;

/// Errors returned when validating a domain name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainNameError {
    /// Domain name is empty after normalization
    #[error("domain name must not be empty")]
    Empty,

    /// Domain name exceeds the maximum total length
    #[error("domain name {name:?} is too long ({length} > {max})")]
    TooLong {
        /// The offending domain name
        name: String,
        /// Actual length
        length: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// A single label exceeds the maximum label length
    #[error("label {label:?} of domain name {name:?} is too long")]
    LabelTooLong {
        /// The offending domain name
        name: String,
        /// The label that is too long
        label: String,
    },

    /// A label is empty, malformed, or a wildcard is not in first position
    #[error("invalid label {label:?} in domain name {name:?}")]
    InvalidLabel {
        /// The offending domain name
        name: String,
        /// The invalid label
        label: String,
    },
}

/// Errors returned by the targets producer.
///
/// All variants except [`TargetsError::LookupFailed`] are validation errors
/// of the entry spec and lead to the `Invalid` state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetsError {
    /// DNS name of the entry is not a valid domain name
    #[error(transparent)]
    InvalidDomainName(#[from] DomainNameError),

    /// Legacy `reference` field is set
    #[error("`reference` field is not supported anymore")]
    ReferenceNotSupported,

    /// Both `targets` and `text` are set
    #[error("only text or targets possible")]
    TargetsAndText,

    /// TTL is zero or negative
    #[error("TTL must be greater than zero")]
    InvalidTtl,

    /// A target is blank (1-based index)
    #[error("target {0} must not be empty")]
    EmptyTarget(usize),

    /// All text entries are empty
    #[error("dns Entry has only empty text")]
    OnlyEmptyText,

    /// Neither targets nor text given
    #[error("no target or text specified")]
    NoTargets,

    /// CNAME targets mixed with address targets
    #[error("cannot mix CNAME and other record types in targets")]
    MixedRecordTypes,

    /// Too many raw CNAME targets
    #[error("too many CNAME targets ({count}), maximum is {max}")]
    TooManyCnameTargets {
        /// Number of CNAME targets in the spec
        count: usize,
        /// Maximum allowed
        max: usize,
    },

    /// A quoted status target could not be unquoted
    #[error("failed to unquote TXT target {0}")]
    InvalidQuotedText(String),

    /// Hostname resolution failed with errors other than not-found
    #[error("lookup failed for some targets: {0}")]
    LookupFailed(String),
}

impl TargetsError {
    /// Returns true if the error is caused by the entry spec itself.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        !matches!(self, Self::LookupFailed(_))
    }
}

/// Errors from resolving a single hostname.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// Hostname does not exist or has no address records
    #[error("lookup {hostname}: no such host")]
    NotFound {
        /// The hostname that was looked up
        hostname: String,
    },

    /// Resolver did not answer in time, or answered with a temporary failure
    #[error("lookup {hostname}: i/o timeout")]
    Timeout {
        /// The hostname that was looked up
        hostname: String,
    },

    /// Resolver answered, but without any IPv4 or IPv6 address
    #[error("{hostname} has no IPv4/IPv6 address (of {count} addresses)")]
    NoAddress {
        /// The hostname that was looked up
        hostname: String,
        /// Number of records returned
        count: usize,
    },

    /// Any other resolver failure
    #[error("lookup {hostname}: {reason}")]
    Failed {
        /// The hostname that was looked up
        hostname: String,
        /// Resolver error text
        reason: String,
    },

    /// Lookup was cancelled by shutdown
    #[error("lookup cancelled")]
    Cancelled,
}

impl LookupError {
    /// Returns true for timeout-class errors, which are retried.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if the hostname does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors from DNS account (provider backend) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// No account factory handles the provider type
    #[error("provider type {0:?} is not supported")]
    UnsupportedType(String),

    /// Provider type is disabled by configuration
    #[error("provider type {0:?} is not enabled")]
    TypeNotEnabled(String),

    /// `providerConfig` could not be parsed
    #[error("invalid provider config for type {provider_type:?}: {reason}")]
    InvalidConfig {
        /// Provider type
        provider_type: String,
        /// Parse error text
        reason: String,
    },

    /// Account reported a failure listing its zones
    #[error("failed to get hosted zones: {0}")]
    GetZones(String),

    /// Zone is not part of the account
    #[error("zone {0} not found")]
    ZoneNotFound(String),

    /// No registered provider serves the zone
    #[error("no provider found for zone {0}")]
    NoAccountForZone(String),

    /// Record set carries a routing policy the backend cannot store
    #[error("routing policy not supported by provider type {0:?}")]
    RoutingPolicyNotSupported(String),

    /// Change request execution failed
    #[error("failed to execute change request for {name}: {reason}")]
    Execution {
        /// DNS set name of the failed request
        name: String,
        /// Failure text
        reason: String,
    },
}

#[cfg(test)]
#[path = "dns_errors_tests.rs"]
mod dns_errors_tests;
