// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired record values ("targets") of an entry.

use super::records::RecordType;
use crate::constants::{IP_STACK_DUAL_STACK, IP_STACK_IPV4, IP_STACK_IPV6};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;

/// IP stack hint from the `ip-stack` annotation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IpStack {
    #[default]
    Ipv4,
    DualStack,
    Ipv6,
}

impl IpStack {
    /// Parse an annotation value; unknown or missing values mean IPv4.
    #[must_use]
    pub fn from_annotation(value: Option<&str>) -> Self {
        match value {
            Some(IP_STACK_DUAL_STACK) => Self::DualStack,
            Some(IP_STACK_IPV6) => Self::Ipv6,
            _ => Self::Ipv4,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ipv4 => IP_STACK_IPV4,
            Self::DualStack => IP_STACK_DUAL_STACK,
            Self::Ipv6 => IP_STACK_IPV6,
        }
    }
}

/// A single desired record value.
///
/// Identity is `(record_type, value)`; TTL and IP stack are ignored by
/// `Eq` and `Hash`.
#[derive(Clone, Debug)]
pub struct Target {
    pub record_type: RecordType,
    pub value: String,
    pub ttl: i64,
    pub ip_stack: IpStack,
}

impl Target {
    #[must_use]
    pub fn new(record_type: RecordType, value: impl Into<String>, ttl: i64) -> Self {
        Self {
            record_type,
            value: value.into(),
            ttl,
            ip_stack: IpStack::default(),
        }
    }

    #[must_use]
    pub fn text(value: impl Into<String>, ttl: i64) -> Self {
        Self::new(RecordType::Txt, value, ttl)
    }

    /// Classify a literal value: IPv4 gives A, IPv6 gives AAAA, anything else
    /// is a CNAME carrying the IP stack hint.
    #[must_use]
    pub fn from_address_or_host(value: &str, ttl: i64, ip_stack: IpStack) -> Self {
        match value.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => Self::new(RecordType::A, value, ttl),
            Ok(IpAddr::V6(_)) => Self::new(RecordType::Aaaa, value, ttl),
            Err(_) => Self {
                ip_stack,
                ..Self::new(RecordType::Cname, value, ttl)
            },
        }
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.record_type == other.record_type && self.value == other.value
    }
}

impl Eq for Target {}

impl Hash for Target {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.record_type.hash(state);
        self.value.hash(state);
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.record_type, self.value)
    }
}

/// Append `target` unless an equal target is present. Returns false for a
/// duplicate.
pub fn add_unique(targets: &mut Vec<Target>, target: Target) -> bool {
    if targets.contains(&target) {
        return false;
    }
    targets.push(target);
    true
}

/// Returns true if both lists hold different targets, ignoring order.
#[must_use]
pub fn targets_differ(a: &[Target], b: &[Target]) -> bool {
    a.len() != b.len() || a.iter().any(|t| !b.contains(t))
}

/// Quote a TXT value the way it is stored in entry status.
#[must_use]
pub fn quote_text(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

/// Reverse of [`quote_text`]. Returns `None` for malformed input.
#[must_use]
pub fn unquote_text(value: &str) -> Option<String> {
    let inner = value.strip_prefix('"')?.strip_suffix('"')?;
    let mut unquoted = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                '"' => unquoted.push('"'),
                '\\' => unquoted.push('\\'),
                'n' => unquoted.push('\n'),
                't' => unquoted.push('\t'),
                _ => return None,
            },
            '"' => return None,
            other => unquoted.push(other),
        }
    }
    Some(unquoted)
}
