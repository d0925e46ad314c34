// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Domain name primitives: normalization, validation and suffix matching.

use crate::constants::{MAX_DOMAIN_LABEL_LENGTH, MAX_DOMAIN_NAME_LENGTH};
use crate::dns_errors::DomainNameError;
use std::fmt;

/// Normalize a domain name.
///
/// Lowercases the name, removes a trailing dot and turns an escaped wildcard
/// (`\052.`) into `*.`.
///
/// # Example
///
/// ```rust
/// use dnsman::dns::normalize_domain_name;
///
/// assert_eq!(normalize_domain_name("WWW.Example.COM."), "www.example.com");
/// assert_eq!(normalize_domain_name("\\052.example.com"), "*.example.com");
/// ```
#[must_use]
pub fn normalize_domain_name(name: &str) -> String {
    let name = match name.strip_prefix("\\052.") {
        Some(rest) => format!("*.{rest}"),
        None => name.to_string(),
    };
    name.strip_suffix('.').unwrap_or(&name).to_lowercase()
}

/// Validate a (normalized) domain name.
///
/// A wildcard label `*` is only allowed in first position. Labels consist of
/// letters, digits, `-` and `_`, and must not start or end with `-`.
///
/// # Errors
///
/// Returns a [`DomainNameError`] describing the first problem found.
pub fn validate_domain_name(name: &str) -> Result<(), DomainNameError> {
    if name.is_empty() {
        return Err(DomainNameError::Empty);
    }
    if name.len() > MAX_DOMAIN_NAME_LENGTH {
        return Err(DomainNameError::TooLong {
            name: name.to_string(),
            length: name.len(),
            max: MAX_DOMAIN_NAME_LENGTH,
        });
    }

    for (index, label) in name.split('.').enumerate() {
        if label.len() > MAX_DOMAIN_LABEL_LENGTH {
            return Err(DomainNameError::LabelTooLong {
                name: name.to_string(),
                label: label.to_string(),
            });
        }
        if label == "*" && index == 0 {
            continue;
        }
        let valid_chars = label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if label.is_empty() || !valid_chars || label.starts_with('-') || label.ends_with('-') {
            return Err(DomainNameError::InvalidLabel {
                name: name.to_string(),
                label: label.to_string(),
            });
        }
    }
    Ok(())
}

/// Returns true if `name` equals `domain` or is a subdomain of it.
///
/// Both names are expected to be normalized.
#[must_use]
pub fn matches_domain(name: &str, domain: &str) -> bool {
    if name == domain {
        return true;
    }
    name.len() > domain.len()
        && name.ends_with(domain)
        && name.as_bytes()[name.len() - domain.len() - 1] == b'.'
}

/// Length of the longest domain in `domains` that `name` matches, or 0.
#[must_use]
pub fn longest_match<'a, I>(name: &str, domains: I) -> usize
where
    I: IntoIterator<Item = &'a String>,
{
    domains
        .into_iter()
        .filter(|domain| matches_domain(name, domain))
        .map(String::len)
        .max()
        .unwrap_or(0)
}

/// Match length of `name` against an include/exclude domain selection.
///
/// The include length only counts if it is strictly greater than the
/// exclude length, so an equally specific exclude vetoes the match.
#[must_use]
pub fn match_selection<'a, I, E>(name: &str, included: I, excluded: E) -> usize
where
    I: IntoIterator<Item = &'a String>,
    E: IntoIterator<Item = &'a String>,
{
    let include_len = longest_match(name, included);
    let exclude_len = longest_match(name, excluded);
    if include_len > exclude_len {
        include_len
    } else {
        0
    }
}

/// Identifies a hosted zone across all providers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneId {
    pub provider_type: String,
    pub id: String,
}

impl ZoneId {
    #[must_use]
    pub fn new(provider_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            provider_type: provider_type.into(),
            id: id.into(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.provider_type.is_empty() && self.id.is_empty()
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider_type, self.id)
    }
}

/// Name of a record set: the DNS name plus the routing policy set identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DnsSetName {
    pub dns_name: String,
    pub set_identifier: String,
}

impl DnsSetName {
    #[must_use]
    pub fn new(dns_name: impl Into<String>) -> Self {
        Self {
            dns_name: dns_name.into(),
            set_identifier: String::new(),
        }
    }

    #[must_use]
    pub fn with_set_identifier(mut self, set_identifier: impl Into<String>) -> Self {
        self.set_identifier = set_identifier.into();
        self
    }

    /// Same name with a normalized DNS name.
    #[must_use]
    pub fn normalize(&self) -> Self {
        Self {
            dns_name: normalize_domain_name(&self.dns_name),
            set_identifier: self.set_identifier.clone(),
        }
    }
}

impl fmt::Display for DnsSetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.set_identifier.is_empty() {
            write!(f, "{}", self.dns_name)
        } else {
            write!(f, "{}#{}", self.dns_name, self.set_identifier)
        }
    }
}
