// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS value types shared by the provider, lookup and reconciler modules.
//!
//! - [`names`] - domain normalization, validation and suffix matching, zone ids
//! - [`records`] - record types, record sets, DNS sets, routing policies
//! - [`target`] - desired record values of an entry

pub mod names;
pub mod records;
pub mod target;

pub use names::{
    longest_match, match_selection, matches_domain, normalize_domain_name, validate_domain_name,
    DnsSetName, ZoneId,
};
pub use records::{
    DnsSet, FullRecordSetKey, RecordSet, RecordType, RoutingPolicy, RoutingPolicyType,
};
pub use target::{add_unique, quote_text, targets_differ, unquote_text, IpStack, Target};
