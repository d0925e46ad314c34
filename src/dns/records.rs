// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Record sets and DNS sets as exchanged with DNS accounts.

use super::names::{normalize_domain_name, DnsSetName, ZoneId};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Supported DNS record types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Txt,
    Ns,
}

impl RecordType {
    /// Record types an entry can produce.
    pub const ENTRY_TYPES: [RecordType; 4] = [Self::A, Self::Aaaa, Self::Cname, Self::Txt];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Cname => "CNAME",
            Self::Txt => "TXT",
            Self::Ns => "NS",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(Self::A),
            "AAAA" => Ok(Self::Aaaa),
            "CNAME" => Ok(Self::Cname),
            "TXT" => Ok(Self::Txt),
            "NS" => Ok(Self::Ns),
            other => Err(format!("unknown record type {other:?}")),
        }
    }
}

/// Closed set of routing policy types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RoutingPolicyType {
    Weighted,
    Latency,
    Geolocation,
    IpBased,
    Failover,
}

impl RoutingPolicyType {
    pub const ALL: [RoutingPolicyType; 5] = [
        Self::Weighted,
        Self::Latency,
        Self::Geolocation,
        Self::IpBased,
        Self::Failover,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weighted => "weighted",
            Self::Latency => "latency",
            Self::Geolocation => "geolocation",
            Self::IpBased => "ip-based",
            Self::Failover => "failover",
        }
    }

    /// Parse the policy type as written in a `DNSEntry`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl fmt::Display for RoutingPolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing policy attached to a record set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingPolicy {
    pub policy_type: RoutingPolicyType,
    pub parameters: BTreeMap<String, String>,
}

/// The values of one record type for one DNS set name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordSet {
    pub record_type: RecordType,
    pub ttl: i64,
    pub records: Vec<String>,
    pub routing_policy: Option<RoutingPolicy>,
}

impl RecordSet {
    #[must_use]
    pub fn new(record_type: RecordType, ttl: i64, records: Vec<String>) -> Self {
        Self {
            record_type,
            ttl,
            records,
            routing_policy: None,
        }
    }

    #[must_use]
    pub fn with_routing_policy(mut self, policy: Option<RoutingPolicy>) -> Self {
        self.routing_policy = policy;
        self
    }

    /// Content equality.
    ///
    /// Record order does not matter.
    #[must_use]
    pub fn matches(&self, other: &RecordSet) -> bool {
        if self.records.len() != other.records.len() {
            return false;
        }
        if self.ttl != other.ttl {
            return false;
        }
        if self.routing_policy != other.routing_policy {
            return false;
        }
        self.records.iter().all(|r| other.records.contains(r))
    }
}

impl fmt::Display for RecordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.records.is_empty() {
            return f.write_str("no records");
        }
        write!(f, "[{}]", self.records.join(", "))
    }
}

/// All record sets of one DNS set name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DnsSet {
    pub name: DnsSetName,
    pub sets: BTreeMap<RecordType, RecordSet>,
}

impl DnsSet {
    #[must_use]
    pub fn new(name: &DnsSetName) -> Self {
        Self {
            name: name.normalize(),
            sets: BTreeMap::new(),
        }
    }

    /// Store a record set, replacing one of the same type.
    ///
    /// CNAME values are normalized.
    pub fn set_record_set(&mut self, mut record_set: RecordSet) {
        if record_set.record_type == RecordType::Cname {
            record_set.records = record_set
                .records
                .iter()
                .map(|value| normalize_domain_name(value))
                .collect();
        }
        self.sets.insert(record_set.record_type, record_set);
    }
}

/// Globally unique key of a record set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FullRecordSetKey {
    pub zone_id: ZoneId,
    pub name: DnsSetName,
    pub record_type: RecordType,
}

impl FullRecordSetKey {
    #[must_use]
    pub fn new(zone_id: ZoneId, name: &DnsSetName, record_type: RecordType) -> Self {
        Self {
            zone_id,
            name: name.normalize(),
            record_type,
        }
    }
}

impl fmt::Display for FullRecordSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zone_id, self.name, self.record_type)
    }
}
