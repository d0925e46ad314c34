// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Conversion between entry specs, entry status and record targets.
//!
//! [`TargetsProducer::from_spec`] validates a spec and turns it into targets.
//! Multiple CNAME targets (or a single one with `resolveTargetsToAddresses`)
//! are resolved to A/AAAA targets and registered as a lookup job, so later
//! address changes trigger a new reconciliation.

use crate::constants::{MAX_CNAME_TARGETS, MIN_CNAME_LOOKUP_INTERVAL_SECS};
use crate::crd::{DNSEntrySpec, DNSEntryStatus, ObjectKey};
use crate::dns::{
    add_unique, quote_text, unquote_text, validate_domain_name, IpStack, RecordType, Target,
};
use crate::dns_errors::TargetsError;
use crate::lookup::processor::LookupProcessor;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Targets of an entry plus the warnings found while building them.
#[derive(Clone, Debug, Default)]
pub struct TargetsResult {
    pub entry_key: ObjectKey,
    pub targets: Vec<Target>,
    pub warnings: Vec<String>,
}

impl TargetsResult {
    #[must_use]
    pub fn new(entry_key: ObjectKey) -> Self {
        Self {
            entry_key,
            ..Default::default()
        }
    }

    /// Add a target; a duplicate only produces a warning.
    pub fn add_target(&mut self, target: Target) {
        let field = if target.record_type == RecordType::Txt {
            "text"
        } else {
            "target"
        };
        let value = target.value.clone();
        if !add_unique(&mut self.targets, target) {
            self.add_warning(format!(
                "dns Entry {:?} has duplicate {field} {value:?}",
                self.entry_key.to_string()
            ));
        }
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    #[must_use]
    pub fn has_targets(&self) -> bool {
        !self.targets.is_empty()
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Builds targets from entry specs.
pub struct TargetsProducer {
    default_ttl: i64,
    default_cname_lookup_interval: i64,
    processor: Arc<LookupProcessor>,
    cancel: CancellationToken,
}

impl TargetsProducer {
    #[must_use]
    pub fn new(
        default_ttl: i64,
        default_cname_lookup_interval: i64,
        processor: Arc<LookupProcessor>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            default_ttl,
            default_cname_lookup_interval,
            processor,
            cancel,
        }
    }

    /// Validate the spec and build its targets.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed specs and
    /// [`TargetsError::LookupFailed`] if resolving CNAME targets failed for
    /// another reason than unknown hosts.
    pub async fn from_spec(
        &self,
        key: &ObjectKey,
        spec: &DNSEntrySpec,
        ip_stack: IpStack,
    ) -> Result<TargetsResult, TargetsError> {
        validate_domain_name(&spec.dns_name)?;

        if spec.reference.is_some() {
            return Err(TargetsError::ReferenceNotSupported);
        }
        if !spec.targets.is_empty() && !spec.text.is_empty() {
            return Err(TargetsError::TargetsAndText);
        }
        if spec.ttl.is_some_and(|ttl| ttl <= 0) {
            return Err(TargetsError::InvalidTtl);
        }
        let ttl = spec.ttl.unwrap_or(self.default_ttl);

        let mut result = TargetsResult::new(key.clone());
        for (i, target) in spec.targets.iter().enumerate() {
            if target.trim().is_empty() {
                return Err(TargetsError::EmptyTarget(i + 1));
            }
            result.add_target(Target::from_address_or_host(target, ttl, ip_stack));
        }

        let mut empty_count = 0;
        for text in &spec.text {
            if text.is_empty() {
                result.add_warning(format!("dns Entry {:?} has empty text", key.to_string()));
                empty_count += 1;
                continue;
            }
            result.add_target(Target::text(text.clone(), ttl));
        }
        if empty_count > 0 && empty_count == spec.text.len() {
            return Err(TargetsError::OnlyEmptyText);
        }

        if !result.has_targets() {
            return Err(TargetsError::NoTargets);
        }

        if check_cname_targets(spec, &result.targets)? {
            self.upsert_lookup_job(key, spec, &mut result).await?;
        } else {
            self.processor.delete(key);
        }

        Ok(result)
    }

    /// Resolve the CNAME targets and replace them by their addresses.
    async fn upsert_lookup_job(
        &self,
        key: &ObjectKey,
        spec: &DNSEntrySpec,
        result: &mut TargetsResult,
    ) -> Result<(), TargetsError> {
        let ttl = result.targets.first().map_or(0, |t| t.ttl);
        let interval = lookup_interval(
            spec.cname_lookup_interval,
            self.default_cname_lookup_interval,
            ttl,
        );
        let hostnames: Vec<String> = result.targets.iter().map(|t| t.value.clone()).collect();

        let results = self
            .processor
            .resolver()
            .lookup_all_hostnames_ips(&hostnames, &self.cancel)
            .await;
        let failed = results.has_errors() && !results.has_only_not_found_error();
        let error_message = results.error_message();

        let mut resolved = Vec::with_capacity(results.all_ip_addrs.len());
        for addr in &results.ipv4_addrs {
            resolved.push(Target::new(RecordType::A, addr.clone(), ttl));
        }
        for addr in &results.ipv6_addrs {
            resolved.push(Target::new(RecordType::Aaaa, addr.clone(), ttl));
        }

        debug!(
            entry = %key,
            hostnames = hostnames.len(),
            addresses = resolved.len(),
            interval_secs = interval,
            "Resolved CNAME targets to addresses"
        );
        self.processor
            .upsert(
                key,
                results,
                Duration::from_secs(u64::try_from(interval).unwrap_or(0)),
            )
            .await;

        if failed {
            return Err(TargetsError::LookupFailed(error_message));
        }
        result.targets = resolved;
        Ok(())
    }
}

/// Lookup interval in seconds for an entry.
///
/// An explicit interval is raised to at least 30 seconds and to at least a
/// third of the record TTL.
#[must_use]
pub fn lookup_interval(spec_interval: Option<i64>, default_interval: i64, ttl: i64) -> i64 {
    match spec_interval {
        Some(interval) if interval > 0 => {
            let mut interval = interval.max(MIN_CNAME_LOOKUP_INTERVAL_SECS);
            if ttl > 0 && interval < ttl / 3 {
                interval = ttl / 3;
            }
            interval
        }
        _ => default_interval,
    }
}

/// Returns true if the CNAME targets must be resolved to addresses.
fn check_cname_targets(spec: &DNSEntrySpec, targets: &[Target]) -> Result<bool, TargetsError> {
    let cname_count = targets
        .iter()
        .filter(|t| t.record_type == RecordType::Cname)
        .count();
    let other_count = targets.len() - cname_count;

    if cname_count > 0 && other_count > 0 {
        return Err(TargetsError::MixedRecordTypes);
    }
    if cname_count > MAX_CNAME_TARGETS {
        return Err(TargetsError::TooManyCnameTargets {
            count: cname_count,
            max: MAX_CNAME_TARGETS,
        });
    }
    Ok(cname_count > 1
        || (cname_count == 1 && spec.resolve_targets_to_addresses.unwrap_or(false)))
}

/// Record types a spec may have been applied with, without any lookup.
///
/// CNAME targets that get resolved to addresses yield A and AAAA.
#[must_use]
pub fn spec_record_types(spec: &DNSEntrySpec) -> BTreeSet<RecordType> {
    let targets: Vec<Target> = spec
        .targets
        .iter()
        .filter(|t| !t.trim().is_empty())
        .map(|t| Target::from_address_or_host(t, 0, IpStack::default()))
        .collect();
    let resolved = matches!(check_cname_targets(spec, &targets), Ok(true));

    let mut types = BTreeSet::new();
    for target in &targets {
        if resolved && target.record_type == RecordType::Cname {
            types.insert(RecordType::A);
            types.insert(RecordType::Aaaa);
        } else {
            types.insert(target.record_type);
        }
    }
    if spec.text.iter().any(|t| !t.is_empty()) {
        types.insert(RecordType::Txt);
    }
    types
}

/// Rebuild the applied targets from the entry status.
///
/// Returns no targets if no zone was ever written.
///
/// # Errors
///
/// Returns [`TargetsError::InvalidQuotedText`] for malformed TXT values.
pub fn status_to_targets(
    status: &DNSEntryStatus,
    ip_stack: IpStack,
) -> Result<Vec<Target>, TargetsError> {
    let mut targets = Vec::new();
    if status.zone.is_none() {
        return Ok(targets);
    }

    let ttl = status.ttl.unwrap_or(0);
    for value in &status.targets {
        let target = if value.starts_with('"') {
            let text = unquote_text(value)
                .ok_or_else(|| TargetsError::InvalidQuotedText(value.clone()))?;
            Target::text(text, ttl)
        } else {
            Target::from_address_or_host(value, ttl, ip_stack)
        };
        add_unique(&mut targets, target);
    }
    Ok(targets)
}

/// Target values as stored in the entry status. TXT values are quoted.
#[must_use]
pub fn targets_to_strings(targets: &[Target]) -> Vec<String> {
    let mut values: Vec<String> = Vec::with_capacity(targets.len());
    for target in targets {
        let value = if target.record_type == RecordType::Txt {
            quote_text(&target.value)
        } else {
            target.value.clone()
        };
        if target.record_type != RecordType::Txt && values.contains(&value) {
            continue;
        }
        values.push(value);
    }
    values
}
