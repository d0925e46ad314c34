// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Hostname resolution for CNAME targets that are published as addresses.
//!
//! [`HostResolver::lookup_all_hostnames_ips`] resolves a list of hostnames
//! with bounded concurrency. Timeouts are retried a few times; a hostname
//! that does not exist does not stop the other lookups.
//!
//! The [`processor`] module repeats these lookups periodically and triggers a
//! reconciliation of the entry when the addresses change.

pub mod processor;

use crate::constants::{LOOKUP_RETRY_WAIT_MILLIS, MAX_CONCURRENT_LOOKUPS_PER_JOB, MAX_LOOKUP_RETRIES};
use crate::dns_errors::LookupError;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Resolves a single hostname to its addresses.
#[async_trait]
pub trait HostLookup: Send + Sync {
    async fn lookup_ip(&self, hostname: &str) -> Result<Vec<IpAddr>, LookupError>;
}

/// [`HostLookup`] backed by the system resolver configuration.
pub struct HickoryHostLookup {
    resolver: TokioAsyncResolver,
}

impl HickoryHostLookup {
    /// Create a lookup using `/etc/resolv.conf`.
    ///
    /// # Errors
    ///
    /// Returns an error if the system resolver configuration cannot be read.
    pub fn from_system_conf() -> anyhow::Result<Self> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()?;
        Ok(Self { resolver })
    }
}

#[async_trait]
impl HostLookup for HickoryHostLookup {
    async fn lookup_ip(&self, hostname: &str) -> Result<Vec<IpAddr>, LookupError> {
        match self.resolver.lookup_ip(hostname).await {
            Ok(lookup) => Ok(lookup.iter().collect()),
            Err(err) => Err(match err.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => LookupError::NotFound {
                    hostname: hostname.to_string(),
                },
                ResolveErrorKind::Timeout => LookupError::Timeout {
                    hostname: hostname.to_string(),
                },
                _ => LookupError::Failed {
                    hostname: hostname.to_string(),
                    reason: err.to_string(),
                },
            }),
        }
    }
}

/// Aggregated result of resolving several hostnames.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LookupAllResults {
    pub hostnames: Vec<String>,
    /// Sorted, unique IPv4 addresses of all hostnames
    pub ipv4_addrs: Vec<String>,
    /// Sorted, unique IPv6 addresses of all hostnames
    pub ipv6_addrs: Vec<String>,
    pub errors: Vec<LookupError>,
    pub all_ip_addrs: BTreeSet<String>,
    pub duration: Duration,
}

impl LookupAllResults {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    #[must_use]
    pub fn has_timeout_error(&self) -> bool {
        self.errors.iter().any(LookupError::is_timeout)
    }

    /// True if there are errors and all of them are not-found errors.
    #[must_use]
    pub fn has_only_not_found_error(&self) -> bool {
        !self.errors.is_empty() && self.errors.iter().all(LookupError::is_not_found)
    }

    /// Error texts joined for a status message.
    #[must_use]
    pub fn error_message(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Default)]
struct HostAddrs {
    ipv4: Vec<String>,
    ipv6: Vec<String>,
}

/// Resolves hostnames with bounded concurrency and retries.
#[derive(Clone)]
pub struct HostResolver {
    lookup: Arc<dyn HostLookup>,
    max_concurrent_lookups: usize,
    max_retries: u32,
    retry_wait: Duration,
}

impl HostResolver {
    #[must_use]
    pub fn new(lookup: Arc<dyn HostLookup>) -> Self {
        Self {
            lookup,
            max_concurrent_lookups: MAX_CONCURRENT_LOOKUPS_PER_JOB,
            max_retries: MAX_LOOKUP_RETRIES,
            retry_wait: Duration::from_millis(LOOKUP_RETRY_WAIT_MILLIS),
        }
    }

    #[must_use]
    pub fn with_retries(mut self, max_retries: u32, retry_wait: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_wait = retry_wait;
        self
    }

    /// Resolve all hostnames.
    ///
    /// Addresses are de-duplicated across hostnames and sorted. Errors are
    /// collected per hostname.
    pub async fn lookup_all_hostnames_ips(
        &self,
        hostnames: &[String],
        cancel: &CancellationToken,
    ) -> LookupAllResults {
        let start = Instant::now();
        let outcomes: Vec<Result<HostAddrs, LookupError>> = stream::iter(hostnames.iter().cloned())
            .map(|hostname| async move {
                tokio::select! {
                    () = cancel.cancelled() => Err(LookupError::Cancelled),
                    result = self.lookup_ips(&hostname) => result,
                }
            })
            .buffer_unordered(self.max_concurrent_lookups.max(1))
            .collect()
            .await;

        let mut all = LookupAllResults {
            hostnames: hostnames.to_vec(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                Ok(addrs) => {
                    for addr in addrs.ipv4 {
                        if all.all_ip_addrs.insert(addr.clone()) {
                            all.ipv4_addrs.push(addr);
                        }
                    }
                    for addr in addrs.ipv6 {
                        if all.all_ip_addrs.insert(addr.clone()) {
                            all.ipv6_addrs.push(addr);
                        }
                    }
                }
                Err(err) => all.errors.push(err),
            }
        }
        all.ipv4_addrs.sort();
        all.ipv6_addrs.sort();
        all.duration = start.elapsed();
        all
    }

    async fn lookup_ips(&self, hostname: &str) -> Result<HostAddrs, LookupError> {
        let mut attempt = 1;
        let ips = loop {
            match self.lookup.lookup_ip(hostname).await {
                Ok(ips) => break ips,
                Err(err) if err.is_timeout() && attempt < self.max_retries => {
                    debug!(hostname, attempt, "Lookup timed out, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.retry_wait).await;
                }
                Err(err) => return Err(err),
            }
        };

        let mut addrs = HostAddrs::default();
        for ip in &ips {
            match ip {
                IpAddr::V4(v4) => addrs.ipv4.push(v4.to_string()),
                IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                    Some(v4) => addrs.ipv4.push(v4.to_string()),
                    None => addrs.ipv6.push(v6.to_string()),
                },
            }
        }
        if addrs.ipv4.is_empty() && addrs.ipv6.is_empty() {
            return Err(LookupError::NoAddress {
                hostname: hostname.to_string(),
                count: ips.len(),
            });
        }
        Ok(addrs)
    }
}
