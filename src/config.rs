// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller configuration.
//!
//! Every option is a command line flag that can also be set through a
//! `DNSMAN_*` environment variable. Durations accept plain seconds (`15`) or
//! suffixed values (`15s`, `2m`, `1h`).

use crate::constants::{
    DEFAULT_CLASS, DEFAULT_CNAME_LOOKUP_INTERVAL_SECS, DEFAULT_METRICS_BIND_ADDRESS,
    DEFAULT_TTL_SECS,
};
use anyhow::{bail, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Minimum number of concurrent lookup jobs
pub const MIN_CONCURRENT_LOOKUPS: usize = 2;

/// Command line and environment configuration of the controller.
#[derive(Clone, Debug, Parser)]
#[command(name = "dnsman", version, about = "DNS entry management operator for Kubernetes")]
pub struct ControllerConfig {
    /// Namespace to watch, all namespaces if unset
    #[arg(long, env = "DNSMAN_NAMESPACE")]
    pub namespace: Option<String>,

    /// Class of entries and providers handled by this controller
    #[arg(long, env = "DNSMAN_CLASS", default_value = DEFAULT_CLASS)]
    pub class: String,

    /// TTL in seconds for entries without TTL and providers without default TTL
    #[arg(long, env = "DNSMAN_DEFAULT_TTL", default_value_t = DEFAULT_TTL_SECS)]
    pub default_ttl: i64,

    /// Lookup interval in seconds for CNAME targets resolved to addresses
    #[arg(
        long,
        env = "DNSMAN_DEFAULT_CNAME_LOOKUP_INTERVAL",
        default_value_t = DEFAULT_CNAME_LOOKUP_INTERVAL_SECS
    )]
    pub default_cname_lookup_interval: i64,

    /// Maximum number of lookup jobs running at the same time
    #[arg(long, env = "DNSMAN_MAX_CONCURRENT_LOOKUPS", default_value_t = 5)]
    pub max_concurrent_lookups: usize,

    /// Idle check period of the lookup processor
    #[arg(
        long,
        env = "DNSMAN_LOOKUP_CHECK_PERIOD",
        default_value = "15s",
        value_parser = parse_duration
    )]
    pub lookup_check_period: Duration,

    /// Timeout of a single entry reconciliation
    #[arg(
        long,
        env = "DNSMAN_RECONCILE_TIMEOUT",
        default_value = "2m",
        value_parser = parse_duration
    )]
    pub reconcile_timeout: Duration,

    /// Period after which providers are reconciled again
    #[arg(
        long,
        env = "DNSMAN_PROVIDER_RECHECK_PERIOD",
        default_value = "5m",
        value_parser = parse_duration
    )]
    pub provider_recheck_period: Duration,

    /// Comma separated provider types to enable, all if empty
    #[arg(long, env = "DNSMAN_ENABLED_PROVIDER_TYPES", value_delimiter = ',')]
    pub enabled_provider_types: Vec<String>,

    /// Comma separated provider types to disable
    #[arg(long, env = "DNSMAN_DISABLED_PROVIDER_TYPES", value_delimiter = ',')]
    pub disabled_provider_types: Vec<String>,

    /// Bind address of the metrics endpoint
    #[arg(long, env = "DNSMAN_METRICS_BIND_ADDRESS", default_value = DEFAULT_METRICS_BIND_ADDRESS)]
    pub metrics_bind_address: SocketAddr,
}

impl ControllerConfig {
    /// Check value ranges that clap cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid option.
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl <= 0 {
            bail!("default TTL must be greater than zero, got {}", self.default_ttl);
        }
        if self.default_cname_lookup_interval <= 0 {
            bail!(
                "default CNAME lookup interval must be greater than zero, got {}",
                self.default_cname_lookup_interval
            );
        }
        if self.max_concurrent_lookups < MIN_CONCURRENT_LOOKUPS {
            bail!(
                "max concurrent lookups must be at least {MIN_CONCURRENT_LOOKUPS}, got {}",
                self.max_concurrent_lookups
            );
        }
        if self.lookup_check_period.is_zero() {
            bail!("lookup check period must not be zero");
        }
        if let Some(both) = self
            .enabled_provider_types
            .iter()
            .find(|t| self.disabled_provider_types.contains(t))
        {
            bail!("provider type {both:?} is both enabled and disabled");
        }
        Ok(())
    }

    /// Returns true if objects with the given class annotation are handled.
    #[must_use]
    pub fn is_responsible_for(&self, class: Option<&str>) -> bool {
        class.unwrap_or(DEFAULT_CLASS) == self.class
    }

    #[must_use]
    pub fn default_cname_lookup_interval(&self) -> Duration {
        Duration::from_secs(u64::try_from(self.default_cname_lookup_interval).unwrap_or(0))
    }
}

/// Parse plain seconds or a `humantime` duration.
///
/// # Errors
///
/// Returns the parse error text for clap.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        return value
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| e.to_string());
    }
    humantime::parse_duration(value).map_err(|e| e.to_string())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
