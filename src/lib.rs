// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # dnsman - DNS entry management for Kubernetes
//!
//! dnsman is a Kubernetes controller that keeps DNS records in external
//! hosted zones in sync with `DNSEntry` resources. `DNSProvider` resources
//! describe the provider accounts and the domains they may serve.
//!
//! ## Overview
//!
//! For each entry the controller:
//!
//! - selects the provider whose domains match the entry's DNS name best
//! - picks the hosted zone of that provider with the longest matching domain
//! - turns the entry's targets into record sets, resolving multiple CNAME
//!   targets to addresses and keeping them fresh in the background
//! - diffs the record sets with the zone and executes the change requests
//! - reports the result in the entry's status
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types
//! - [`dns`] - DNS names, record sets and targets
//! - [`provider`] - Provider accounts, zone selection and the provider registry
//! - [`lookup`] - Hostname resolution and periodic lookup jobs
//! - [`reconcilers`] - Reconciliation logic for entries and providers
//! - [`context`] - Shared context and reflector stores for the controllers
//! - [`config`] - Command line and environment configuration
//! - [`metrics`] - Prometheus metrics
//!
//! ## Example
//!
//! ```rust,no_run
//! use dnsman::crd::{DNSEntry, DNSEntrySpec};
//!
//! let entry = DNSEntry::new(
//!     "www",
//!     DNSEntrySpec {
//!         dns_name: "www.example.com".to_string(),
//!         targets: vec!["1.2.3.4".to_string()],
//!         ..Default::default()
//!     },
//! );
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod dns;
pub mod dns_errors;
pub mod lookup;
pub mod metrics;
pub mod provider;
pub mod reconcilers;
