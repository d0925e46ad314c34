// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the dnsman controller.
//!
//! Every metric name starts with `dnsman_firestoned_io_`, the prometheus-safe
//! form of the API group. Metrics are created lazily on first use and
//! registered in [`METRICS_REGISTRY`], which `/metrics` serves.
//!
//! Three groups exist:
//!
//! - reconciliations of entries and providers (outcome, duration, requeues)
//! - the periodic CNAME lookup processor
//! - record set changes sent to provider accounts
//!
//! ```rust,no_run
//! use dnsman::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success("DNSEntry", std::time::Duration::from_secs(1));
//! ```

use crate::crd::ObjectKey;
use crate::lookup::processor::LookupMetrics;
use prometheus::core::Collector;
use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, IntCounter, Opts,
    Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

const PREFIX: &str = "dnsman_firestoned_io";

/// Registry holding every dnsman metric.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Register a freshly built metric. Names are static, so failures are bugs.
fn registered<M: Collector + Clone + 'static>(metric: Result<M, prometheus::Error>) -> M {
    let metric = metric.expect("metric definition is valid");
    METRICS_REGISTRY
        .register(Box::new(metric.clone()))
        .expect("metric name is unique");
    metric
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    registered(CounterVec::new(
        Opts::new(format!("{PREFIX}_{name}"), help),
        labels,
    ))
}

fn histogram_opts(name: &str, help: &str, buckets: &[f64]) -> HistogramOpts {
    HistogramOpts::new(format!("{PREFIX}_{name}"), help).buckets(buckets.to_vec())
}

// Reconciliations

/// Reconciliations by `resource_type` and `status` (`success`, `error`, `requeue`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "reconciliations_total",
        "Reconciliations by resource type and outcome",
        &["resource_type", "status"],
    )
});

pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    registered(HistogramVec::new(
        histogram_opts(
            "reconciliation_duration_seconds",
            "Reconciliation duration in seconds by resource type",
            &[0.005, 0.05, 0.25, 1.0, 2.5, 5.0, 15.0, 30.0, 60.0],
        ),
        &["resource_type"],
    ))
});

/// Requeues by `resource_type` and `reason` (`error`, `dns_name_locked`, ...)
pub static REQUEUE_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "requeues_total",
        "Requeues by resource type and reason",
        &["resource_type", "reason"],
    )
});

/// Errors by `resource_type` and `error_type`
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "errors_total",
        "Errors by resource type and category",
        &["resource_type", "error_type"],
    )
});

// Lookup processor, per entry series are dropped with the job

pub static LOOKUP_HOSTNAMES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "lookup_hostnames_total",
        "Hostnames looked up by entry",
        &["entry"],
    )
});

pub static LOOKUP_ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "lookup_errors_total",
        "Failed hostname lookups by entry",
        &["entry"],
    )
});

pub static LOOKUP_CHANGED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "lookup_changed_total",
        "Lookups that changed the resolved addresses by entry",
        &["entry"],
    )
});

pub static LOOKUP_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    registered(Histogram::with_opts(histogram_opts(
        "lookup_duration_seconds",
        "Duration of looking up all hostnames of one entry in seconds",
        &[0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0],
    )))
});

/// Runs skipped because the previous run of the same job was still busy
pub static LOOKUP_SKIPPED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    registered(IntCounter::new(
        format!("{PREFIX}_lookup_skipped_total"),
        "Skipped lookup runs",
    ))
});

pub static LOOKUP_JOBS: LazyLock<Gauge> = LazyLock::new(|| {
    registered(Gauge::new(
        format!("{PREFIX}_lookup_jobs"),
        "Entries with periodic hostname lookups",
    ))
});

// Provider accounts

/// Record set changes by `provider_type` and `action` (`create`, `update`, `delete`)
pub static CHANGE_REQUESTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "change_requests_total",
        "Record set changes by provider type and action",
        &["provider_type", "action"],
    )
});

fn record_reconciliation(resource_type: &str, status: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, status])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

pub fn record_reconciliation_success(resource_type: &str, duration: Duration) {
    record_reconciliation(resource_type, "success", duration);
}

pub fn record_reconciliation_error(resource_type: &str, duration: Duration) {
    record_reconciliation(resource_type, "error", duration);
}

pub fn record_reconciliation_requeue(resource_type: &str, reason: &str) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "requeue"])
        .inc();
    REQUEUE_TOTAL.with_label_values(&[resource_type, reason]).inc();
}

pub fn record_error(resource_type: &str, error_type: &str) {
    ERRORS_TOTAL
        .with_label_values(&[resource_type, error_type])
        .inc();
}

/// Count one executed record set change.
pub fn record_change_request(provider_type: &str, action: &str) {
    CHANGE_REQUESTS_TOTAL
        .with_label_values(&[provider_type, action])
        .inc();
}

/// [`LookupMetrics`] backed by [`METRICS_REGISTRY`].
#[derive(Clone, Copy, Debug, Default)]
pub struct PrometheusLookupMetrics;

#[allow(clippy::cast_precision_loss)]
impl LookupMetrics for PrometheusLookupMetrics {
    fn incr_hostname_lookups(&self, key: &ObjectKey, hosts: usize, errors: usize, duration: Duration) {
        let entry = key.to_string();
        LOOKUP_HOSTNAMES_TOTAL
            .with_label_values(&[entry.as_str()])
            .inc_by(hosts as f64);
        if errors > 0 {
            LOOKUP_ERRORS_TOTAL
                .with_label_values(&[entry.as_str()])
                .inc_by(errors as f64);
        }
        LOOKUP_DURATION_SECONDS.observe(duration.as_secs_f64());
    }

    fn incr_lookup_changed(&self, key: &ObjectKey) {
        LOOKUP_CHANGED_TOTAL
            .with_label_values(&[key.to_string().as_str()])
            .inc();
    }

    fn incr_skipped(&self) {
        LOOKUP_SKIPPED_TOTAL.inc();
    }

    fn remove_job(&self, key: &ObjectKey) {
        let entry = key.to_string();
        for series in [&*LOOKUP_HOSTNAMES_TOTAL, &*LOOKUP_ERRORS_TOTAL, &*LOOKUP_CHANGED_TOTAL] {
            // Series that were never written do not exist.
            let _ = series.remove_label_values(&[entry.as_str()]);
        }
    }

    fn report_current_job_count(&self, count: usize) {
        LOOKUP_JOBS.set(count as f64);
    }
}

/// All metrics in the Prometheus text exposition format.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&METRICS_REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("metrics are not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_counts_and_observes_duration() {
        record_reconciliation_success("SuccessKind", Duration::from_millis(500));

        assert!(
            RECONCILIATION_TOTAL
                .with_label_values(&["SuccessKind", "success"])
                .get()
                >= 1.0
        );
        assert!(
            RECONCILIATION_DURATION_SECONDS
                .with_label_values(&["SuccessKind"])
                .get_sample_count()
                >= 1
        );
    }

    #[test]
    fn requeue_counts_reason() {
        record_reconciliation_requeue("RequeueKind", "dns_name_locked");

        assert!(
            REQUEUE_TOTAL
                .with_label_values(&["RequeueKind", "dns_name_locked"])
                .get()
                >= 1.0
        );
        assert!(
            RECONCILIATION_TOTAL
                .with_label_values(&["RequeueKind", "requeue"])
                .get()
                >= 1.0
        );
    }

    #[test]
    fn removed_lookup_job_drops_entry_series() {
        let metrics = PrometheusLookupMetrics;
        let key = ObjectKey::new("metrics-test", "entry");

        metrics.incr_hostname_lookups(&key, 3, 1, Duration::from_millis(20));
        metrics.incr_lookup_changed(&key);
        assert!(
            LOOKUP_HOSTNAMES_TOTAL
                .with_label_values(&["metrics-test/entry"])
                .get()
                >= 3.0
        );

        metrics.remove_job(&key);
        let text = gather_metrics().unwrap();
        assert!(!text.contains("metrics-test/entry"));
    }

    #[test]
    fn exposition_contains_prefixed_metrics() {
        record_reconciliation_error("GatherKind", Duration::from_millis(100));
        record_change_request("in-memory", "create");

        let text = gather_metrics().unwrap();
        assert!(text.contains("dnsman_firestoned_io_reconciliations_total"));
        assert!(text.contains("dnsman_firestoned_io_change_requests_total"));
    }
}
