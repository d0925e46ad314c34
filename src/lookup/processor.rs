// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Periodic re-lookup of CNAME targets.
//!
//! Entries whose CNAME targets are published as A/AAAA records register a
//! lookup job with [`LookupProcessor::upsert`]. The background loop started
//! with [`LookupProcessor::run`] repeats the lookup of every job once per job
//! interval and triggers a reconciliation of the entry when the resolved
//! addresses change.
//!
//! # Concurrency
//!
//! All jobs live in one map behind a single mutex. At most `concurrent_jobs`
//! lookups run at the same time. A job that is due while its previous lookup
//! is still running is skipped, so the processor falls behind gracefully
//! instead of piling up work.

use super::{HostResolver, LookupAllResults};
use crate::constants::MAX_LOOKUP_LOOP_SLEEP_SECS;
use crate::crd::ObjectKey;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Requeues an entry outside of the normal watch path.
#[async_trait]
pub trait EntryTrigger: Send + Sync {
    async fn trigger_reconciliation(&self, key: &ObjectKey) -> anyhow::Result<()>;
}

/// Metrics reported by the lookup processor.
pub trait LookupMetrics: Send + Sync {
    fn incr_hostname_lookups(&self, key: &ObjectKey, hosts: usize, errors: usize, duration: Duration);
    fn incr_lookup_changed(&self, key: &ObjectKey);
    fn incr_skipped(&self);
    fn remove_job(&self, key: &ObjectKey);
    fn report_current_job_count(&self, count: usize);
}

struct LookupJob {
    key: ObjectKey,
    running: AtomicBool,
    results: tokio::sync::Mutex<LookupAllResults>,
}

impl LookupJob {
    /// Store new results. Returns true if the addresses changed and the new
    /// lookup had no timeout.
    fn update_lookup_result(old: &mut LookupAllResults, new: LookupAllResults) -> bool {
        let changed = old.all_ip_addrs != new.all_ip_addrs;
        let has_timeout = new.has_timeout_error();
        *old = new;
        changed && !has_timeout
    }
}

struct ScheduledJob {
    job: Arc<LookupJob>,
    scheduled_at: Instant,
    interval: Duration,
}

/// Background processor for lookup jobs.
pub struct LookupProcessor {
    jobs: Mutex<HashMap<ObjectKey, ScheduledJob>>,
    resolver: HostResolver,
    entry_trigger: Arc<dyn EntryTrigger>,
    metrics: Arc<dyn LookupMetrics>,
    check_period: Duration,
    concurrent_jobs: usize,
    slots: Arc<Semaphore>,
    running: AtomicBool,
    skipped: AtomicU64,
}

impl LookupProcessor {
    #[must_use]
    pub fn new(
        resolver: HostResolver,
        entry_trigger: Arc<dyn EntryTrigger>,
        metrics: Arc<dyn LookupMetrics>,
        concurrent_jobs: usize,
        check_period: Duration,
    ) -> Self {
        let concurrent_jobs = concurrent_jobs.max(1);
        Self {
            jobs: Mutex::new(HashMap::new()),
            resolver,
            entry_trigger,
            metrics,
            check_period,
            concurrent_jobs,
            slots: Arc::new(Semaphore::new(concurrent_jobs)),
            running: AtomicBool::new(false),
            skipped: AtomicU64::new(0),
        }
    }

    /// Resolver used for lookups, shared with the targets producer.
    #[must_use]
    pub fn resolver(&self) -> &HostResolver {
        &self.resolver
    }

    /// Insert or update the lookup job of an entry.
    ///
    /// `results` is the lookup the caller just performed. For an existing job
    /// a change of the resolved addresses triggers a reconciliation.
    pub async fn upsert(&self, key: &ObjectKey, results: LookupAllResults, interval: Duration) {
        self.incr_hostname_lookups(key, &results);

        let now = Instant::now();
        let existing = {
            let mut jobs = self.lock_jobs();
            if let Some(scheduled) = jobs.get_mut(key) {
                scheduled.interval = interval;
                scheduled.scheduled_at = now + interval;
                Some(Arc::clone(&scheduled.job))
            } else {
                let job = LookupJob {
                    key: key.clone(),
                    running: AtomicBool::new(false),
                    results: tokio::sync::Mutex::new(results.clone()),
                };
                jobs.insert(
                    key.clone(),
                    ScheduledJob {
                        job: Arc::new(job),
                        scheduled_at: now + interval,
                        interval,
                    },
                );
                self.metrics.report_current_job_count(jobs.len());
                None
            }
        };

        if let Some(job) = existing {
            let changed = {
                let mut old = job.results.lock().await;
                LookupJob::update_lookup_result(&mut old, results)
            };
            if changed {
                self.trigger_reconciliation(key).await;
            }
        }
    }

    /// Remove the lookup job of an entry. Unknown keys are ignored.
    pub fn delete(&self, key: &ObjectKey) {
        let mut jobs = self.lock_jobs();
        if jobs.remove(key).is_none() {
            return;
        }
        self.metrics.remove_job(key);
        self.metrics.report_current_job_count(jobs.len());
        debug!(entry = %key, "Deleted lookup job");
    }

    #[must_use]
    pub fn job_count(&self) -> usize {
        self.lock_jobs().len()
    }

    #[must_use]
    pub fn has_job(&self, key: &ObjectKey) -> bool {
        self.lock_jobs().contains_key(key)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of lookups skipped because the previous lookup was still running.
    #[must_use]
    pub fn skipped_count(&self) -> u64 {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Run the processor loop until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        self.running.store(true, Ordering::SeqCst);
        info!(slots = self.concurrent_jobs, "Starting lookup processor");

        let mut next_check = self.check_period;
        loop {
            if !sleep(next_check, &cancel).await {
                info!("Lookup processor stopped");
                break;
            }
            let (next_check_time, skipped) = self.run_job(&cancel).await;
            if let Some(key) = skipped {
                info!(entry = %key, "Skipped entry as lookup not yet finished");
            }
            next_check = next_check_time.saturating_duration_since(Instant::now());
        }

        self.running.store(false, Ordering::SeqCst);
    }

    /// Start the lookup of the next due job, if any.
    ///
    /// Returns the time of the next check and the key of a skipped job.
    async fn run_job(self: &Arc<Self>, cancel: &CancellationToken) -> (Instant, Option<ObjectKey>) {
        let now = Instant::now();
        let (next_check, due_job) = {
            let mut jobs = self.lock_jobs();
            let mut due_job = None;
            let head = jobs.values_mut().min_by_key(|s| s.scheduled_at);
            if let Some(head) = head {
                if head.scheduled_at <= now {
                    head.scheduled_at = now + head.interval;
                    due_job = Some(Arc::clone(&head.job));
                }
            }
            let next_check = jobs
                .values()
                .map(|s| s.scheduled_at)
                .min()
                .unwrap_or(now + self.check_period);
            (next_check, due_job)
        };

        let Some(job) = due_job else {
            return (next_check, None);
        };

        if job
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.skipped.fetch_add(1, Ordering::SeqCst);
            self.metrics.incr_skipped();
            return (next_check, Some(job.key.clone()));
        }

        let permit = tokio::select! {
            () = cancel.cancelled() => None,
            permit = Arc::clone(&self.slots).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            job.running.store(false, Ordering::SeqCst);
            warn!(entry = %job.key, "Lookup cancelled");
            return (next_check, Some(job.key.clone()));
        };

        let processor = Arc::clone(self);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let changed = {
                let mut old = job.results.lock().await;
                let new = processor
                    .resolver
                    .lookup_all_hostnames_ips(&old.hostnames, &cancel)
                    .await;
                processor.incr_hostname_lookups(&job.key, &new);
                LookupJob::update_lookup_result(&mut old, new)
            };
            if changed {
                processor.trigger_reconciliation(&job.key).await;
            }
            job.running.store(false, Ordering::SeqCst);
        });

        (next_check, None)
    }

    fn incr_hostname_lookups(&self, key: &ObjectKey, results: &LookupAllResults) {
        self.metrics.incr_hostname_lookups(
            key,
            results.hostnames.len(),
            results.errors.len(),
            results.duration,
        );
    }

    async fn trigger_reconciliation(&self, key: &ObjectKey) {
        if let Err(e) = self.entry_trigger.trigger_reconciliation(key).await {
            warn!(entry = %key, error = %e, "Failed to trigger entry reconciliation");
        }
        self.metrics.incr_lookup_changed(key);
    }

    fn lock_jobs(&self) -> std::sync::MutexGuard<'_, HashMap<ObjectKey, ScheduledJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sleep for `duration`, capped at the maximum loop sleep. Returns false if
/// cancelled.
async fn sleep(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration < Duration::from_micros(1) {
        return !cancel.is_cancelled();
    }
    let duration = duration.min(Duration::from_secs(MAX_LOOKUP_LOOP_SLEEP_SECS));
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod processor_tests;
