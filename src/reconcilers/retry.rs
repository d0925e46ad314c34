// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Retries of Kubernetes API calls.
//!
//! Throttling (429), server errors (5xx) and transport failures are retried
//! with jittered, doubling delays. Any other error is returned at once so the
//! caller can act on it, e.g. treat a 404 as "already gone".

use anyhow::{anyhow, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Delay before the first retry
const FIRST_DELAY: Duration = Duration::from_millis(100);

/// Upper bound of a single delay
const MAX_DELAY: Duration = Duration::from_secs(15);

/// No retry is started after this much time
const GIVE_UP_AFTER: Duration = Duration::from_secs(120);

/// Relative jitter of each delay (±10%)
const JITTER: f64 = 0.1;

/// Delays between the attempts of one API call.
#[derive(Debug)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    deadline: Instant,
    jitter: f64,
}

impl Backoff {
    #[must_use]
    pub fn new(first: Duration, max: Duration, give_up_after: Duration, jitter: f64) -> Self {
        Self {
            next: first,
            max,
            deadline: Instant::now() + give_up_after,
            jitter,
        }
    }

    /// Delay before the next attempt, or `None` once the deadline has passed.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if Instant::now() >= self.deadline {
            return None;
        }
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        Some(jittered(delay, self.jitter))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(FIRST_DELAY, MAX_DELAY, GIVE_UP_AFTER, JITTER)
    }
}

fn jittered(delay: Duration, jitter: f64) -> Duration {
    let factor = 1.0 + jitter * (2.0 * rand::random::<f64>() - 1.0);
    delay.mul_f64(factor.max(0.0))
}

/// Run a Kubernetes API call, retrying transient failures.
///
/// # Errors
///
/// Returns the first non-retryable error, or an error naming the call once
/// the backoff gives up.
///
/// # Example
///
/// ```no_run
/// use kube::{Api, Client};
/// use dnsman::crd::DNSProvider;
/// use dnsman::reconcilers::retry::retry_api_call;
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = Client::try_default().await?;
/// let api: Api<DNSProvider> = Api::namespaced(client, "default");
/// let providers = retry_api_call(
///     || async { api.list(&Default::default()).await },
///     "list providers in default",
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_api_call<T, F, Fut>(mut operation: F, what: &str) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, kube::Error>>,
{
    let mut backoff = Backoff::default();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = what, attempt, "API call succeeded after retries");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable_error(&err) {
            return Err(err.into());
        }
        let Some(delay) = backoff.next_delay() else {
            error!(operation = what, attempt, error = %err, "Giving up on API call");
            return Err(anyhow!("giving up on {what} after {attempt} attempts: {err}"));
        };
        warn!(operation = what, attempt, retry_after = ?delay, error = %err, "API call failed, retrying");
        tokio::time::sleep(delay).await;
    }
}

/// Returns true for 429, 5xx and connection errors.
fn is_retryable_error(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(response) => response.code == 429 || (500..600).contains(&response.code),
        kube::Error::Service(_) => true,
        _ => false,
    }
}

/// Returns true if the error is a 404 from the API server.
#[must_use]
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<kube::Error>()
        .is_some_and(|e| matches!(e, kube::Error::Api(response) if response.code == 404))
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
