//! Bounded exponential backoff for calls to external providers.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tokio::time::Instant;

/// Errors that know whether a provider call is worth replaying.
pub trait TransientError {
    fn is_transient(&self) -> bool;

    /// Delay requested by the provider (e.g. a `Retry-After` header). Takes
    /// precedence over the computed backoff.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Replays after the first attempt.
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    /// No replay is scheduled once this much time has passed since the first attempt.
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
            max_elapsed: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            .with_multiplier(self.multiplier)
            .with_max_elapsed_time(Some(self.max_elapsed))
            .build()
    }
}

/// Runs `op` until it succeeds, fails permanently, or the policy's attempt or
/// time budget is spent. The last error is returned in the latter two cases.
pub async fn retry_transient<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: TransientError + fmt::Display,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;

    backoff::future::retry_notify(
        policy.backoff(),
        || {
            attempt += 1;
            let current = attempt;
            let call = op();
            async move {
                call.await.map_err(|err| {
                    let within_budget =
                        current <= policy.max_retries && started.elapsed() < policy.max_elapsed;
                    if err.is_transient() && within_budget {
                        backoff::Error::Transient {
                            retry_after: err.retry_after(),
                            err,
                        }
                    } else {
                        if err.is_transient() {
                            tracing::warn!(operation, attempts = current, "Retry budget exhausted");
                        }
                        backoff::Error::Permanent(err)
                    }
                })
            }
        },
        |err: E, delay: Duration| {
            tracing::warn!(
                operation,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "Transient failure, retrying"
            );
        },
    )
    .await
}
