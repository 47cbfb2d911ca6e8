//! In-process queue that serializes calls to a rate-limited provider.
//!
//! A single worker task runs submitted calls one after another. Every attempt,
//! retries included, waits until `min_interval` has passed since the previous
//! attempt started. Throttling responses are replayed through [`retry_transient`]
//! with the provider's delay when it gives one. A call that has been queued is
//! never cancelled: it runs until it succeeds or exhausts its retry budget.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::{sleep_until, Instant};

use super::retry::{retry_transient, RetryPolicy, TransientError};

#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    pub min_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        // Resend allows two requests per second on the default plan.
        Self {
            min_interval: Duration::from_millis(500),
            retry: RetryPolicy {
                max_retries: 5,
                initial_interval: Duration::from_secs(1),
                max_interval: Duration::from_secs(30),
                multiplier: 2.0,
                max_elapsed: Duration::from_secs(120),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum QueueError<E> {
    #[error("rate-limited queue is closed")]
    Closed,
    #[error(transparent)]
    Failed(E),
}

type Job = Box<dyn FnOnce(Pacer) -> BoxFuture<'static, ()> + Send>;

#[derive(Clone)]
struct Pacer {
    min_interval: Duration,
    last_start: Arc<Mutex<Option<Instant>>>,
}

impl Pacer {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_start: Arc::new(Mutex::new(None)),
        }
    }

    async fn wait_turn(&self) {
        let mut last_start = self.last_start.lock().await;
        if let Some(previous) = *last_start {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                sleep_until(ready_at).await;
            }
        }
        *last_start = Some(Instant::now());
    }
}

#[derive(Clone)]
pub struct RateLimitedQueue {
    jobs: mpsc::UnboundedSender<Job>,
    retry: RetryPolicy,
}

impl RateLimitedQueue {
    /// Starts the worker on the current tokio runtime.
    pub fn spawn(config: ThrottleConfig) -> Self {
        let (jobs, mut pending) = mpsc::unbounded_channel::<Job>();
        let pacer = Pacer::new(config.min_interval);

        tokio::spawn(async move {
            while let Some(job) = pending.recv().await {
                job(pacer.clone()).await;
            }
            tracing::debug!("Rate-limited queue worker stopped");
        });

        Self {
            jobs,
            retry: config.retry,
        }
    }

    /// Queues `op` behind every call submitted before it and waits for its result.
    pub async fn submit<T, E, F, Fut>(
        &self,
        operation: &'static str,
        op: F,
    ) -> Result<T, QueueError<E>>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: TransientError + fmt::Display + Send + 'static,
    {
        let (done, result) = oneshot::channel();
        let policy = self.retry;

        let job: Job = Box::new(move |pacer: Pacer| {
            Box::pin(async move {
                let mut op = op;
                let outcome = retry_transient(&policy, operation, || {
                    let pacer = pacer.clone();
                    let call = op();
                    async move {
                        pacer.wait_turn().await;
                        call.await
                    }
                })
                .await;
                // The submitter may have gone away; the call still ran to completion.
                let _ = done.send(outcome);
            })
        });

        self.jobs.send(job).map_err(|_| QueueError::Closed)?;
        result
            .await
            .map_err(|_| QueueError::Closed)?
            .map_err(QueueError::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Error)]
    enum ProviderError {
        #[error("rate limited")]
        RateLimited(Option<Duration>),
        #[error("invalid recipient")]
        Invalid,
    }

    impl TransientError for ProviderError {
        fn is_transient(&self) -> bool {
            matches!(self, ProviderError::RateLimited(_))
        }

        fn retry_after(&self) -> Option<Duration> {
            match self {
                ProviderError::RateLimited(delay) => *delay,
                ProviderError::Invalid => None,
            }
        }
    }

    fn config(min_interval_ms: u64, max_retries: u32) -> ThrottleConfig {
        ThrottleConfig {
            min_interval: Duration::from_millis(min_interval_ms),
            retry: RetryPolicy {
                max_retries,
                initial_interval: Duration::from_millis(1),
                max_interval: Duration::from_millis(10),
                multiplier: 2.0,
                max_elapsed: Duration::from_secs(5),
            },
        }
    }

    #[tokio::test]
    async fn spaces_consecutive_calls_by_min_interval() {
        let queue = RateLimitedQueue::spawn(config(60, 0));
        let starts = Arc::new(std::sync::Mutex::new(Vec::new()));

        let record = |label: &'static str| {
            let starts = starts.clone();
            move || {
                let starts = starts.clone();
                async move {
                    starts.lock().unwrap().push((label, Instant::now()));
                    Ok::<_, ProviderError>(label)
                }
            }
        };

        let (first, second) = tokio::join!(
            queue.submit("first", record("first")),
            queue.submit("second", record("second")),
        );
        assert_eq!(first.unwrap(), "first");
        assert_eq!(second.unwrap(), "second");

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[0].0, "first");
        assert!(starts[1].1.duration_since(starts[0].1) >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn replays_throttled_calls() {
        let queue = RateLimitedQueue::spawn(config(1, 3));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = queue
            .submit("send", move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ProviderError::RateLimited(Some(Duration::from_millis(20))))
                    } else {
                        Ok("msg_1")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "msg_1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn surfaces_terminal_failure_after_budget() {
        let queue = RateLimitedQueue::spawn(config(1, 2));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = queue
            .submit("send", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::RateLimited(None)) }
            })
            .await;

        assert!(matches!(result, Err(QueueError::Failed(ProviderError::RateLimited(_)))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_skip_the_retry_budget() {
        let queue = RateLimitedQueue::spawn(config(1, 5));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = queue
            .submit("send", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Invalid) }
            })
            .await;

        assert!(matches!(result, Err(QueueError::Failed(ProviderError::Invalid))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
