//! In-process rate-limited queue for calls to the LLM provider.
//!
//! Every operation submitted through [`RateLimitedQueue::add`] runs on a single
//! drain loop that admits at most `max_requests_per_window` starts inside any
//! trailing `window`. Failed operations are retried with exponential backoff
//! and go back to the head of the queue, ahead of work that has not run yet.

mod entry;
mod window;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::RateLimitConfig;
use crate::error::RateLimitedError;
use crate::types::QueueStatus;

use entry::{Deferred, QueueEntry};
use window::RequestWindow;

/// Handle to the process-wide rate-limited queue.
///
/// Build one at startup and clone the handle into every caller; clones share
/// the same entry list, request window and drain loop.
#[derive(Clone)]
pub struct RateLimitedQueue {
    inner: Arc<Inner>,
}

struct Inner {
    config: RateLimitConfig,
    state: Mutex<LimiterState>,
}

struct LimiterState {
    entries: VecDeque<QueueEntry>,
    processing: bool,
    window: RequestWindow,
}

enum Step {
    Wait(Duration),
    Run(QueueEntry),
}

/// Hands the queue to a fresh drain loop if the current one unwinds
struct DrainGuard(Arc<Inner>);

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut state = self.0.state.lock();
            state.processing = false;
            if !state.entries.is_empty() {
                self.0.ensure_draining(&mut state);
            }
        }
    }
}

impl RateLimitedQueue {
    pub fn new(config: RateLimitConfig) -> Self {
        let window = RequestWindow::new(config.max_requests_per_window, config.window);

        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(LimiterState {
                    entries: VecDeque::new(),
                    processing: false,
                    window,
                }),
            }),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.inner.config
    }

    /// Submit an operation with the configured default retry ceiling
    pub async fn add<T, E, F, Fut>(
        &self,
        owner_id: impl Into<String>,
        operation: F,
    ) -> Result<T, RateLimitedError<E>>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let max_retries = self.inner.config.default_max_retries;
        self.add_with_retries(owner_id, operation, max_retries).await
    }

    /// Submit an operation and wait for it to settle.
    ///
    /// Resolves with the operation's own value, or with
    /// [`RateLimitedError::Exhausted`] holding the last error once
    /// `max_retries` retries have failed too.
    pub async fn add_with_retries<T, E, F, Fut>(
        &self,
        owner_id: impl Into<String>,
        operation: F,
        max_retries: u32,
    ) -> Result<T, RateLimitedError<E>>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let (settle, settled) = oneshot::channel();
        let entry = QueueEntry::new(
            owner_id.into(),
            Box::new(Deferred::new(operation, settle)),
            max_retries,
        );

        debug!(entry_id = %entry.id, owner_id = %entry.owner_id, "Added entry to rate-limited queue");
        self.inner.push_back(entry);

        settled.await.unwrap_or(Err(RateLimitedError::Abandoned))
    }

    /// Current queue length, drain state and window usage
    pub fn queue_status(&self) -> QueueStatus {
        let mut state = self.inner.state.lock();
        state.window.prune(Instant::now());

        QueueStatus {
            queue_length: state.entries.len(),
            processing: state.processing,
            requests_in_window: state.window.len(),
            can_make_request: state.window.has_capacity(),
        }
    }
}

impl fmt::Debug for RateLimitedQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitedQueue")
            .field("config", &self.inner.config)
            .field("status", &self.queue_status())
            .finish()
    }
}

impl Inner {
    fn push_back(self: &Arc<Self>, entry: QueueEntry) {
        let mut state = self.state.lock();
        state.entries.push_back(entry);
        self.ensure_draining(&mut state);
    }

    fn push_front(self: &Arc<Self>, entry: QueueEntry) {
        let mut state = self.state.lock();
        state.entries.push_front(entry);
        self.ensure_draining(&mut state);
    }

    /// Start the drain loop unless one is already running
    fn ensure_draining(self: &Arc<Self>, state: &mut LimiterState) {
        if !state.processing {
            state.processing = true;
            tokio::spawn(Arc::clone(self).drain());
        }
    }

    async fn drain(self: Arc<Self>) {
        let _guard = DrainGuard(Arc::clone(&self));

        loop {
            let step = {
                let mut state = self.state.lock();
                if state.entries.is_empty() {
                    state.processing = false;
                    return;
                }

                let now = Instant::now();
                state.window.prune(now);
                if state.window.has_capacity() {
                    state.window.record(now);
                    match state.entries.pop_front() {
                        Some(entry) => Step::Run(entry),
                        None => continue,
                    }
                } else {
                    Step::Wait(state.window.wait_time(now) + self.config.wait_buffer)
                }
            };

            match step {
                Step::Wait(delay) => {
                    debug!(wait_ms = delay.as_millis() as u64, "Rate limit reached, waiting");
                    tokio::time::sleep(delay).await;
                }
                Step::Run(entry) => self.run(entry).await,
            }
        }
    }

    async fn run(self: &Arc<Self>, mut entry: QueueEntry) {
        debug!(entry_id = %entry.id, attempt = entry.attempts(), "Processing queue entry");
        let started = Instant::now();

        match entry.operation.attempt().await {
            Ok(()) => {
                debug!(
                    entry_id = %entry.id,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Queue entry completed"
                );
            }
            Err(message) => {
                entry.retry_count += 1;

                if entry.retry_count <= entry.max_retries {
                    let delay = self.config.backoff_delay(entry.retry_count);
                    warn!(
                        entry_id = %entry.id,
                        owner_id = %entry.owner_id,
                        error = %message,
                        "Queue entry failed (attempt {}/{}), retrying in {}ms",
                        entry.retry_count,
                        entry.max_retries,
                        delay.as_millis()
                    );

                    let inner = Arc::clone(self);
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        inner.push_front(entry);
                    });
                } else {
                    error!(
                        entry_id = %entry.id,
                        owner_id = %entry.owner_id,
                        error = %message,
                        "Queue entry failed after {} retries",
                        entry.max_retries
                    );
                    let attempts = entry.retry_count;
                    entry.operation.reject(attempts);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn exploding() -> impl Future<Output = Result<u32, String>> {
        async { panic!("search exploded") }
    }

    fn limiter(max_requests: usize) -> RateLimitedQueue {
        RateLimitedQueue::new(RateLimitConfig {
            max_requests_per_window: max_requests,
            ..RateLimitConfig::default()
        })
    }

    #[tokio::test]
    async fn test_add_resolves_with_operation_value() {
        let queue = limiter(60);

        let value = queue
            .add("test-agent", || async { Ok::<_, String>("success") })
            .await
            .unwrap();

        assert_eq!(value, "success");
    }

    #[tokio::test]
    async fn test_status_reports_window_usage() {
        let queue = limiter(2);
        let initial = queue.queue_status();
        assert_eq!(initial.queue_length, 0);
        assert!(!initial.processing);
        assert!(initial.can_make_request);

        for _ in 0..2 {
            queue.add("agent", || async { Ok::<_, String>(()) }).await.unwrap();
        }

        let status = queue.queue_status();
        assert_eq!(status.requests_in_window, 2);
        assert!(!status.can_make_request);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_fails_after_one_attempt() {
        let queue = limiter(60);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = queue
            .add_with_retries(
                "agent",
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>("boom") }
                },
                0,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RateLimitedError::Exhausted { attempts: 1, error: "boom" })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_loop_resets_after_queue_empties() {
        let queue = limiter(60);

        queue.add("agent", || async { Ok::<_, String>(1) }).await.unwrap();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!queue.queue_status().processing);

        assert_eq!(queue.add("agent", || async { Ok::<_, String>(2) }).await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_operation_does_not_wedge_queue() {
        let queue = limiter(60);

        let result = queue.add_with_retries("agent-a", exploding, 0).await;
        match result {
            Err(RateLimitedError::Panicked { attempts, message }) => {
                assert_eq!(attempts, 1);
                assert_eq!(message, "search exploded");
            }
            other => panic!("expected panicked error, got {:?}", other),
        }

        let next = tokio::time::timeout(
            Duration::from_secs(600),
            queue.add("agent-b", || async { Ok::<_, String>(7) }),
        )
        .await;
        assert_eq!(next.unwrap().unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_goes_through_retry_policy() {
        let queue = limiter(60);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = queue
            .add("agent", move || {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        panic!("transient crash");
                    }
                    Ok::<_, String>("recovered")
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_limit_still_admits_one_start_per_window() {
        let queue = RateLimitedQueue::new(RateLimitConfig {
            max_requests_per_window: 0,
            window: Duration::from_secs(10),
            ..RateLimitConfig::default()
        });
        let started = Instant::now();

        let first = tokio::time::timeout(
            Duration::from_secs(3600),
            queue.add("agent", || async { Ok::<_, String>(1) }),
        )
        .await;
        assert_eq!(first.unwrap().unwrap(), 1);

        queue.add("agent", || async { Ok::<_, String>(2) }).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(queue.queue_status().requests_in_window, 1);
    }
}
