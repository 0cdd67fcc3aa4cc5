use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::sync::oneshot;

use crate::error::RateLimitedError;
use crate::types::EntryId;

/// Type-erased unit of work held by the queue.
///
/// The concrete result type stays with the caller; the drain loop only learns
/// whether an attempt succeeded.
#[async_trait]
pub(crate) trait Operation: Send {
    /// Run one attempt. On success the caller is settled immediately; on
    /// failure (error or panic) the cause is kept for a later `reject` and its
    /// message returned.
    async fn attempt(&mut self) -> Result<(), String>;

    /// Settle the caller with the last error after the final attempt.
    fn reject(self: Box<Self>, attempts: u32);
}

type Settle<T, E> = oneshot::Sender<Result<T, RateLimitedError<E>>>;

/// Why the most recent attempt failed
enum Failure<E> {
    Error(E),
    Panic(String),
}

/// Caller-side half of an entry: the re-invokable operation plus its settle handle
pub(crate) struct Deferred<F, T, E> {
    operation: F,
    last_failure: Option<Failure<E>>,
    settle: Option<Settle<T, E>>,
}

impl<F, T, E> Deferred<F, T, E> {
    pub(crate) fn new(operation: F, settle: Settle<T, E>) -> Self {
        Self {
            operation,
            last_failure: None,
            settle: Some(settle),
        }
    }
}

#[async_trait]
impl<F, Fut, T, E> Operation for Deferred<F, T, E>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    async fn attempt(&mut self) -> Result<(), String> {
        let run = AssertUnwindSafe(async { (self.operation)().await });

        match run.catch_unwind().await {
            Ok(Ok(value)) => {
                if let Some(settle) = self.settle.take() {
                    // The caller may have stopped waiting; nothing to do then.
                    let _ = settle.send(Ok(value));
                }
                Ok(())
            }
            Ok(Err(error)) => {
                let message = error.to_string();
                self.last_failure = Some(Failure::Error(error));
                Err(message)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.last_failure = Some(Failure::Panic(message.clone()));
                Err(format!("operation panicked: {}", message))
            }
        }
    }

    fn reject(mut self: Box<Self>, attempts: u32) {
        let outcome = match self.last_failure.take() {
            Some(Failure::Error(error)) => RateLimitedError::Exhausted { attempts, error },
            Some(Failure::Panic(message)) => RateLimitedError::Panicked { attempts, message },
            None => RateLimitedError::Abandoned,
        };
        if let Some(settle) = self.settle.take() {
            let _ = settle.send(Err(outcome));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// One submitted operation and its retry bookkeeping
pub(crate) struct QueueEntry {
    pub(crate) id: EntryId,
    pub(crate) owner_id: String,
    pub(crate) operation: Box<dyn Operation>,
    pub(crate) retry_count: u32,
    pub(crate) max_retries: u32,
    pub(crate) created_at: DateTime<Utc>,
}

impl QueueEntry {
    pub(crate) fn new(owner_id: String, operation: Box<dyn Operation>, max_retries: u32) -> Self {
        Self {
            id: EntryId::new(&owner_id),
            owner_id,
            operation,
            retry_count: 0,
            max_retries,
            created_at: Utc::now(),
        }
    }

    /// Total attempts made so far
    pub(crate) fn attempts(&self) -> u32 {
        self.retry_count + 1
    }
}

impl fmt::Debug for QueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueEntry")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .field("retry_count", &self.retry_count)
            .field("max_retries", &self.max_retries)
            .field("created_at", &self.created_at)
            .finish()
    }
}
