use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Infrastructure errors for queue operations.
///
/// These are never retried: a missing record or an unreachable store will not
/// heal by running the same search again.
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Owner lookup failed: {0}")]
    OwnerLookup(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Search execution outcome - determines retry behavior
#[derive(Error, Debug, Clone)]
pub enum JobError {
    /// Retryable error - will schedule retry if attempts remain
    #[error("Retryable error: {0}")]
    Retryable(String),

    /// Permanent error - fail immediately, no retry
    #[error("Permanent error: {0}")]
    Permanent(String),
}

impl JobError {
    /// Create a retryable error
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    /// Create a permanent error
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Permanent(msg) => msg,
        }
    }
}

/// Terminal outcome of an operation submitted to the rate-limited queue.
#[derive(Error, Debug)]
pub enum RateLimitedError<E> {
    /// Every attempt failed; carries the error from the last one.
    #[error("operation failed after {attempts} attempts: {error}")]
    Exhausted { attempts: u32, error: E },

    /// The final attempt panicked; carries the panic message.
    #[error("operation panicked after {attempts} attempts: {message}")]
    Panicked { attempts: u32, message: String },

    /// The queue was torn down before the operation settled.
    #[error("rate-limited queue dropped the operation before it settled")]
    Abandoned,
}

impl<E> RateLimitedError<E> {
    /// The last error returned by the operation, if it ran at all.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Exhausted { error, .. } => Some(error),
            Self::Panicked { .. } | Self::Abandoned => None,
        }
    }

    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Panicked { attempts, .. } => *attempts,
            Self::Abandoned => 0,
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
