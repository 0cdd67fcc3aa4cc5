//! # scout-queue: rate-limited search scheduling
//!
//! Two cooperating queues keep scheduled web searches inside the LLM provider's
//! request quota:
//!
//! - [`RateLimitedQueue`]: process-wide, in-memory. Admits at most N operation
//!   starts per trailing window and retries failures with exponential backoff.
//! - [`SearchQueue`]: durable records, one per active agent, drained oldest
//!   first through the rate-limited queue with its own retry ceiling.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use scout_queue::prelude::*;
//!
//! struct WebSearch;
//!
//! #[async_trait]
//! impl SearchExecutor for WebSearch {
//!     async fn execute(&self, _agent_id: &str) -> Result<SearchOutcome, JobError> {
//!         Ok(SearchOutcome { total_results: 3 })
//!     }
//! }
//!
//! # async fn run() -> QueueResult<()> {
//! let limiter = RateLimitedQueue::new(RateLimitConfig::default());
//! let directory = MemoryDirectory::new()
//!     .with_active(vec![Owner::new("agent-1", "topic-1", "user-1")]);
//!
//! let queue = SearchQueue::new(MemoryStore::new(), Arc::new(directory), Arc::new(WebSearch), limiter);
//! let report = queue.run_cycle(&["agent-1".to_string()]).await?;
//! assert_eq!(report.summary.completed, 1);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod backend;
pub mod config;
pub mod error;
pub mod limiter;
pub mod observability;
pub mod search;
pub mod types;

// Core API exports
pub use adapter::SearchQueue;
pub use config::{RateLimitConfig, SearchQueueConfig};
pub use error::{JobError, QueueError, QueueResult, RateLimitedError};
pub use limiter::RateLimitedQueue;
pub use search::{MemoryDirectory, Owner, OwnerDirectory, SearchExecutor, SearchOutcome};
pub use types::{
    CycleReport, EntryId, FailureDisposition, ItemOutcome, JobEvent, JobFilter, JobId,
    ProcessSummary, QueueStats, QueueStatus, SearchJob, SearchJobStatus,
};
pub use backend::SearchJobStore;

// Observability exports
pub use observability::{LiveMetrics, ObservabilityLayer};

// Backend implementations
#[cfg(feature = "memory")]
pub use backend::memory::MemoryStore;

#[cfg(feature = "postgres")]
pub use backend::postgres::PostgresStore;

pub mod prelude {
    pub use crate::{
        JobError, Owner, OwnerDirectory, QueueError, QueueResult, RateLimitConfig,
        RateLimitedError, RateLimitedQueue, SearchExecutor, SearchJob, SearchJobStatus,
        SearchJobStore, SearchOutcome, SearchQueue, SearchQueueConfig, MemoryDirectory,
    };

    #[cfg(feature = "memory")]
    pub use crate::MemoryStore;

    pub use async_trait::async_trait;
}
