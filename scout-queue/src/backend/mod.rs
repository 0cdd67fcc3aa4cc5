#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{JobFilter, JobId, QueueResult, QueueStats, SearchJob};

/// Persistence primitives for durable search jobs.
///
/// Each state transition is a single-record write; no multi-statement
/// transactions are required from the backend.
#[async_trait]
pub trait SearchJobStore: Send + Sync {
    /// Insert new records, returning their ids in input order
    async fn insert_many(&self, jobs: Vec<SearchJob>) -> QueueResult<Vec<JobId>>;

    /// Oldest pending record by creation time (insertion order breaks ties)
    async fn oldest_pending(&self) -> QueueResult<Option<SearchJob>>;

    /// Atomically move a pending record to processing.
    ///
    /// Returns `None` when the record is no longer pending, i.e. another
    /// drainer won the claim.
    async fn claim(&self, job_id: &JobId) -> QueueResult<Option<SearchJob>>;

    /// Overwrite the mutable fields of an existing record
    async fn update(&self, job: &SearchJob) -> QueueResult<()>;

    /// Get full record
    async fn get(&self, job_id: &JobId) -> QueueResult<SearchJob>;

    /// Records matching `filter`, newest first
    async fn list(&self, filter: &JobFilter) -> QueueResult<Vec<SearchJob>>;

    /// Record counts by status
    async fn stats(&self) -> QueueResult<QueueStats>;

    /// Delete completed records finished before `cutoff`, returning how many went
    async fn purge_completed_before(&self, cutoff: DateTime<Utc>) -> QueueResult<u64>;
}
