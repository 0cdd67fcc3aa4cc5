use serde::{Deserialize, Serialize};

use super::{SearchJob, SearchJobStatus};

/// Snapshot of the in-process rate-limited queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    /// Entries waiting to run (entries sleeping through a backoff are not counted)
    pub queue_length: usize,
    /// Whether a drain loop is currently running
    pub processing: bool,
    /// Operation starts inside the trailing window
    pub requests_in_window: usize,
    /// Whether another operation could start right now
    pub can_make_request: bool,
}

/// Record counts by status across the whole durable queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
}

impl QueueStats {
    /// Aggregate from a sequence of statuses
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = SearchJobStatus>,
    {
        statuses.into_iter().fold(Self::default(), |mut stats, status| {
            stats.record(status, 1);
            stats
        })
    }

    /// Add `count` records of `status`
    pub fn record(&mut self, status: SearchJobStatus, count: u64) {
        match status {
            SearchJobStatus::Pending => self.pending += count,
            SearchJobStatus::Processing => self.processing += count,
            SearchJobStatus::Completed => self.completed += count,
            SearchJobStatus::Failed => self.failed += count,
        }
        self.total += count;
    }
}

/// Result of one `process_queue_item` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ItemOutcome {
    Completed { results_count: u32 },
    /// Failed, back to pending
    Retrying { retry_count: u32 },
    /// Failed, terminal
    Failed { retry_count: u32 },
    /// Another drainer claimed the record first
    Skipped,
}

impl ItemOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Totals returned by one `process_queue` drain.
///
/// `processed` counts records that reached a terminal state during the drain,
/// so a record retried twice before completing contributes once to `processed`
/// and twice to `retried`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub processed: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
}

impl ProcessSummary {
    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Completed { .. } => self.completed += 1,
            ItemOutcome::Failed { .. } => self.failed += 1,
            ItemOutcome::Retrying { .. } => self.retried += 1,
            ItemOutcome::Skipped => {}
        }
        if outcome.is_terminal() {
            self.processed += 1;
        }
    }
}

/// Filter for listing durable records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    pub user_id: Option<String>,
    pub status: Option<SearchJobStatus>,
    pub limit: usize,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            user_id: None,
            status: None,
            limit: 50,
        }
    }
}

impl JobFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: SearchJobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn matches(&self, job: &SearchJob) -> bool {
        self.user_id.as_ref().map_or(true, |user| &job.user_id == user)
            && self.status.map_or(true, |status| job.status == status)
    }
}

/// Outcome of a full enqueue → drain → stats cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub enqueued: usize,
    pub summary: ProcessSummary,
    pub stats: QueueStats,
}
