use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::JobId;
use crate::{QueueError, QueueResult};

/// Durable search job lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchJobStatus {
    /// Waiting to be picked by the drain loop
    Pending,

    /// Claimed by a drainer, search in flight
    Processing,

    /// Search succeeded
    Completed,

    /// Retries exhausted or permanent error
    Failed,
}

impl SearchJobStatus {
    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Get the status name as stored by backends
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn all() -> &'static [SearchJobStatus] {
        &[Self::Pending, Self::Processing, Self::Completed, Self::Failed]
    }
}

impl fmt::Display for SearchJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid search job status: {}", s)),
        }
    }
}

/// What a failure transition did to the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Back to pending, eligible for the next pick
    WillRetry,
    /// Terminal
    Exhausted,
}

/// Persisted search job, one per owner per enqueue batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchJob {
    pub id: JobId,
    pub agent_id: String,
    pub topic_id: String,
    pub user_id: String,
    pub status: SearchJobStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Last failure reason, overwritten by each failure
    pub error_message: Option<String>,
    /// Set on completion only
    pub results_count: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SearchJob {
    /// Create a pending job for an owner
    pub fn new(
        agent_id: impl Into<String>,
        topic_id: impl Into<String>,
        user_id: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: JobId::new(),
            agent_id: agent_id.into(),
            topic_id: topic_id.into(),
            user_id: user_id.into(),
            status: SearchJobStatus::Pending,
            retry_count: 0,
            max_retries,
            error_message: None,
            results_count: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Claim for processing. Only a pending job can be claimed.
    pub fn start_processing(&mut self) -> QueueResult<()> {
        self.ensure_status(SearchJobStatus::Pending, SearchJobStatus::Processing)?;

        let now = Utc::now();
        self.status = SearchJobStatus::Processing;
        self.started_at = Some(now);
        self.completed_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Complete the job successfully
    pub fn complete(&mut self, results_count: u32) -> QueueResult<()> {
        self.ensure_status(SearchJobStatus::Processing, SearchJobStatus::Completed)?;

        let now = Utc::now();
        self.status = SearchJobStatus::Completed;
        self.results_count = Some(results_count);
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Count a failed attempt and either re-queue or terminate.
    ///
    /// Re-queues while `retry_count < max_retries` after the increment.
    pub fn record_failure(&mut self, error: impl Into<String>) -> QueueResult<FailureDisposition> {
        self.ensure_status(SearchJobStatus::Processing, SearchJobStatus::Pending)?;

        self.retry_count += 1;
        if self.retry_count < self.max_retries {
            self.error_message = Some(error.into());
            self.status = SearchJobStatus::Pending;
            self.completed_at = None;
            self.updated_at = Utc::now();
            Ok(FailureDisposition::WillRetry)
        } else {
            self.terminate(error.into());
            Ok(FailureDisposition::Exhausted)
        }
    }

    /// Count a failed attempt and terminate regardless of remaining retries
    pub fn fail_permanently(&mut self, error: impl Into<String>) -> QueueResult<()> {
        self.ensure_status(SearchJobStatus::Processing, SearchJobStatus::Failed)?;

        self.retry_count += 1;
        self.terminate(error.into());
        Ok(())
    }

    /// Check if the job can still be retried after one more failure
    pub fn can_retry(&self) -> bool {
        self.retry_count + 1 < self.max_retries && !self.status.is_terminal()
    }

    fn terminate(&mut self, error: String) {
        let now = Utc::now();
        self.status = SearchJobStatus::Failed;
        self.error_message = Some(error);
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    fn ensure_status(&self, expected: SearchJobStatus, to: SearchJobStatus) -> QueueResult<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(QueueError::InvalidTransition {
                job_id: self.id.to_string(),
                from: self.status.as_str(),
                to: to.as_str(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processing_job(retry_count: u32, max_retries: u32) -> SearchJob {
        let mut job = SearchJob::new("agent-1", "topic-1", "user-1", max_retries);
        job.retry_count = retry_count;
        job.start_processing().unwrap();
        job
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = SearchJob::new("agent-1", "topic-1", "user-1", 3);

        assert_eq!(job.status, SearchJobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_processing_sets_started_at() {
        let job = processing_job(0, 3);

        assert_eq!(job.status, SearchJobStatus::Processing);
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_failure_with_retries_left_reverts_to_pending() {
        let mut job = processing_job(1, 3);

        let disposition = job.record_failure("gemini quota exceeded").unwrap();

        assert_eq!(disposition, FailureDisposition::WillRetry);
        assert_eq!(job.status, SearchJobStatus::Pending);
        assert_eq!(job.retry_count, 2);
        assert!(job.completed_at.is_none());
        assert_eq!(job.error_message.as_deref(), Some("gemini quota exceeded"));
    }

    #[test]
    fn test_last_failure_is_terminal() {
        let mut job = processing_job(2, 3);

        let disposition = job.record_failure("gemini quota exceeded").unwrap();

        assert_eq!(disposition, FailureDisposition::Exhausted);
        assert_eq!(job.status, SearchJobStatus::Failed);
        assert_eq!(job.retry_count, 3);
        assert!(job.completed_at.is_some());
        assert!(job.error_message.is_some());
    }

    #[test]
    fn test_complete_records_results() {
        let mut job = processing_job(0, 3);
        job.complete(12).unwrap();

        assert_eq!(job.status, SearchJobStatus::Completed);
        assert_eq!(job.results_count, Some(12));
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_permanent_failure_skips_retries() {
        let mut job = processing_job(0, 3);
        job.fail_permanently("agent not found").unwrap();

        assert_eq!(job.status, SearchJobStatus::Failed);
        assert_eq!(job.retry_count, 1);
    }

    #[test]
    fn test_invalid_transitions_are_rejected() {
        let mut pending = SearchJob::new("agent-1", "topic-1", "user-1", 3);
        assert!(matches!(
            pending.complete(1),
            Err(QueueError::InvalidTransition { from: "pending", to: "completed", .. })
        ));

        let mut done = processing_job(0, 3);
        done.complete(1).unwrap();
        assert!(done.start_processing().is_err());
        assert!(done.record_failure("late").is_err());
    }

    #[test]
    fn test_status_round_trips_through_strings() {
        for status in SearchJobStatus::all() {
            assert_eq!(status.as_str().parse::<SearchJobStatus>().unwrap(), *status);
        }
        assert!("cancelled".parse::<SearchJobStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&SearchJobStatus::Processing).unwrap(),
            "\"processing\""
        );
    }
}
