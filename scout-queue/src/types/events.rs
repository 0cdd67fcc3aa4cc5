use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobId;

/// Durable job transitions published for observers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    /// Job record was created
    Enqueued {
        job_id: JobId,
        agent_id: String,
        at: DateTime<Utc>,
    },

    /// Job was claimed by the drain loop
    Claimed {
        job_id: JobId,
        at: DateTime<Utc>,
    },

    /// Search failed, job went back to pending
    Retrying {
        job_id: JobId,
        retry_count: u32,
        error: String,
        at: DateTime<Utc>,
    },

    /// Search completed
    Completed {
        job_id: JobId,
        results_count: u32,
        at: DateTime<Utc>,
    },

    /// Job failed permanently
    Failed {
        job_id: JobId,
        error: String,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::Claimed { .. } => "claimed",
            Self::Retrying { .. } => "retrying",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    /// Get the job ID from any event
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Enqueued { job_id, .. }
            | Self::Claimed { job_id, .. }
            | Self::Retrying { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. } => job_id,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Enqueued { at, .. }
            | Self::Claimed { at, .. }
            | Self::Retrying { at, .. }
            | Self::Completed { at, .. }
            | Self::Failed { at, .. } => at,
        }
    }
}
