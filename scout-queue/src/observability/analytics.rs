use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use super::LiveMetrics;
use crate::{JobEvent, JobId};

const EVENT_CAPACITY: usize = 1024;

/// Fan-out of durable job events plus live counters
#[derive(Clone)]
pub struct ObservabilityLayer {
    event_broadcaster: broadcast::Sender<JobEvent>,
    metrics: Arc<LiveMetrics>,
}

impl ObservabilityLayer {
    pub fn new() -> Self {
        let (event_broadcaster, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            event_broadcaster,
            metrics: Arc::new(LiveMetrics::new()),
        }
    }

    pub fn record_job_enqueued(&self, job_id: &JobId, agent_id: &str) {
        self.publish(JobEvent::Enqueued {
            job_id: job_id.clone(),
            agent_id: agent_id.to_string(),
            at: Utc::now(),
        });
        self.metrics.increment_jobs_enqueued(agent_id);
        debug!("Recorded job enqueued: {} ({})", job_id, agent_id);
    }

    pub fn record_job_claimed(&self, job_id: &JobId) {
        self.publish(JobEvent::Claimed {
            job_id: job_id.clone(),
            at: Utc::now(),
        });
        self.metrics.increment_jobs_claimed();
    }

    pub fn record_job_completed(
        &self,
        job_id: &JobId,
        agent_id: &str,
        results_count: u32,
        elapsed: Duration,
    ) {
        self.publish(JobEvent::Completed {
            job_id: job_id.clone(),
            results_count,
            at: Utc::now(),
        });
        self.metrics.increment_jobs_completed(agent_id, elapsed);
        debug!("Recorded job completed: {} ({})", job_id, agent_id);
    }

    pub fn record_job_retrying(&self, job_id: &JobId, agent_id: &str, retry_count: u32, error: &str) {
        self.publish(JobEvent::Retrying {
            job_id: job_id.clone(),
            retry_count,
            error: error.to_string(),
            at: Utc::now(),
        });
        self.metrics.increment_jobs_retried(agent_id);
        debug!("Recorded job retrying: {} ({})", job_id, agent_id);
    }

    pub fn record_job_failed(&self, job_id: &JobId, agent_id: &str, error: &str) {
        self.publish(JobEvent::Failed {
            job_id: job_id.clone(),
            error: error.to_string(),
            at: Utc::now(),
        });
        self.metrics.increment_jobs_failed(agent_id);
        debug!("Recorded job failed: {} ({})", job_id, agent_id);
    }

    pub fn record_drain(&self) {
        self.metrics.increment_drains();
    }

    // No subscribers is not an error
    fn publish(&self, event: JobEvent) {
        let _ = self.event_broadcaster.send(event);
    }

    /// Raw receiver for job events
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_broadcaster.subscribe()
    }

    /// Job events as a stream; lagged receivers yield an error item and continue
    pub fn event_stream(&self) -> BroadcastStream<JobEvent> {
        BroadcastStream::new(self.subscribe())
    }

    pub fn metrics(&self) -> &LiveMetrics {
        &self.metrics
    }
}

impl Default for ObservabilityLayer {
    fn default() -> Self {
        Self::new()
    }
}
