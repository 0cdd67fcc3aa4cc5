use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    backend::SearchJobStore,
    config::SearchQueueConfig,
    limiter::RateLimitedQueue,
    observability::ObservabilityLayer,
    search::{OwnerDirectory, SearchExecutor},
    CycleReport, FailureDisposition, ItemOutcome, JobError, JobFilter, JobId, ProcessSummary,
    QueueResult, QueueStats, QueueStatus, RateLimitedError, SearchJob,
};

/// Durable search-job queue.
///
/// Records are created per active agent, drained oldest first, and every search
/// runs through the shared [`RateLimitedQueue`] so the provider quota is
/// respected across all callers in the process.
pub struct SearchQueue<S: SearchJobStore + ?Sized> {
    store: Arc<S>,
    directory: Arc<dyn OwnerDirectory>,
    executor: Arc<dyn SearchExecutor>,
    limiter: RateLimitedQueue,
    observability: Arc<ObservabilityLayer>,
    config: SearchQueueConfig,
}

impl<S: SearchJobStore + 'static> SearchQueue<S> {
    pub fn new(
        store: S,
        directory: Arc<dyn OwnerDirectory>,
        executor: Arc<dyn SearchExecutor>,
        limiter: RateLimitedQueue,
    ) -> Self {
        Self::from_shared(Arc::new(store), directory, executor, limiter)
    }
}

impl<S: SearchJobStore + ?Sized + 'static> SearchQueue<S> {
    /// Build on a store handle that is shared with other components
    pub fn from_shared(
        store: Arc<S>,
        directory: Arc<dyn OwnerDirectory>,
        executor: Arc<dyn SearchExecutor>,
        limiter: RateLimitedQueue,
    ) -> Self {
        Self {
            store,
            directory,
            executor,
            limiter,
            observability: Arc::new(ObservabilityLayer::new()),
            config: SearchQueueConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SearchQueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_observability(mut self, observability: ObservabilityLayer) -> Self {
        self.observability = Arc::new(observability);
        self
    }

    pub fn config(&self) -> &SearchQueueConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn observability(&self) -> &ObservabilityLayer {
        &self.observability
    }

    /// Status of the shared in-process limiter
    pub fn limiter_status(&self) -> QueueStatus {
        self.limiter.queue_status()
    }

    /// Create one pending record per active owner among `agent_ids`.
    ///
    /// Unknown and inactive agents are skipped; an empty result is not an error.
    #[instrument(skip(self, agent_ids), fields(requested = agent_ids.len()))]
    pub async fn enqueue_agents(&self, agent_ids: &[String]) -> QueueResult<usize> {
        if agent_ids.is_empty() {
            debug!("No agents to enqueue");
            return Ok(0);
        }

        let owners = self.directory.list_active_owners(agent_ids).await?;
        if owners.is_empty() {
            info!("No active agents found to enqueue");
            return Ok(0);
        }

        let jobs: Vec<SearchJob> = owners
            .into_iter()
            .map(|owner| {
                SearchJob::new(owner.agent_id, owner.topic_id, owner.user_id, self.config.max_retries)
            })
            .collect();
        let agents: Vec<String> = jobs.iter().map(|job| job.agent_id.clone()).collect();

        let ids = self.store.insert_many(jobs).await?;
        for (job_id, agent_id) in ids.iter().zip(&agents) {
            self.observability.record_job_enqueued(job_id, agent_id);
        }

        info!(count = ids.len(), "Enqueued search jobs");
        Ok(ids.len())
    }

    /// Oldest pending record, if any
    pub async fn get_next_pending(&self) -> QueueResult<Option<SearchJob>> {
        self.store.oldest_pending().await
    }

    /// Claim `job`, run its search and apply the outcome to the record.
    ///
    /// A record already claimed elsewhere yields [`ItemOutcome::Skipped`].
    /// Search failures are absorbed into the record; only store and transition
    /// errors are returned.
    #[instrument(skip(self, job), fields(job_id = %job.id, agent_id = %job.agent_id))]
    pub async fn process_queue_item(&self, job: &SearchJob) -> QueueResult<ItemOutcome> {
        let Some(mut job) = self.store.claim(&job.id).await? else {
            debug!("Job already claimed, skipping");
            return Ok(ItemOutcome::Skipped);
        };

        self.observability.record_job_claimed(&job.id);
        info!(retry_count = job.retry_count, "Processing search job");
        let started = Instant::now();

        let executor = Arc::clone(&self.executor);
        let agent_id = job.agent_id.clone();
        let result = self
            .limiter
            .add_with_retries(
                job.agent_id.clone(),
                move || {
                    let executor = Arc::clone(&executor);
                    let agent_id = agent_id.clone();
                    async move { executor.execute(&agent_id).await }
                },
                self.config.search_retries,
            )
            .await;

        match result {
            Ok(outcome) => {
                job.complete(outcome.total_results)?;
                self.store.update(&job).await?;

                let elapsed = started.elapsed();
                self.observability.record_job_completed(
                    &job.id,
                    &job.agent_id,
                    outcome.total_results,
                    elapsed,
                );
                info!(
                    results_count = outcome.total_results,
                    duration_ms = elapsed.as_millis() as u64,
                    "Search job completed"
                );

                Ok(ItemOutcome::Completed {
                    results_count: outcome.total_results,
                })
            }
            Err(RateLimitedError::Exhausted { error, .. }) => self.fail(job, error).await,
            Err(RateLimitedError::Panicked { message, .. }) => {
                self.fail(job, JobError::retryable(format!("search panicked: {}", message)))
                    .await
            }
            Err(RateLimitedError::Abandoned) => {
                self.fail(job, JobError::retryable("search was dropped before it settled"))
                    .await
            }
        }
    }

    async fn fail(&self, mut job: SearchJob, error: JobError) -> QueueResult<ItemOutcome> {
        let message = error.message().to_string();

        let disposition = if error.is_retryable() {
            job.record_failure(message.as_str())?
        } else {
            job.fail_permanently(message.as_str())?;
            FailureDisposition::Exhausted
        };
        self.store.update(&job).await?;

        match disposition {
            FailureDisposition::WillRetry => {
                self.observability
                    .record_job_retrying(&job.id, &job.agent_id, job.retry_count, &message);
                warn!(
                    error = %message,
                    "Search job failed (attempt {}/{}), back to pending",
                    job.retry_count,
                    job.max_retries
                );
                Ok(ItemOutcome::Retrying {
                    retry_count: job.retry_count,
                })
            }
            FailureDisposition::Exhausted => {
                self.observability
                    .record_job_failed(&job.id, &job.agent_id, &message);
                error!(
                    error = %message,
                    retry_count = job.retry_count,
                    permanent = !error.is_retryable(),
                    "Search job failed permanently"
                );
                Ok(ItemOutcome::Failed {
                    retry_count: job.retry_count,
                })
            }
        }
    }

    /// Drain every pending record, pacing starts at the configured rate.
    ///
    /// Returns once no pending record remains. Records that go back to pending
    /// compete again until their own retries run out.
    #[instrument(skip(self))]
    pub async fn process_queue(&self) -> QueueResult<ProcessSummary> {
        let interval = self.config.pacing_interval();
        let progress_every = self.config.progress_every.max(1);
        let mut summary = ProcessSummary::default();
        let mut iterations = 0usize;
        let mut last_start: Option<Instant> = None;

        self.observability.record_drain();
        info!("Starting search queue processing");

        while let Some(job) = self.get_next_pending().await? {
            if let Some(previous) = last_start {
                let next_slot = previous + interval;
                if next_slot > Instant::now() {
                    tokio::time::sleep_until(next_slot).await;
                }
            }
            last_start = Some(Instant::now());

            let outcome = self.process_queue_item(&job).await?;
            summary.record(outcome);
            iterations += 1;

            if iterations % progress_every == 0 {
                info!(
                    processed = summary.processed,
                    completed = summary.completed,
                    failed = summary.failed,
                    retried = summary.retried,
                    "Search queue progress"
                );
            }
        }

        info!(
            processed = summary.processed,
            completed = summary.completed,
            failed = summary.failed,
            retried = summary.retried,
            "Search queue processing complete"
        );
        Ok(summary)
    }

    /// Record counts by status
    pub async fn get_queue_stats(&self) -> QueueResult<QueueStats> {
        self.store.stats().await
    }

    /// Records matching `filter`, newest first
    pub async fn list_items(&self, filter: &JobFilter) -> QueueResult<Vec<SearchJob>> {
        self.store.list(filter).await
    }

    pub async fn get_job(&self, job_id: &JobId) -> QueueResult<SearchJob> {
        self.store.get(job_id).await
    }

    /// Delete completed records finished more than `days_old` days ago
    #[instrument(skip(self))]
    pub async fn clear_old_items(&self, days_old: u32) -> QueueResult<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days_old));
        let removed = self.store.purge_completed_before(cutoff).await?;

        info!(removed, %cutoff, "Cleared old search jobs");
        Ok(removed)
    }

    /// Purge with the configured retention
    pub async fn clear_expired(&self) -> QueueResult<u64> {
        self.clear_old_items(self.config.retention_days).await
    }

    /// Enqueue `agent_ids`, drain the queue and report the resulting counts
    #[instrument(skip(self, agent_ids), fields(requested = agent_ids.len()))]
    pub async fn run_cycle(&self, agent_ids: &[String]) -> QueueResult<CycleReport> {
        let enqueued = self.enqueue_agents(agent_ids).await?;
        let summary = self.process_queue().await?;
        let stats = self.get_queue_stats().await?;

        Ok(CycleReport {
            enqueued,
            summary,
            stats,
        })
    }
}
