use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{
    QueueResult, QueueError, QueueStats, JobFilter, JobId, SearchJob, SearchJobStatus,
    backend::SearchJobStore,
};

/// Stored record plus its insertion sequence for stable FIFO ties
#[derive(Debug, Clone)]
struct StoredJob {
    seq: u64,
    job: SearchJob,
}

#[derive(Debug, Default)]
struct Tables {
    jobs: HashMap<JobId, StoredJob>,
    next_seq: u64,
}

/// In-memory store for testing and development
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.tables.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records in insertion order
    pub fn snapshot(&self) -> Vec<SearchJob> {
        let tables = self.tables.read();
        let mut stored: Vec<&StoredJob> = tables.jobs.values().collect();
        stored.sort_by_key(|s| s.seq);
        stored.into_iter().map(|s| s.job.clone()).collect()
    }
}

#[async_trait]
impl SearchJobStore for MemoryStore {
    async fn insert_many(&self, jobs: Vec<SearchJob>) -> QueueResult<Vec<JobId>> {
        let mut tables = self.tables.write();

        // Reject the whole batch before touching the table
        let mut seen = HashSet::with_capacity(jobs.len());
        for job in &jobs {
            if tables.jobs.contains_key(&job.id) || !seen.insert(&job.id) {
                return Err(QueueError::Storage(format!("Duplicate job id: {}", job.id)));
            }
        }

        let mut ids = Vec::with_capacity(jobs.len());
        for job in jobs {
            let seq = tables.next_seq;
            tables.next_seq += 1;
            ids.push(job.id.clone());
            tables.jobs.insert(job.id.clone(), StoredJob { seq, job });
        }

        Ok(ids)
    }

    async fn oldest_pending(&self) -> QueueResult<Option<SearchJob>> {
        let tables = self.tables.read();

        Ok(tables
            .jobs
            .values()
            .filter(|s| s.job.status == SearchJobStatus::Pending)
            .min_by_key(|s| (s.job.created_at, s.seq))
            .map(|s| s.job.clone()))
    }

    async fn claim(&self, job_id: &JobId) -> QueueResult<Option<SearchJob>> {
        let mut tables = self.tables.write();

        let stored = tables
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;

        // Check-and-set under the write lock
        if stored.job.status != SearchJobStatus::Pending {
            return Ok(None);
        }

        stored.job.start_processing()?;
        Ok(Some(stored.job.clone()))
    }

    async fn update(&self, job: &SearchJob) -> QueueResult<()> {
        let mut tables = self.tables.write();

        let stored = tables
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| QueueError::JobNotFound(job.id.to_string()))?;

        stored.job = job.clone();
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> QueueResult<SearchJob> {
        let tables = self.tables.read();

        tables
            .jobs
            .get(job_id)
            .map(|s| s.job.clone())
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))
    }

    async fn list(&self, filter: &JobFilter) -> QueueResult<Vec<SearchJob>> {
        let tables = self.tables.read();

        let mut matching: Vec<&StoredJob> = tables
            .jobs
            .values()
            .filter(|s| filter.matches(&s.job))
            .collect();
        matching.sort_by(|a, b| {
            b.job
                .created_at
                .cmp(&a.job.created_at)
                .then(b.seq.cmp(&a.seq))
        });

        Ok(matching
            .into_iter()
            .take(filter.limit)
            .map(|s| s.job.clone())
            .collect())
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let tables = self.tables.read();
        Ok(QueueStats::from_statuses(
            tables.jobs.values().map(|s| s.job.status),
        ))
    }

    async fn purge_completed_before(&self, cutoff: DateTime<Utc>) -> QueueResult<u64> {
        let mut tables = self.tables.write();
        let before = tables.jobs.len();

        tables.jobs.retain(|_, s| {
            !(s.job.status == SearchJobStatus::Completed
                && s.job.completed_at.map_or(false, |at| at < cutoff))
        });

        Ok((before - tables.jobs.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_job(agent_id: &str) -> SearchJob {
        SearchJob::new(agent_id, "topic", "user", 3)
    }

    #[tokio::test]
    async fn test_insert_then_oldest_pending() {
        let store = MemoryStore::new();
        let first = create_test_job("agent-1");
        let second = create_test_job("agent-2");

        let ids = store.insert_many(vec![first.clone(), second]).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], first.id);

        let pending = store.oldest_pending().await.unwrap().unwrap();
        assert_eq!(pending.id, first.id);
    }

    #[tokio::test]
    async fn test_claim_is_check_and_set() {
        let store = MemoryStore::new();
        let job = create_test_job("agent-1");
        store.insert_many(vec![job.clone()]).await.unwrap();

        let claimed = store.claim(&job.id).await.unwrap().unwrap();
        assert_eq!(claimed.status, SearchJobStatus::Processing);
        assert!(claimed.started_at.is_some());

        // Second claim loses
        assert!(store.claim(&job.id).await.unwrap().is_none());
        assert!(store.oldest_pending().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_rejected() {
        let store = MemoryStore::new();
        let job = create_test_job("agent-1");

        store.insert_many(vec![job.clone()]).await.unwrap();
        let result = store.insert_many(vec![job]).await;

        assert!(matches!(result, Err(QueueError::Storage(_))));
    }

    #[tokio::test]
    async fn test_rejected_batch_inserts_nothing() {
        let store = MemoryStore::new();
        let existing = create_test_job("agent-1");
        store.insert_many(vec![existing.clone()]).await.unwrap();

        let fresh = create_test_job("agent-2");
        let result = store.insert_many(vec![fresh.clone(), existing]).await;

        assert!(matches!(result, Err(QueueError::Storage(_))));
        assert_eq!(store.len(), 1);
        assert!(matches!(store.get(&fresh.id).await, Err(QueueError::JobNotFound(_))));

        // Duplicates inside one batch are rejected too
        let repeated = create_test_job("agent-3");
        let result = store.insert_many(vec![repeated.clone(), repeated]).await;
        assert!(matches!(result, Err(QueueError::Storage(_))));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_job() {
        let store = MemoryStore::new();
        let job = create_test_job("agent-1");

        let result = store.update(&job).await;
        assert!(matches!(result, Err(QueueError::JobNotFound(_))));
    }
}
