use std::sync::Arc;
use chrono::{Duration, Utc};

use scout_queue::{
    JobFilter, QueueError, SearchJob, SearchJobStatus,
    backend::{SearchJobStore, memory::MemoryStore},
};

/// Test factory functions
fn create_test_job(agent_id: &str, user_id: &str) -> SearchJob {
    SearchJob::new(agent_id, format!("topic-{}", agent_id), user_id, 3)
}

fn created_at_offset(mut job: SearchJob, seconds: i64) -> SearchJob {
    job.created_at = job.created_at + Duration::seconds(seconds);
    job.updated_at = job.created_at;
    job
}

/// A1. Oldest Pending Is Picked First
#[tokio::test]
async fn test_oldest_pending_by_created_at() {
    let store = MemoryStore::new();
    let newer = created_at_offset(create_test_job("agent-new", "user-1"), 10);
    let older = create_test_job("agent-old", "user-1");

    // Arrange: insert the newer record first
    store.insert_many(vec![newer, older.clone()]).await.unwrap();

    // Act + Assert: creation time wins over insertion order
    let next = store.oldest_pending().await.unwrap().unwrap();
    assert_eq!(next.id, older.id);
}

/// A2. Equal Creation Times Fall Back To Insertion Order
#[tokio::test]
async fn test_oldest_pending_ties_by_insertion() {
    let store = MemoryStore::new();
    let first = create_test_job("agent-1", "user-1");
    let mut second = create_test_job("agent-2", "user-1");
    second.created_at = first.created_at;

    store.insert_many(vec![first.clone(), second]).await.unwrap();

    let next = store.oldest_pending().await.unwrap().unwrap();
    assert_eq!(next.id, first.id);
}

/// A3. Only One Concurrent Claim Wins
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_only_one_concurrent_claim_wins() {
    let store = Arc::new(MemoryStore::new());
    let job = create_test_job("agent-1", "user-1");
    store.insert_many(vec![job.clone()]).await.unwrap();

    // Act: race eight claimers for the same record
    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let job_id = job.id.clone();
        handles.push(tokio::spawn(async move { store.claim(&job_id).await.unwrap() }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            winners += 1;
        }
    }

    // Assert: exactly one claim succeeded
    assert_eq!(winners, 1);
    let stored = store.get(&job.id).await.unwrap();
    assert_eq!(stored.status, SearchJobStatus::Processing);
}

/// A4. Claim Of Unknown Record Is An Error
#[tokio::test]
async fn test_claim_unknown_record() {
    let store = MemoryStore::new();
    let job = create_test_job("agent-1", "user-1");

    let result = store.claim(&job.id).await;
    assert!(matches!(result, Err(QueueError::JobNotFound(_))));
}

/// B1. Stats Count Every Status
#[tokio::test]
async fn test_stats_by_status() {
    let store = MemoryStore::new();
    let jobs: Vec<SearchJob> = (0..4)
        .map(|i| create_test_job(&format!("agent-{}", i), "user-1"))
        .collect();
    store.insert_many(jobs.clone()).await.unwrap();

    // Arrange: one completed, one failed, one processing, one left pending
    let mut completed = store.claim(&jobs[0].id).await.unwrap().unwrap();
    completed.complete(4).unwrap();
    store.update(&completed).await.unwrap();

    let mut failed = store.claim(&jobs[1].id).await.unwrap().unwrap();
    failed.fail_permanently("quota exceeded").unwrap();
    store.update(&failed).await.unwrap();

    store.claim(&jobs[2].id).await.unwrap().unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.processing, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.total, 4);
}

/// B2. Empty Store Reports Zeros
#[tokio::test]
async fn test_empty_stats() {
    let store = MemoryStore::new();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total, 0);
    assert!(store.oldest_pending().await.unwrap().is_none());
}

/// C1. Listing Filters By User And Status, Newest First
#[tokio::test]
async fn test_list_filters_and_orders() {
    let store = MemoryStore::new();
    let oldest = create_test_job("agent-1", "user-1");
    let middle = created_at_offset(create_test_job("agent-2", "user-1"), 5);
    let newest = created_at_offset(create_test_job("agent-3", "user-1"), 10);
    let other_user = create_test_job("agent-4", "user-2");

    store
        .insert_many(vec![oldest.clone(), middle.clone(), newest.clone(), other_user])
        .await
        .unwrap();

    let listed = store.list(&JobFilter::for_user("user-1")).await.unwrap();
    let ids: Vec<_> = listed.iter().map(|job| job.id.clone()).collect();
    assert_eq!(ids, vec![newest.id.clone(), middle.id.clone(), oldest.id.clone()]);

    // Status filter
    let mut done = store.claim(&middle.id).await.unwrap().unwrap();
    done.complete(1).unwrap();
    store.update(&done).await.unwrap();

    let completed = store
        .list(&JobFilter::for_user("user-1").with_status(SearchJobStatus::Completed))
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, middle.id);

    // Limit
    let limited = store.list(&JobFilter::default().with_limit(2)).await.unwrap();
    assert_eq!(limited.len(), 2);
}

/// D1. Purge Removes Only Old Completed Records
#[tokio::test]
async fn test_purge_completed_before_cutoff() {
    let store = MemoryStore::new();
    let jobs: Vec<SearchJob> = (0..3)
        .map(|i| create_test_job(&format!("agent-{}", i), "user-1"))
        .collect();
    store.insert_many(jobs.clone()).await.unwrap();

    // Old completed record
    let mut old = store.claim(&jobs[0].id).await.unwrap().unwrap();
    old.complete(2).unwrap();
    old.completed_at = Some(Utc::now() - Duration::days(8));
    store.update(&old).await.unwrap();

    // Old failed record stays
    let mut failed = store.claim(&jobs[1].id).await.unwrap().unwrap();
    failed.fail_permanently("boom").unwrap();
    failed.completed_at = Some(Utc::now() - Duration::days(30));
    store.update(&failed).await.unwrap();

    let removed = store
        .purge_completed_before(Utc::now() - Duration::days(7))
        .await
        .unwrap();

    assert_eq!(removed, 1);
    assert_eq!(store.len(), 2);
    assert!(matches!(store.get(&jobs[0].id).await, Err(QueueError::JobNotFound(_))));
}
