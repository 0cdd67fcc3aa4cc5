//! Postgres-backed search job store.
//!
//! Records live in a single `search_queue` table. Every transition is one
//! statement; the claim is an `UPDATE ... WHERE status = 'pending' RETURNING`
//! so two drainers racing for the same record cannot both win it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::instrument;

use crate::{
    backend::SearchJobStore, JobFilter, JobId, QueueError, QueueResult, QueueStats, SearchJob,
    SearchJobStatus,
};

/// Table definition applied by [`PostgresStore::ensure_schema`]
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS search_queue (
    id            UUID PRIMARY KEY,
    agent_id      TEXT NOT NULL,
    topic_id      TEXT NOT NULL,
    user_id       TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'pending'
                  CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
    retry_count   INTEGER NOT NULL DEFAULT 0 CHECK (retry_count >= 0),
    max_retries   INTEGER NOT NULL DEFAULT 3 CHECK (max_retries >= 0),
    error_message TEXT,
    results_count INTEGER CHECK (results_count >= 0),
    started_at    TIMESTAMPTZ,
    completed_at  TIMESTAMPTZ,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at    TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS search_queue_status_created_idx
    ON search_queue (status, created_at);
CREATE INDEX IF NOT EXISTS search_queue_user_idx
    ON search_queue (user_id, created_at DESC);
"#;

const COLUMNS: &str = "id::text AS id, agent_id, topic_id, user_id, status, retry_count, \
    max_retries, error_message, results_count, started_at, completed_at, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect to `database_url` with the default pool options
    pub async fn connect(database_url: &str) -> QueueResult<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the table and indexes if they do not exist yet
    pub async fn ensure_schema(&self) -> QueueResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&*self.pool).await?;
        Ok(())
    }

    async fn exists(&self, job_id: &JobId) -> QueueResult<bool> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM search_queue WHERE id = $1::uuid)")
            .bind(job_id.as_str())
            .fetch_one(&*self.pool)
            .await?;
        Ok(row.try_get(0)?)
    }
}

#[async_trait]
impl SearchJobStore for PostgresStore {
    #[instrument(skip(self, jobs), fields(count = jobs.len()), err)]
    async fn insert_many(&self, jobs: Vec<SearchJob>) -> QueueResult<Vec<JobId>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(jobs.len());

        for job in jobs {
            sqlx::query(
                r#"
                INSERT INTO search_queue (
                    id, agent_id, topic_id, user_id, status, retry_count, max_retries,
                    created_at, updated_at
                )
                VALUES ($1::uuid, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(job.id.as_str())
            .bind(&job.agent_id)
            .bind(&job.topic_id)
            .bind(&job.user_id)
            .bind(job.status.as_str())
            .bind(to_db_int(job.retry_count)?)
            .bind(to_db_int(job.max_retries)?)
            .bind(job.created_at)
            .bind(job.updated_at)
            .execute(&mut *tx)
            .await?;

            ids.push(job.id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn oldest_pending(&self) -> QueueResult<Option<SearchJob>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM search_queue WHERE status = 'pending' \
             ORDER BY created_at ASC, id ASC LIMIT 1"
        ))
        .fetch_optional(&*self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn claim(&self, job_id: &JobId) -> QueueResult<Option<SearchJob>> {
        let row = sqlx::query(&format!(
            "UPDATE search_queue \
             SET status = 'processing', started_at = now(), completed_at = NULL, updated_at = now() \
             WHERE id = $1::uuid AND status = 'pending' \
             RETURNING {COLUMNS}"
        ))
        .bind(job_id.as_str())
        .fetch_optional(&*self.pool)
        .await?;

        match row {
            Some(row) => job_from_row(&row).map(Some),
            None if self.exists(job_id).await? => Ok(None),
            None => Err(QueueError::JobNotFound(job_id.to_string())),
        }
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, status = %job.status), err)]
    async fn update(&self, job: &SearchJob) -> QueueResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE search_queue
            SET status = $2, retry_count = $3, max_retries = $4, error_message = $5,
                results_count = $6, started_at = $7, completed_at = $8, updated_at = $9
            WHERE id = $1::uuid
            "#,
        )
        .bind(job.id.as_str())
        .bind(job.status.as_str())
        .bind(to_db_int(job.retry_count)?)
        .bind(to_db_int(job.max_retries)?)
        .bind(job.error_message.as_deref())
        .bind(job.results_count.map(to_db_int).transpose()?)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.updated_at)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotFound(job.id.to_string()));
        }
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> QueueResult<SearchJob> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM search_queue WHERE id = $1::uuid"
        ))
        .bind(job_id.as_str())
        .fetch_optional(&*self.pool)
        .await?
        .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;

        job_from_row(&row)
    }

    async fn list(&self, filter: &JobFilter) -> QueueResult<Vec<SearchJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM search_queue \
             WHERE ($1::text IS NULL OR user_id = $1) AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC LIMIT $3"
        ))
        .bind(filter.user_id.as_deref())
        .bind(filter.status.map(|s| s.as_str()))
        .bind(i64::try_from(filter.limit).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM search_queue GROUP BY status")
            .fetch_all(&*self.pool)
            .await?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            stats.record(parse_status(&status)?, count.max(0) as u64);
        }
        Ok(stats)
    }

    #[instrument(skip(self), err)]
    async fn purge_completed_before(&self, cutoff: DateTime<Utc>) -> QueueResult<u64> {
        let result = sqlx::query(
            "DELETE FROM search_queue WHERE status = 'completed' AND completed_at < $1",
        )
        .bind(cutoff)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

fn job_from_row(row: &PgRow) -> QueueResult<SearchJob> {
    let status: String = row.try_get("status")?;
    let results_count: Option<i32> = row.try_get("results_count")?;

    Ok(SearchJob {
        id: JobId::from_string(row.try_get("id")?),
        agent_id: row.try_get("agent_id")?,
        topic_id: row.try_get("topic_id")?,
        user_id: row.try_get("user_id")?,
        status: parse_status(&status)?,
        retry_count: from_db_int(row.try_get("retry_count")?)?,
        max_retries: from_db_int(row.try_get("max_retries")?)?,
        error_message: row.try_get("error_message")?,
        results_count: results_count.map(from_db_int).transpose()?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_status(value: &str) -> QueueResult<SearchJobStatus> {
    value.parse().map_err(QueueError::Storage)
}

fn to_db_int(value: u32) -> QueueResult<i32> {
    i32::try_from(value).map_err(|_| QueueError::Storage(format!("value {} out of range", value)))
}

fn from_db_int(value: i32) -> QueueResult<u32> {
    u32::try_from(value).map_err(|_| QueueError::Storage(format!("negative counter {}", value)))
}
