//! SQLite-backed durable job queue.
//!
//! Jobs survive restarts. A job claimed by a worker that died is returned to
//! the queue when the queue is reopened, so every job runs at least once.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use playbymail_domain::JobId;

use crate::infrastructure::ports::{
    ClockPort, Job, JobCounts, JobKind, JobQueuePort, JobStatus, QueueError,
};

pub struct SqliteJobQueue {
    pool: SqlitePool,
    clock: Arc<dyn ClockPort>,
}

impl SqliteJobQueue {
    pub async fn new(db_path: &str, clock: Arc<dyn ClockPort>) -> Result<Self, QueueError> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .map_err(QueueError::new)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                tag TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                run_at_ms INTEGER NOT NULL,
                last_error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(QueueError::new)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_jobs_due ON jobs (status, kind, run_at_ms)",
        )
        .execute(&pool)
        .await
        .map_err(QueueError::new)?;

        let recovered = sqlx::query("UPDATE jobs SET status = ? WHERE status = ?")
            .bind(JobStatus::Pending.as_str())
            .bind(JobStatus::Running.as_str())
            .execute(&pool)
            .await
            .map_err(QueueError::new)?
            .rows_affected();
        if recovered > 0 {
            tracing::info!(recovered, "Returned interrupted jobs to the queue");
        }

        Ok(Self { pool, clock })
    }

    async fn set_status(
        &self,
        id: JobId,
        status: JobStatus,
        error: Option<&str>,
        run_at: Option<DateTime<Utc>>,
        bump_attempts: bool,
    ) -> Result<(), QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET
                status = ?,
                last_error = COALESCE(?, last_error),
                run_at_ms = COALESCE(?, run_at_ms),
                attempts = attempts + ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(run_at.map(|t| t.timestamp_millis()))
        .bind(i64::from(bump_attempts))
        .bind(self.clock.now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(QueueError::new)?;

        if result.rows_affected() == 0 {
            return Err(QueueError::new(format!("Job not found: {}", id)));
        }
        Ok(())
    }
}

fn job_from_row(row: &SqliteRow) -> Result<Job, QueueError> {
    let id: String = row.try_get("id").map_err(QueueError::new)?;
    let kind: String = row.try_get("kind").map_err(QueueError::new)?;
    let payload: String = row.try_get("payload").map_err(QueueError::new)?;
    let attempts: i64 = row.try_get("attempts").map_err(QueueError::new)?;
    let run_at_ms: i64 = row.try_get("run_at_ms").map_err(QueueError::new)?;

    Ok(Job {
        id: JobId::from(Uuid::parse_str(&id).map_err(QueueError::new)?),
        kind: kind.parse()?,
        payload: serde_json::from_str(&payload).map_err(QueueError::new)?,
        tag: row.try_get("tag").map_err(QueueError::new)?,
        attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
        run_at: Utc
            .timestamp_millis_opt(run_at_ms)
            .single()
            .ok_or_else(|| QueueError::new(format!("Invalid run_at for job {}", id)))?,
        last_error: row.try_get("last_error").map_err(QueueError::new)?,
    })
}

#[async_trait]
impl JobQueuePort for SqliteJobQueue {
    async fn enqueue(
        &self,
        kind: JobKind,
        payload: serde_json::Value,
        tag: &str,
    ) -> Result<Option<JobId>, QueueError> {
        let id = JobId::new();
        let now = self.clock.now();
        let payload = serde_json::to_string(&payload).map_err(QueueError::new)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO jobs (id, kind, payload, tag, status, attempts, run_at_ms, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?)
            ON CONFLICT(tag) DO NOTHING
            "#,
        )
        .bind(id.to_string())
        .bind(kind.as_str())
        .bind(payload)
        .bind(tag)
        .bind(JobStatus::Pending.as_str())
        .bind(now.timestamp_millis())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(QueueError::new)?
        .rows_affected();

        if inserted == 0 {
            tracing::debug!(%kind, tag, "Job with this tag already queued");
            return Ok(None);
        }
        tracing::debug!(%kind, tag, job_id = %id, "Job enqueued");
        Ok(Some(id))
    }

    async fn dequeue(
        &self,
        kinds: &[JobKind],
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, QueueError> {
        if kinds.is_empty() {
            return Ok(None);
        }
        let placeholders = vec!["?"; kinds.len()].join(", ");
        let query = format!(
            r#"
            UPDATE jobs SET status = ?, updated_at = ?
            WHERE id = (
                SELECT id FROM jobs
                WHERE status = ? AND run_at_ms <= ? AND kind IN ({})
                ORDER BY run_at_ms, created_at
                LIMIT 1
            )
            RETURNING id, kind, payload, tag, attempts, run_at_ms, last_error
            "#,
            placeholders
        );

        let mut q = sqlx::query(&query)
            .bind(JobStatus::Running.as_str())
            .bind(self.clock.now().to_rfc3339())
            .bind(JobStatus::Pending.as_str())
            .bind(now.timestamp_millis());
        for kind in kinds {
            q = q.bind(kind.as_str());
        }

        let row = q
            .fetch_optional(&self.pool)
            .await
            .map_err(QueueError::new)?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn complete(&self, id: JobId) -> Result<(), QueueError> {
        self.set_status(id, JobStatus::Completed, None, None, false)
            .await
    }

    async fn retry(
        &self,
        id: JobId,
        error: &str,
        run_at: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        self.set_status(id, JobStatus::Pending, Some(error), Some(run_at), true)
            .await
    }

    async fn dead_letter(&self, id: JobId, error: &str) -> Result<(), QueueError> {
        self.set_status(id, JobStatus::DeadLettered, Some(error), None, true)
            .await
    }

    async fn counts(&self) -> Result<JobCounts, QueueError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(QueueError::new)?;

        let mut counts = JobCounts::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(QueueError::new)?;
            let n: i64 = row.try_get("n").map_err(QueueError::new)?;
            let n = u64::try_from(n).unwrap_or_default();
            match status.parse::<JobStatus>()? {
                JobStatus::Pending => counts.pending = n,
                JobStatus::Running => counts.running = n,
                JobStatus::Completed => counts.completed = n,
                JobStatus::DeadLettered => counts.dead_lettered = n,
            }
        }
        Ok(counts)
    }
}
