use std::time::Duration;

use sqlx::PgPool;
use tracing::{error, info};

use eventline_common::{Event, EventlineError, Result, TenantScope};

/// Delivery attempts per job before dead-lettering.
pub const MAX_ATTEMPTS: i32 = 3;
/// Base delay between delivery attempts. Actual delay is base * 2^(attempt-1).
const RETRY_BASE: Duration = Duration::from_secs(1);

/// A claimed ingestion job: one batch's ordered event list.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub org_id: String,
    pub project_id: String,
    pub events: Vec<Event>,
    pub attempts: i32,
    pub max_attempts: i32,
}

/// What `fail` did with the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Requeued; next delivery no earlier than the given delay.
    Retried { delay: Duration },
    /// Attempts exhausted; job marked failed and surfaced for manual replay.
    DeadLettered,
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    org_id: String,
    project_id: String,
    payload: serde_json::Value,
    attempts: i32,
    max_attempts: i32,
}

/// Producer/consumer handle over the ingest_jobs table.
#[derive(Clone)]
pub struct JobQueue {
    pool: PgPool,
}

impl JobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a batch as a queued job, due immediately. Returns the job id.
    /// Event order inside the payload is preserved end to end.
    pub async fn enqueue(&self, scope: &TenantScope, events: &[Event]) -> Result<i64> {
        let payload = serde_json::to_value(events)
            .map_err(|e| EventlineError::Queue(format!("failed to encode batch: {e}")))?;

        let job_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO ingest_jobs (org_id, project_id, payload, max_attempts)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&scope.org_id)
        .bind(&scope.project_id)
        .bind(&payload)
        .bind(MAX_ATTEMPTS)
        .fetch_one(&self.pool)
        .await?;

        Ok(job_id)
    }

    /// Claim the oldest due job, if any. SKIP LOCKED keeps concurrent workers
    /// on disjoint jobs; the claim itself counts as a delivery attempt.
    pub async fn claim(&self) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE ingest_jobs
            SET status = 'running', attempts = attempts + 1, updated_at = now()
            WHERE id = (
                SELECT id FROM ingest_jobs
                WHERE status = 'queued' AND available_at <= now()
                ORDER BY id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, org_id, project_id, payload, attempts, max_attempts
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let events: Vec<Event> = serde_json::from_value(row.payload)
            .map_err(|e| EventlineError::Queue(format!("corrupt job payload ({}): {e}", row.id)))?;

        Ok(Some(Job {
            id: row.id,
            org_id: row.org_id,
            project_id: row.project_id,
            events,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
        }))
    }

    /// Successful persistence: the batch is done, discard the job.
    pub async fn complete(&self, job_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM ingest_jobs WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        info!(job_id, "Job completed");
        Ok(())
    }

    /// Delivery attempt failed. Requeues with exponential backoff until the
    /// job runs out of attempts, then dead-letters it. Never silently drops.
    pub async fn fail(&self, job: &Job, reason: &str) -> Result<FailOutcome> {
        if job.attempts >= job.max_attempts {
            sqlx::query(
                r#"
                UPDATE ingest_jobs
                SET status = 'failed', last_error = $2, updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(job.id)
            .bind(reason)
            .execute(&self.pool)
            .await?;

            error!(
                job_id = job.id,
                org_id = %job.org_id,
                batch_size = job.events.len(),
                error = reason,
                "Job failed permanently after exhausting attempts"
            );
            return Ok(FailOutcome::DeadLettered);
        }

        let delay = RETRY_BASE * 2u32.pow((job.attempts - 1).max(0) as u32);
        sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET status = 'queued',
                available_at = now() + ($2 * interval '1 second'),
                last_error = $3,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(delay.as_secs_f64())
        .bind(reason)
        .execute(&self.pool)
        .await?;

        info!(
            job_id = job.id,
            attempt = job.attempts,
            delay_secs = delay.as_secs(),
            "Job requeued with backoff"
        );
        Ok(FailOutcome::Retried { delay })
    }

    /// Return jobs stuck in 'running' (crashed worker) to the queue.
    /// At-least-once: a batch may be redelivered, never lost.
    pub async fn requeue_stuck(&self, older_than: Duration) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET status = 'queued', available_at = now(), updated_at = now()
            WHERE status = 'running'
              AND updated_at < now() - ($1 * interval '1 second')
            "#,
        )
        .bind(older_than.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
