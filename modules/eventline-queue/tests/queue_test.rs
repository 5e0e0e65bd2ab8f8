//! Integration tests for the durable ingestion queue.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use eventline_common::{Event, TenantScope};
use eventline_queue::{FailOutcome, JobQueue};
use eventline_store::EventStore;

/// claim() takes whatever job is due, so these tests run one at a time
/// against a truncated table.
static QUEUE_LOCK: Mutex<()> = Mutex::const_new(());

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    EventStore::new(pool.clone()).migrate().await.ok()?;
    sqlx::query("TRUNCATE ingest_jobs RESTART IDENTITY")
        .execute(&pool)
        .await
        .ok()?;
    Some(pool)
}

fn scope() -> TenantScope {
    TenantScope::new(format!("org_{}", Uuid::new_v4()), "proj_test")
}

fn events(scope: &TenantScope, n: usize) -> Vec<Event> {
    (0..n)
        .map(|i| Event {
            org_id: scope.org_id.clone(),
            project_id: scope.project_id.clone(),
            user_id: format!("u{i}"),
            event_name: "click".to_string(),
            ts: Utc.timestamp_opt(100 + i as i64, 0).unwrap(),
            event_id: None,
            properties: serde_json::json!({"seq": i}),
        })
        .collect()
}

/// Clear a job's backoff so it can be claimed again immediately.
async fn make_due(pool: &PgPool, job_id: i64) {
    sqlx::query("UPDATE ingest_jobs SET available_at = now() WHERE id = $1")
        .bind(job_id)
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn claim_returns_the_payload_in_order() {
    let _guard = QUEUE_LOCK.lock().await;
    let Some(pool) = test_pool().await else {
        return;
    };
    let queue = JobQueue::new(pool);
    let scope = scope();

    let batch = events(&scope, 5);
    let job_id = queue.enqueue(&scope, &batch).await.unwrap();

    let job = queue.claim().await.unwrap().expect("job should be due");
    assert_eq!(job.id, job_id);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.org_id, scope.org_id);

    let users: Vec<_> = job.events.iter().map(|e| e.user_id.as_str()).collect();
    assert_eq!(users, vec!["u0", "u1", "u2", "u3", "u4"]);
}

#[tokio::test]
async fn running_jobs_are_not_claimed_twice() {
    let _guard = QUEUE_LOCK.lock().await;
    let Some(pool) = test_pool().await else {
        return;
    };
    let queue = JobQueue::new(pool);
    let scope = scope();

    queue.enqueue(&scope, &events(&scope, 1)).await.unwrap();
    assert!(queue.claim().await.unwrap().is_some());
    assert!(queue.claim().await.unwrap().is_none());
}

#[tokio::test]
async fn complete_discards_the_job() {
    let _guard = QUEUE_LOCK.lock().await;
    let Some(pool) = test_pool().await else {
        return;
    };
    let queue = JobQueue::new(pool.clone());
    let scope = scope();

    queue.enqueue(&scope, &events(&scope, 1)).await.unwrap();
    let job = queue.claim().await.unwrap().unwrap();
    queue.complete(job.id).await.unwrap();

    let remaining: i64 = sqlx::query_scalar("SELECT count(*) FROM ingest_jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn failed_delivery_requeues_with_backoff() {
    let _guard = QUEUE_LOCK.lock().await;
    let Some(pool) = test_pool().await else {
        return;
    };
    let queue = JobQueue::new(pool.clone());
    let scope = scope();

    queue.enqueue(&scope, &events(&scope, 1)).await.unwrap();
    let job = queue.claim().await.unwrap().unwrap();

    let outcome = queue.fail(&job, "store unavailable").await.unwrap();
    assert_eq!(outcome, FailOutcome::Retried { delay: Duration::from_secs(1) });

    // Requeued but not yet due.
    assert!(queue.claim().await.unwrap().is_none());

    let (status, last_error): (String, Option<String>) =
        sqlx::query_as("SELECT status, last_error FROM ingest_jobs WHERE id = $1")
            .bind(job.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "queued");
    assert_eq!(last_error.as_deref(), Some("store unavailable"));
}

#[tokio::test]
async fn backoff_doubles_then_dead_letters_after_three_attempts() {
    let _guard = QUEUE_LOCK.lock().await;
    let Some(pool) = test_pool().await else {
        return;
    };
    let queue = JobQueue::new(pool.clone());
    let scope = scope();

    queue.enqueue(&scope, &events(&scope, 2)).await.unwrap();

    let job = queue.claim().await.unwrap().unwrap();
    assert_eq!(
        queue.fail(&job, "boom").await.unwrap(),
        FailOutcome::Retried { delay: Duration::from_secs(1) }
    );
    make_due(&pool, job.id).await;

    let job = queue.claim().await.unwrap().unwrap();
    assert_eq!(job.attempts, 2);
    assert_eq!(
        queue.fail(&job, "boom").await.unwrap(),
        FailOutcome::Retried { delay: Duration::from_secs(2) }
    );
    make_due(&pool, job.id).await;

    let job = queue.claim().await.unwrap().unwrap();
    assert_eq!(job.attempts, 3);
    assert_eq!(queue.fail(&job, "boom").await.unwrap(), FailOutcome::DeadLettered);

    // Dead-lettered: surfaced, not replayed.
    assert!(queue.claim().await.unwrap().is_none());
    let status: String = sqlx::query_scalar("SELECT status FROM ingest_jobs WHERE id = $1")
        .bind(job.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "failed");
}

#[tokio::test]
async fn stuck_running_jobs_can_be_requeued() {
    let _guard = QUEUE_LOCK.lock().await;
    let Some(pool) = test_pool().await else {
        return;
    };
    let queue = JobQueue::new(pool.clone());
    let scope = scope();

    queue.enqueue(&scope, &events(&scope, 1)).await.unwrap();
    let job = queue.claim().await.unwrap().unwrap();

    // Simulate a worker that died mid-batch.
    sqlx::query("UPDATE ingest_jobs SET updated_at = now() - interval '1 hour' WHERE id = $1")
        .bind(job.id)
        .execute(&pool)
        .await
        .unwrap();

    let requeued = queue.requeue_stuck(Duration::from_secs(300)).await.unwrap();
    assert_eq!(requeued, 1);

    let redelivered = queue.claim().await.unwrap().expect("job redelivered");
    assert_eq!(redelivered.id, job.id);
    assert_eq!(redelivered.attempts, 2);
}
