//! End-to-end ingestion tests: gateway -> queue -> worker -> store.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use eventline_common::{RawTimestamp, TenantScope};
use eventline_ingest::{Gateway, RawEventRecord, Worker};
use eventline_queue::JobQueue;
use eventline_store::EventStore;

/// Worker ticks claim whatever job is due; run these one at a time against a
/// truncated jobs table.
static QUEUE_LOCK: Mutex<()> = Mutex::const_new(());

struct Harness {
    gateway: Gateway,
    worker: Worker,
    store: EventStore,
}

async fn harness() -> Option<Harness> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    let store = EventStore::new(pool.clone());
    store.migrate().await.ok()?;
    sqlx::query("TRUNCATE ingest_jobs RESTART IDENTITY")
        .execute(&pool)
        .await
        .ok()?;

    let queue = JobQueue::new(pool);
    Some(Harness {
        gateway: Gateway::new(queue.clone()),
        worker: Worker::new(queue, store.clone(), Duration::from_millis(10)),
        store,
    })
}

fn scope() -> TenantScope {
    TenantScope::new(format!("org_{}", Uuid::new_v4()), "proj_test")
}

fn record(user: &str, name: &str, ts_ms: i64, event_id: Option<&str>) -> RawEventRecord {
    RawEventRecord {
        event_id: event_id.map(str::to_string),
        user_id: Some(user.to_string()),
        event_name: Some(name.to_string()),
        timestamp: Some(RawTimestamp::EpochMillis(ts_ms)),
        properties: Some(serde_json::json!({"source": "test"})),
    }
}

#[tokio::test]
async fn accepted_batch_is_persisted_by_one_tick() {
    let _guard = QUEUE_LOCK.lock().await;
    let Some(h) = harness().await else {
        return;
    };
    let scope = scope();

    let accepted = h
        .gateway
        .accept_batch(
            &scope,
            &[
                record("u1", "signup", 1_000, Some("e1")),
                record("u1", "purchase", 2_000, None),
            ],
        )
        .await
        .unwrap();
    assert_eq!(accepted.status, "accepted");
    assert_eq!(accepted.count, 2);

    // Acceptance is not persistence: nothing stored until the worker runs.
    let journey = h.store.user_journey(&scope, "u1", 100).await.unwrap();
    assert!(journey.is_empty());

    assert!(h.worker.tick().await.unwrap(), "one job should be claimed");

    let journey = h.store.user_journey(&scope, "u1", 100).await.unwrap();
    assert_eq!(journey.len(), 2);
    assert_eq!(journey[0].event_name, "signup");
    assert_eq!(journey[0].properties["source"], "test");
}

#[tokio::test]
async fn redelivered_batch_does_not_duplicate_keyed_events() {
    let _guard = QUEUE_LOCK.lock().await;
    let Some(h) = harness().await else {
        return;
    };
    let scope = scope();
    let batch = [record("u1", "signup", 1_000, Some("stable-id"))];

    // The same batch accepted twice (client retry after a timeout).
    h.gateway.accept_batch(&scope, &batch).await.unwrap();
    h.gateway.accept_batch(&scope, &batch).await.unwrap();

    assert!(h.worker.tick().await.unwrap());
    assert!(h.worker.tick().await.unwrap());

    let journey = h.store.user_journey(&scope, "u1", 100).await.unwrap();
    assert_eq!(journey.len(), 1, "idempotent on eventId across deliveries");
}

#[tokio::test]
async fn tick_reports_idle_on_an_empty_queue() {
    let _guard = QUEUE_LOCK.lock().await;
    let Some(h) = harness().await else {
        return;
    };
    assert!(!h.worker.tick().await.unwrap());
}

#[tokio::test]
async fn completed_jobs_are_discarded() {
    let _guard = QUEUE_LOCK.lock().await;
    let Some(h) = harness().await else {
        return;
    };
    let scope = scope();

    h.gateway
        .accept_batch(&scope, &[record("u1", "click", 1_000, None)])
        .await
        .unwrap();
    h.worker.tick().await.unwrap();

    let remaining: i64 = sqlx::query_scalar("SELECT count(*) FROM ingest_jobs")
        .fetch_one(h.store.pool())
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}
