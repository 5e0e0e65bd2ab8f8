//! Persistence worker process. Claims ingestion jobs from the durable queue
//! and writes them to the event store. Run one or more instances; SKIP LOCKED
//! claiming keeps them on disjoint jobs.

use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use eventline_common::Config;
use eventline_ingest::Worker;
use eventline_queue::JobQueue;
use eventline_store::EventStore;

/// Jobs left 'running' this long are assumed orphaned by a crashed worker.
const STUCK_JOB_AGE: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&config.database_url)
        .await?;

    let store = EventStore::new(pool.clone());
    let queue = JobQueue::new(pool);

    let requeued = queue.requeue_stuck(STUCK_JOB_AGE).await?;
    if requeued > 0 {
        info!(requeued, "Returned stuck jobs to the queue");
    }

    info!("Worker started, listening to queue");
    let worker = Worker::new(queue, store, Duration::from_millis(config.worker_poll_ms));
    worker.run().await?;

    Ok(())
}
