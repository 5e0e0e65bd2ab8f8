use std::time::Duration;

use tracing::{error, info, warn};

use eventline_common::Result;
use eventline_queue::{Job, JobQueue};
use eventline_store::EventStore;

/// Persistence worker: drains the queue into the event store, one batch at a
/// time. A batch is processed to completion (or definitive fallback failure)
/// before the next job is claimed; a single batch's failure never takes the
/// process down.
pub struct Worker {
    queue: JobQueue,
    store: EventStore,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(queue: JobQueue, store: EventStore, poll_interval: Duration) -> Self {
        Self { queue, store, poll_interval }
    }

    /// Consume jobs forever. Sleeps `poll_interval` when the queue is empty.
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.tick().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.poll_interval).await,
                Err(e) => {
                    // Claim/queue infrastructure error — back off and keep going.
                    error!(error = %e, "Worker tick failed");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Claim and process at most one job. Returns whether a job was claimed.
    pub async fn tick(&self) -> Result<bool> {
        let Some(job) = self.queue.claim().await? else {
            return Ok(false);
        };
        self.process(job).await?;
        Ok(true)
    }

    async fn process(&self, job: Job) -> Result<()> {
        if job.events.is_empty() {
            return self.queue.complete(job.id).await;
        }

        match self.store.persist_batch(&job.events).await {
            Ok(inserted) => {
                info!(
                    job_id = job.id,
                    org_id = %job.org_id,
                    batch_size = job.events.len(),
                    inserted,
                    "Batch persisted"
                );
                self.queue.complete(job.id).await
            }
            Err(e) => {
                warn!(
                    job_id = job.id,
                    org_id = %job.org_id,
                    project_id = %job.project_id,
                    batch_size = job.events.len(),
                    error = %e,
                    "Bulk persist failed, falling back to per-event inserts"
                );
                match self.store.persist_each(&job.events).await {
                    Ok(inserted) => {
                        info!(
                            job_id = job.id,
                            batch_size = job.events.len(),
                            inserted,
                            "Batch persisted via fallback path"
                        );
                        self.queue.complete(job.id).await
                    }
                    Err(fallback_err) => {
                        // Both paths failed: hand the job back to the queue's
                        // retry policy (backoff, then dead-letter).
                        self.queue
                            .fail(&job, &fallback_err.to_string())
                            .await
                            .map(|_| ())
                    }
                }
            }
        }
    }
}
