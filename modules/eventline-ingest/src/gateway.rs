use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use eventline_common::{Event, EventlineError, RawTimestamp, Result, TenantScope};
use eventline_queue::JobQueue;

/// Largest batch a single ingestion request may carry.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Enqueue attempts before the batch is reported back as a server failure.
const ENQUEUE_MAX_ATTEMPTS: u32 = 3;
/// Base enqueue backoff. Actual delay is base * 2^attempt + jitter.
const ENQUEUE_RETRY_BASE: Duration = Duration::from_secs(1);

/// Raw ingestion request body. All fields optional at the wire so validation
/// can name the missing constraint instead of a generic decode error.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestBatchRequest {
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub events: Option<Vec<RawEventRecord>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEventRecord {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub timestamp: Option<RawTimestamp>,
    #[serde(default)]
    pub properties: Option<serde_json::Value>,
}

/// Acceptance (not persistence) confirmation.
#[derive(Debug, Clone, Serialize)]
pub struct Accepted {
    pub status: &'static str,
    pub count: usize,
}

/// Validate a raw batch and stamp the resolved tenant onto every record.
/// Any failure rejects the whole batch — nothing is partially accepted.
pub fn normalize_batch(scope: &TenantScope, records: &[RawEventRecord]) -> Result<Vec<Event>> {
    scope.validate()?;

    if records.len() > MAX_BATCH_SIZE {
        return Err(EventlineError::Validation(format!(
            "events must contain at most {MAX_BATCH_SIZE} records, got {}",
            records.len()
        )));
    }

    let mut events = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        let user_id = match rec.user_id.as_deref().map(str::trim) {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => {
                return Err(EventlineError::Validation(format!(
                    "events[{i}]: userId is required"
                )))
            }
        };
        let event_name = match rec.event_name.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => {
                return Err(EventlineError::Validation(format!(
                    "events[{i}]: eventName is required"
                )))
            }
        };
        let ts = match &rec.timestamp {
            Some(raw) => raw.normalize().map_err(|e| {
                EventlineError::Validation(format!("events[{i}]: {e}"))
            })?,
            None => {
                return Err(EventlineError::Validation(format!(
                    "events[{i}]: timestamp is required"
                )))
            }
        };
        let properties = match &rec.properties {
            Some(v) if v.is_object() => v.clone(),
            Some(_) => {
                return Err(EventlineError::Validation(format!(
                    "events[{i}]: properties must be an object"
                )))
            }
            None => serde_json::json!({}),
        };

        // Tenant values from the resolved scope take precedence over any
        // per-record copy a client sent.
        events.push(Event {
            org_id: scope.org_id.clone(),
            project_id: scope.project_id.clone(),
            user_id,
            event_name,
            ts,
            event_id: rec.event_id.clone(),
            properties,
        });
    }

    Ok(events)
}

/// Ingestion gateway: validates, normalizes, enqueues. Stateless beyond the
/// queue handle; never writes to the store directly.
#[derive(Clone)]
pub struct Gateway {
    queue: JobQueue,
}

impl Gateway {
    pub fn new(queue: JobQueue) -> Self {
        Self { queue }
    }

    /// Accept a tenant-scoped batch. Success means "accepted, not yet
    /// durable"; the caller learns the accepted count, nothing more.
    ///
    /// Enqueueing retries up to 3 times with exponential backoff (1s, 2s)
    /// plus 0-1s jitter before the failure is surfaced to the caller, who
    /// must retry the batch (safe: persistence is idempotent on eventId).
    pub async fn accept_batch(
        &self,
        scope: &TenantScope,
        records: &[RawEventRecord],
    ) -> Result<Accepted> {
        let events = normalize_batch(scope, records)?;
        if events.is_empty() {
            return Ok(Accepted { status: "accepted", count: 0 });
        }

        let mut attempt = 0u32;
        loop {
            match self.queue.enqueue(scope, &events).await {
                Ok(job_id) => {
                    info!(
                        job_id,
                        org_id = %scope.org_id,
                        project_id = %scope.project_id,
                        count = events.len(),
                        "Batch accepted"
                    );
                    return Ok(Accepted { status: "accepted", count: events.len() });
                }
                Err(e) if attempt + 1 < ENQUEUE_MAX_ATTEMPTS => {
                    let backoff = ENQUEUE_RETRY_BASE * 2u32.pow(attempt);
                    let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
                    warn!(
                        attempt = attempt + 1,
                        backoff_secs = backoff.as_secs(),
                        error = %e,
                        "Enqueue failed, retrying after backoff"
                    );
                    tokio::time::sleep(backoff + jitter).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        org_id = %scope.org_id,
                        count = events.len(),
                        error = %e,
                        "Failed to accept batch after exhausting enqueue retries"
                    );
                    return Err(EventlineError::Queue(format!(
                        "failed to enqueue batch after {ENQUEUE_MAX_ATTEMPTS} attempts: {e}"
                    )));
                }
            }
        }
    }
}
