use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::warn;

use eventline_common::{Event, Result, TenantScope};

// ---------------------------------------------------------------------------
// EventStore
// ---------------------------------------------------------------------------

/// Durable, indexed collection of persisted events.
#[derive(Clone)]
pub struct EventStore {
    pool: PgPool,
}

/// An event row as stored in Postgres. Returned by read methods.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    pub id: i64,
    pub org_id: String,
    pub project_id: String,
    pub user_id: String,
    pub event_name: String,
    #[serde(rename = "timestamp")]
    pub ts: DateTime<Utc>,
    pub event_id: Option<String>,
    pub properties: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

/// Earliest occurrence of one event name for one user. Funnel input.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FirstSeenRow {
    pub user_id: String,
    pub event_name: String,
    pub first_ts: DateTime<Utc>,
}

/// A cohort member and their entry time (first cohort event).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CohortEntry {
    pub user_id: String,
    pub entered_at: DateTime<Utc>,
}

/// Minimal (user, timestamp) pair for retention folding.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserEventRow {
    pub user_id: String,
    pub ts: DateTime<Utc>,
}

impl EventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the embedded SQL migrations (repo-root migrations directory).
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| eventline_common::EventlineError::Database(e.into()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Writes (persistence worker only)
    // -----------------------------------------------------------------------

    /// Primary persistence path: one unordered bulk insert for the whole batch.
    ///
    /// Events carrying an `event_id` hit the partial unique index and are
    /// inserted only if absent — a redelivered batch is a no-op for them.
    /// Events without an `event_id` always insert as new rows. Returns the
    /// number of rows actually inserted (conflicts don't count).
    pub async fn persist_batch(&self, events: &[Event]) -> Result<u64> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut org_ids = Vec::with_capacity(events.len());
        let mut project_ids = Vec::with_capacity(events.len());
        let mut user_ids = Vec::with_capacity(events.len());
        let mut event_names = Vec::with_capacity(events.len());
        let mut timestamps = Vec::with_capacity(events.len());
        let mut event_ids: Vec<Option<String>> = Vec::with_capacity(events.len());
        let mut properties = Vec::with_capacity(events.len());

        for ev in events {
            org_ids.push(ev.org_id.clone());
            project_ids.push(ev.project_id.clone());
            user_ids.push(ev.user_id.clone());
            event_names.push(ev.event_name.clone());
            timestamps.push(ev.ts);
            event_ids.push(ev.event_id.clone());
            properties.push(ev.properties.clone());
        }

        let result = sqlx::query(
            r#"
            INSERT INTO events (org_id, project_id, user_id, event_name, ts, event_id, properties)
            SELECT * FROM UNNEST(
                $1::text[], $2::text[], $3::text[], $4::text[],
                $5::timestamptz[], $6::text[], $7::jsonb[]
            )
            ON CONFLICT (org_id, project_id, event_id) WHERE event_id IS NOT NULL
            DO NOTHING
            "#,
        )
        .bind(&org_ids)
        .bind(&project_ids)
        .bind(&user_ids)
        .bind(&event_names)
        .bind(&timestamps)
        .bind(&event_ids)
        .bind(&properties)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Degraded fallback: best-effort per-event inserts when the bulk path
    /// failed. Individual failures are logged and skipped, never fatal. This
    /// path can duplicate events that lack an `event_id`; it never silently
    /// drops the batch without a persistence attempt. Returns the insert count.
    pub async fn persist_each(&self, events: &[Event]) -> Result<u64> {
        let mut inserted = 0u64;
        let mut failed = 0u64;
        let mut last_err: Option<sqlx::Error> = None;

        for ev in events {
            let result = sqlx::query(
                r#"
                INSERT INTO events (org_id, project_id, user_id, event_name, ts, event_id, properties)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(&ev.org_id)
            .bind(&ev.project_id)
            .bind(&ev.user_id)
            .bind(&ev.event_name)
            .bind(ev.ts)
            .bind(&ev.event_id)
            .bind(&ev.properties)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => inserted += 1,
                Err(e) => {
                    failed += 1;
                    warn!(
                        user_id = %ev.user_id,
                        event_name = %ev.event_name,
                        error = %e,
                        "Fallback insert failed for one event"
                    );
                    last_err = Some(e);
                }
            }
        }

        if failed > 0 {
            warn!(inserted, failed, "Fallback persistence finished with failures");
        }
        // Nothing made it in at all: surface the error so the job re-enters
        // the queue's retry policy instead of being discarded as done.
        if inserted == 0 {
            if let Some(e) = last_err {
                return Err(e.into());
            }
        }
        Ok(inserted)
    }

    // -----------------------------------------------------------------------
    // Reads (analytics engine)
    // -----------------------------------------------------------------------

    /// Earliest timestamp per (user, event name) for the given step names,
    /// restricted to the tenant and the optional inclusive window.
    pub async fn first_seen_per_step(
        &self,
        scope: &TenantScope,
        steps: &[String],
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<FirstSeenRow>> {
        let rows = sqlx::query_as::<_, FirstSeenRow>(
            r#"
            SELECT user_id, event_name, MIN(ts) AS first_ts
            FROM events
            WHERE org_id = $1 AND project_id = $2
              AND event_name = ANY($3)
              AND ($4::timestamptz IS NULL OR ts >= $4)
              AND ($5::timestamptz IS NULL OR ts <= $5)
            GROUP BY user_id, event_name
            ORDER BY user_id
            "#,
        )
        .bind(&scope.org_id)
        .bind(&scope.project_id)
        .bind(steps)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// All tenant users who ever performed `cohort_event`, each with their
    /// earliest occurrence.
    pub async fn cohort_entries(
        &self,
        scope: &TenantScope,
        cohort_event: &str,
    ) -> Result<Vec<CohortEntry>> {
        let rows = sqlx::query_as::<_, CohortEntry>(
            r#"
            SELECT user_id, MIN(ts) AS entered_at
            FROM events
            WHERE org_id = $1 AND project_id = $2 AND event_name = $3
            GROUP BY user_id
            "#,
        )
        .bind(&scope.org_id)
        .bind(&scope.project_id)
        .bind(cohort_event)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// (user, ts) pairs for the given users inside an inclusive window.
    pub async fn events_in_window(
        &self,
        scope: &TenantScope,
        user_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<UserEventRow>> {
        let rows = sqlx::query_as::<_, UserEventRow>(
            r#"
            SELECT user_id, ts
            FROM events
            WHERE org_id = $1 AND project_id = $2
              AND user_id = ANY($3)
              AND ts >= $4 AND ts <= $5
            "#,
        )
        .bind(&scope.org_id)
        .bind(&scope.project_id)
        .bind(user_ids)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Timestamps of every occurrence of one event name, ascending, within
    /// the optional inclusive window. Metrics bucketing input.
    pub async fn event_timestamps(
        &self,
        scope: &TenantScope,
        event_name: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<DateTime<Utc>>> {
        let rows = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            SELECT ts
            FROM events
            WHERE org_id = $1 AND project_id = $2 AND event_name = $3
              AND ($4::timestamptz IS NULL OR ts >= $4)
              AND ($5::timestamptz IS NULL OR ts <= $5)
            ORDER BY ts ASC
            "#,
        )
        .bind(&scope.org_id)
        .bind(&scope.project_id)
        .bind(event_name)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// One user's events within the tenant, ascending by timestamp.
    pub async fn user_journey(
        &self,
        scope: &TenantScope,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<StoredEvent>> {
        let rows = sqlx::query_as::<_, StoredEvent>(
            r#"
            SELECT id, org_id, project_id, user_id, event_name, ts, event_id, properties, received_at
            FROM events
            WHERE org_id = $1 AND project_id = $2 AND user_id = $3
            ORDER BY ts ASC
            LIMIT $4
            "#,
        )
        .bind(&scope.org_id)
        .bind(&scope.project_id)
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
