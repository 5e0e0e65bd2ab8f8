use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;
use tracing::debug;

use eventline_common::{EventlineError, RawTimestamp, Result, TenantScope};
use eventline_store::{EventStore, StoredEvent};

use crate::funnel::{fold_funnel, FunnelQuery, FunnelReport};
use crate::metrics::{fold_metrics, Interval, MetricsQuery, MetricsReport};
use crate::retention::{fold_retention, RetentionQuery, RetentionReport, MAX_DAYS, MIN_DAYS};

/// Journey page size: default when the caller doesn't ask, hard ceiling when
/// they ask for too much.
const JOURNEY_DEFAULT_LIMIT: i64 = 1000;
const JOURNEY_MAX_LIMIT: i64 = 5000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyReport {
    pub user_id: String,
    pub count: usize,
    pub events: Vec<StoredEvent>,
}

/// Read-only analytics engine. Shares the store with the persistence worker;
/// correctness under concurrent writes relies on the store's idempotent
/// upsert, not on locking.
#[derive(Clone)]
pub struct AnalyticsEngine {
    store: EventStore,
}

impl AnalyticsEngine {
    pub fn new(store: EventStore) -> Self {
        Self { store }
    }

    /// Stepwise conversion across an ordered list of event names.
    pub async fn funnel(&self, scope: &TenantScope, query: &FunnelQuery) -> Result<FunnelReport> {
        scope.validate()?;
        if query.steps.is_empty() {
            return Err(EventlineError::Validation("steps required".into()));
        }

        let from = normalize_bound(query.from.as_ref())?;
        // The window is inclusive; `to` covers the whole final day.
        let to = normalize_bound(query.to.as_ref())?.map(end_of_day);

        let rows = self
            .store
            .first_seen_per_step(scope, &query.steps, from, to)
            .await?;
        debug!(org_id = %scope.org_id, users = rows.len(), "Funnel rows fetched");

        Ok(fold_funnel(&query.steps, &rows))
    }

    /// Day-by-day return rate of the users who performed a cohort event.
    pub async fn retention(
        &self,
        scope: &TenantScope,
        query: &RetentionQuery,
    ) -> Result<RetentionReport> {
        scope.validate()?;
        if query.cohort_event.trim().is_empty() {
            return Err(EventlineError::Validation("cohort event required".into()));
        }
        if !(MIN_DAYS..=MAX_DAYS).contains(&query.days) {
            return Err(EventlineError::Validation(format!(
                "days must be between {MIN_DAYS} and {MAX_DAYS}"
            )));
        }

        let cohort = self.store.cohort_entries(scope, &query.cohort_event).await?;

        // Observation window starts at the cohort's earliest entry; per-user
        // offsets are computed against each user's own entry inside the fold.
        // Empty cohort: zero counts for every day, not an error.
        let Some(earliest) = cohort.iter().map(|c| c.entered_at).min() else {
            return Ok(RetentionReport {
                total_cohort: 0,
                days: query.days,
                retention: fold_retention(&[], &[], query.days),
            });
        };
        let window_end = earliest + Duration::days(query.days);
        let user_ids: Vec<String> = cohort.iter().map(|c| c.user_id.clone()).collect();

        let events = self
            .store
            .events_in_window(scope, &user_ids, earliest, window_end)
            .await?;

        Ok(RetentionReport {
            total_cohort: cohort.len(),
            days: query.days,
            retention: fold_retention(&cohort, &events, query.days),
        })
    }

    /// Occurrence counts of one event name, bucketed by time interval.
    pub async fn metrics(&self, scope: &TenantScope, query: &MetricsQuery) -> Result<MetricsReport> {
        scope.validate()?;
        if query.event.trim().is_empty() {
            return Err(EventlineError::Validation("event query required".into()));
        }

        let interval = Interval::parse(query.interval.as_deref().unwrap_or("daily"));
        let from = normalize_bound(query.from.as_ref())?;
        let to = normalize_bound(query.to.as_ref())?;

        let timestamps = self
            .store
            .event_timestamps(scope, &query.event, from, to)
            .await?;

        Ok(MetricsReport {
            event: query.event.clone(),
            interval: interval.as_str(),
            data: fold_metrics(&timestamps, interval),
        })
    }

    /// One user's event history within the tenant, ascending by timestamp.
    pub async fn journey(
        &self,
        scope: &TenantScope,
        user_id: &str,
        limit: Option<i64>,
    ) -> Result<JourneyReport> {
        scope.validate()?;
        if user_id.trim().is_empty() {
            return Err(EventlineError::Validation("userId is required".into()));
        }

        let limit = limit.unwrap_or(JOURNEY_DEFAULT_LIMIT).clamp(1, JOURNEY_MAX_LIMIT);
        let events = self.store.user_journey(scope, user_id, limit).await?;

        Ok(JourneyReport {
            user_id: user_id.to_string(),
            count: events.len(),
            events,
        })
    }
}

fn normalize_bound(raw: Option<&RawTimestamp>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|r| r.normalize()).transpose()
}

fn end_of_day(ts: DateTime<Utc>) -> DateTime<Utc> {
    let date = ts.date_naive().and_hms_milli_opt(23, 59, 59, 999).unwrap();
    Utc.from_utc_datetime(&date)
}
