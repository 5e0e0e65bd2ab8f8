use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EventlineError, Result};

// --- Tenant scope ---

/// The isolation boundary. Every gateway and analytics entry point takes one
/// explicitly; nothing in the pipeline reads tenant identity from ambient state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantScope {
    pub org_id: String,
    pub project_id: String,
}

impl TenantScope {
    pub fn new(org_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            project_id: project_id.into(),
        }
    }

    /// Reject empty tenant components before any query touches the store.
    pub fn validate(&self) -> Result<()> {
        if self.org_id.trim().is_empty() {
            return Err(EventlineError::Validation("orgId is required".into()));
        }
        if self.project_id.trim().is_empty() {
            return Err(EventlineError::Validation("projectId is required".into()));
        }
        Ok(())
    }
}

// --- Events ---

/// A normalized behavioral event. Immutable once persisted.
///
/// `event_id` is the client-supplied idempotency key: unique within
/// (org_id, project_id) when present. Absent means "always insert as new".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub org_id: String,
    pub project_id: String,
    pub user_id: String,
    pub event_name: String,
    #[serde(rename = "timestamp")]
    pub ts: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default = "empty_properties")]
    pub properties: serde_json::Value,
}

fn empty_properties() -> serde_json::Value {
    serde_json::json!({})
}

// --- Timestamp normalization ---

/// An incoming timestamp as clients send it: epoch milliseconds or an
/// ISO-8601 string. Normalized to `DateTime<Utc>` exactly once, at the
/// ingestion boundary; nothing downstream compares raw representations.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    EpochMillis(i64),
    Iso(String),
}

impl RawTimestamp {
    pub fn normalize(&self) -> Result<DateTime<Utc>> {
        match self {
            RawTimestamp::EpochMillis(ms) => Utc
                .timestamp_millis_opt(*ms)
                .single()
                .ok_or_else(|| {
                    EventlineError::Validation(format!("timestamp out of range: {ms}"))
                }),
            RawTimestamp::Iso(s) => parse_iso_timestamp(s),
        }
    }
}

/// Accepts full RFC 3339, a naive datetime (assumed UTC), or a bare date
/// (midnight UTC) — the representations the ingestion contract allows.
fn parse_iso_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()));
    }
    Err(EventlineError::Validation(format!(
        "timestamp must be epoch milliseconds or an ISO-8601 string, got: {s}"
    )))
}
