use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};
use serde::Deserialize;

use eventline_analytics::{FunnelQuery, MetricsQuery, RetentionQuery};
use eventline_common::RawTimestamp;

use crate::auth::AuthedKey;
use crate::error::error_response;
use crate::AppState;

/// POST /funnels — stepwise conversion over an ordered list of event names.
pub async fn funnels(
    State(state): State<Arc<AppState>>,
    authed: AuthedKey,
    Json(query): Json<FunnelQuery>,
) -> impl IntoResponse {
    match state.engine.funnel(&authed.scope, &query).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e, "Failed computing funnel"),
    }
}

#[derive(Deserialize)]
pub struct JourneyParams {
    limit: Option<i64>,
}

/// GET /users/{id}/journey — one user's events, ascending by timestamp.
pub async fn journey(
    State(state): State<Arc<AppState>>,
    authed: AuthedKey,
    Path(user_id): Path<String>,
    Query(params): Query<JourneyParams>,
) -> impl IntoResponse {
    match state.engine.journey(&authed.scope, &user_id, params.limit).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e, "Failed to fetch journey"),
    }
}

#[derive(Deserialize)]
pub struct RetentionParams {
    cohort: Option<String>,
    days: Option<i64>,
}

/// GET /retention — per-day retained users for a cohort event.
/// `days` defaults to 7 and is clamped to [1, 90] here at the boundary.
pub async fn retention(
    State(state): State<Arc<AppState>>,
    authed: AuthedKey,
    Query(params): Query<RetentionParams>,
) -> impl IntoResponse {
    let query = RetentionQuery {
        cohort_event: params.cohort.unwrap_or_else(|| "signup".to_string()),
        days: params.days.unwrap_or(7).clamp(1, 90),
    };

    match state.engine.retention(&authed.scope, &query).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e, "Failed computing retention"),
    }
}

#[derive(Deserialize)]
pub struct MetricsParams {
    event: Option<String>,
    interval: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

/// GET /metrics — time-bucketed counts of one event name.
pub async fn metrics(
    State(state): State<Arc<AppState>>,
    authed: AuthedKey,
    Query(params): Query<MetricsParams>,
) -> impl IntoResponse {
    let query = MetricsQuery {
        event: params.event.unwrap_or_default(),
        interval: params.interval,
        from: params.from.map(RawTimestamp::Iso),
        to: params.to.map(RawTimestamp::Iso),
    };

    match state.engine.metrics(&authed.scope, &query).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e, "Failed fetching metrics"),
    }
}
