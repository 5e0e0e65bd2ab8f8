use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};

use eventline_ingest::IngestBatchRequest;

use crate::auth::AuthedKey;
use crate::error::error_response;
use crate::AppState;

/// POST /events — accept a batch for ingestion. 202 means accepted into the
/// durable queue, not yet persisted; on 5xx the caller should retry the whole
/// batch (safe: persistence is idempotent on eventId).
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    authed: AuthedKey,
    Json(body): Json<IngestBatchRequest>,
) -> impl IntoResponse {
    let Some(records) = body.events else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "events is required" })),
        )
            .into_response();
    };

    match state.gateway.accept_batch(&authed.scope, &records).await {
        Ok(accepted) => (StatusCode::ACCEPTED, Json(accepted)).into_response(),
        Err(e) => error_response(e, "Failed to accept events"),
    }
}
