use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

use eventline_common::EventlineError;

/// Map a pipeline error onto the wire. Validation errors carry their message
/// to the caller; everything else is logged server-side and reported as the
/// generic `context` string so internals never leak.
pub fn error_response(err: EventlineError, context: &str) -> Response {
    match err {
        EventlineError::Validation(message) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
        }
        other => {
            error!(error = %other, context, "Request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": context })),
            )
                .into_response()
        }
    }
}
