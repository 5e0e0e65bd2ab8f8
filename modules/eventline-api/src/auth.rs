use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

use eventline_common::TenantScope;

use crate::{rate_limit, AppState};

/// Rate limit granted to the admin key.
const ADMIN_RATE_LIMIT: i32 = 2000;

/// Resolved caller identity. Extract this in every handler that needs a
/// tenant: the scope here is the only tenant identity the pipeline ever sees,
/// so a caller can't write into or read from someone else's project.
///
/// The admin key (dev bootstrap) resolves its scope from the x-org-id /
/// x-project-id headers, defaulting to the local tenant.
pub struct AuthedKey {
    pub key: String,
    pub scope: TenantScope,
    pub rate_limit_per_minute: i32,
}

impl FromRequestParts<Arc<AppState>> for AuthedKey {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .trim()
            .to_string();

        if key.is_empty() {
            return Err(reject(StatusCode::UNAUTHORIZED, "Missing API Key"));
        }

        let authed = if key == state.config.admin_api_key {
            let org_id = header_or(parts, "x-org-id", "org_local");
            let project_id = header_or(parts, "x-project-id", "proj_local");
            AuthedKey {
                key,
                scope: TenantScope::new(org_id, project_id),
                rate_limit_per_minute: ADMIN_RATE_LIMIT,
            }
        } else {
            match state.api_keys.lookup(&key).await {
                Ok(Some(record)) => AuthedKey {
                    key,
                    scope: TenantScope::new(record.org_id, record.project_id),
                    rate_limit_per_minute: record.rate_limit_per_minute,
                },
                Ok(None) => return Err(reject(StatusCode::FORBIDDEN, "Invalid API Key")),
                Err(e) => {
                    error!(error = %e, "API key lookup failed");
                    return Err(reject(StatusCode::INTERNAL_SERVER_ERROR, "Auth failure"));
                }
            }
        };

        // Per-key per-minute limit, checked after resolution so the limit
        // belongs to the credential, not the caller's claims.
        if !rate_limit::allow(state, &authed.key, authed.rate_limit_per_minute as usize).await {
            return Err(reject(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded"));
        }

        Ok(authed)
    }
}

fn header_or(parts: &Parts, name: &str, default: &str) -> String {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
