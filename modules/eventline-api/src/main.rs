//! HTTP boundary: API-key auth, rate limiting, the ingestion endpoint, and
//! the analytics query endpoints. Everything below this layer takes an
//! explicit tenant scope; this is where it gets resolved.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use eventline_analytics::AnalyticsEngine;
use eventline_common::Config;
use eventline_ingest::Gateway;
use eventline_queue::JobQueue;
use eventline_store::{ApiKeyStore, EventStore};

mod auth;
mod error;
mod rate_limit;
mod routes;

pub struct AppState {
    pub config: Config,
    pub gateway: Gateway,
    pub engine: AnalyticsEngine,
    pub api_keys: ApiKeyStore,
    pub rate_limiter: Mutex<HashMap<String, Vec<Instant>>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("../../migrations").run(&pool).await?;
    info!("Migrations complete");

    let store = EventStore::new(pool.clone());
    let api_keys = ApiKeyStore::new(pool.clone());
    api_keys.ensure_admin_key(&config.admin_api_key).await?;

    let addr = format!("{}:{}", config.api_host, config.api_port);

    let state = Arc::new(AppState {
        gateway: Gateway::new(JobQueue::new(pool)),
        engine: AnalyticsEngine::new(store),
        api_keys,
        rate_limiter: Mutex::new(HashMap::new()),
        config,
    });

    let app = Router::new()
        // Health check
        .route("/health", get(|| async { "ok" }))
        // Ingestion
        .route("/events", post(routes::events::ingest))
        // Analytics
        .route("/funnels", post(routes::analytics::funnels))
        .route("/users/{id}/journey", get(routes::analytics::journey))
        .route("/retention", get(routes::analytics::retention))
        .route("/metrics", get(routes::analytics::metrics))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Method + path + status + latency only
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    info!("Eventline API starting on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
