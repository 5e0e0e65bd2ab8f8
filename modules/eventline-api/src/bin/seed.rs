//! Enqueues synthetic events for local development: 200 users, 10 events
//! each, through the real ingestion queue (run the worker to persist them).

use anyhow::Result;
use chrono::{Duration, Utc};
use rand::Rng;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use eventline_common::{Event, TenantScope};
use eventline_queue::JobQueue;

const USERS: usize = 200;
const EVENTS_PER_USER: usize = 10;
const CHUNK_SIZE: usize = 500;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;
    let queue = JobQueue::new(pool);

    let scope = TenantScope::new("org_local", "proj_local");
    let mut rng = rand::rng();
    let now = Utc::now();

    println!("Seeding...");

    let mut all_events = Vec::with_capacity(USERS * EVENTS_PER_USER);
    for u in 0..USERS {
        let user_id = format!("user_{u}");
        let signup_at = now - Duration::days(rng.random_range(0..30));
        all_events.push(event(&scope, &user_id, "signup", signup_at));

        for e in 1..EVENTS_PER_USER {
            let ts = signup_at
                + Duration::hours(e as i64)
                + Duration::seconds(rng.random_range(0..10));
            let name = if rng.random_bool(0.2) {
                "purchase"
            } else if rng.random_bool(0.5) {
                "page_view"
            } else {
                "click"
            };
            all_events.push(event(&scope, &user_id, name, ts));
        }
    }

    for chunk in all_events.chunks(CHUNK_SIZE) {
        queue.enqueue(&scope, chunk).await?;
        println!("Enqueued {} events", chunk.len());
    }

    println!("Seeding enqueued");
    Ok(())
}

fn event(
    scope: &TenantScope,
    user_id: &str,
    name: &str,
    ts: chrono::DateTime<Utc>,
) -> Event {
    Event {
        org_id: scope.org_id.clone(),
        project_id: scope.project_id.clone(),
        user_id: user_id.to_string(),
        event_name: name.to_string(),
        ts,
        event_id: Some(Uuid::new_v4().to_string()),
        properties: serde_json::json!({}),
    }
}
