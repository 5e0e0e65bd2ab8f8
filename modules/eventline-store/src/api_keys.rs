// API-key -> tenant resolution. The pipeline itself never sees credentials,
// only the resolved scope; this lookup lives at the HTTP boundary.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

use eventline_common::Result;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKeyRecord {
    pub key: String,
    pub org_id: String,
    pub project_id: String,
    pub name: Option<String>,
    pub rate_limit_per_minute: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ApiKeyStore {
    pool: PgPool,
}

impl ApiKeyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn lookup(&self, key: &str) -> Result<Option<ApiKeyRecord>> {
        let row = sqlx::query_as::<_, ApiKeyRecord>(
            r#"
            SELECT key, org_id, project_id, name, rate_limit_per_minute, created_at
            FROM api_keys
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Provision the local admin key if it doesn't exist yet. Dev bootstrap,
    /// run once at API startup.
    pub async fn ensure_admin_key(&self, key: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO api_keys (key, org_id, project_id, name, rate_limit_per_minute)
            VALUES ($1, 'org_local', 'proj_local', 'default-admin', 5000)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!("Created local admin API key (for dev)");
        }
        Ok(())
    }
}
