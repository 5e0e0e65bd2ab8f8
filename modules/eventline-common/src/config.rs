use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Web server
    pub api_host: String,
    pub api_port: u16,

    // Dev/admin credential, auto-provisioned at API boot
    pub admin_api_key: String,

    // Worker
    pub worker_poll_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("API_PORT must be a number"),
            admin_api_key: env::var("ADMIN_API_KEY")
                .unwrap_or_else(|_| "local_admin_key_please_change".to_string()),
            worker_poll_ms: env::var("WORKER_POLL_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .expect("WORKER_POLL_MS must be a number"),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
