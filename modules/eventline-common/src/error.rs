/// Result type alias for eventline operations.
pub type Result<T> = std::result::Result<T, EventlineError>;

#[derive(Debug, thiserror::Error)]
pub enum EventlineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EventlineError {
    /// Validation errors are caller mistakes; everything else is server-side.
    pub fn is_validation(&self) -> bool {
        matches!(self, EventlineError::Validation(_))
    }
}
