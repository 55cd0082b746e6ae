use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream returned {status} for {url}")]
    Upstream { status: u16, url: String },

    #[error("Course index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Still throttled on {id} after {attempts} attempts")]
    Throttled { id: String, attempts: u32 },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ImportError {
    /// Whether the error should abort the whole adapter run rather than
    /// just the item that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ImportError::IndexUnavailable(_)
                | ImportError::Throttled { .. }
                | ImportError::Database(_)
                | ImportError::Migration(_)
                | ImportError::Config(_)
        )
    }
}
