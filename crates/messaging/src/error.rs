use thiserror::Error;
use uuid::Uuid;

/// Errors from the outbox, idempotency, and broker layers.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The broker rejected or could not accept a publish.
    #[error("Broker publish failed: {0}")]
    Publish(String),

    /// An outbox record was not found.
    #[error("Outbox record not found: {0}")]
    RecordNotFound(Uuid),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;
