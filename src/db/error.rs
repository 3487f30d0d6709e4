use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    /// A unique-constraint violation on `Message.correlation_id` — callers
    /// translate this into an idempotent lookup of the existing row rather
    /// than surfacing it (invariant 1).
    #[error("duplicate correlation_id")]
    DuplicateCorrelationId,
}

impl RepositoryError {
    pub fn is_duplicate_correlation_id(&self) -> bool {
        matches!(self, RepositoryError::DuplicateCorrelationId)
    }

    /// Converts a raw sqlx error, recognizing the `messages.correlation_id`
    /// unique violation and mapping it to [`RepositoryError::DuplicateCorrelationId`].
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() && db_err.message().contains("messages.correlation_id") {
                return RepositoryError::DuplicateCorrelationId;
            }
        }
        RepositoryError::Database(err)
    }
}
