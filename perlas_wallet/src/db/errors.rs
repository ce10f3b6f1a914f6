//! Store error types.

use thiserror::Error;

/// PostgreSQL SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL SQLSTATE for `check_violation`.
const CHECK_VIOLATION: &str = "23514";

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A unique constraint rejected the write
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A check constraint rejected the write
    #[error("Constraint violated: {0}")]
    Constraint(String),

    /// A stored value could not be decoded into its domain type
    #[error("Corrupt row: {0}")]
    Decode(String),

    /// The store refused the operation (in-process fault injection)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some(UNIQUE_VIOLATION) => {
                    return StoreError::Conflict(
                        db_err.constraint().unwrap_or("unique").to_string(),
                    );
                }
                Some(CHECK_VIOLATION) => {
                    return StoreError::Constraint(
                        db_err.constraint().unwrap_or("check").to_string(),
                    );
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

impl StoreError {
    /// Whether retrying with fresh input (e.g. a new reference code) may succeed
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
