//! Custom error types for the common library
//!
//! This module defines the database error taxonomy shared by every service.
//! Raw `sqlx` errors are classified here so that callers can tell a
//! uniqueness or foreign key violation apart from an unexpected failure.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// PostgreSQL SQLSTATE for `unique_violation`
const UNIQUE_VIOLATION: &str = "23505";
/// PostgreSQL SQLSTATE for `foreign_key_violation`
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// A unique constraint rejected the write
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A foreign key constraint rejected the write
    #[error("Foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

impl DatabaseError {
    /// Classify a query error by its SQLSTATE code
    pub fn from_query(error: SqlxError) -> Self {
        let classified = match &error {
            SqlxError::Database(db) => {
                let constraint = db.constraint().unwrap_or("unknown").to_string();
                match db.code().as_deref() {
                    Some(UNIQUE_VIOLATION) => Some(DatabaseError::UniqueViolation(constraint)),
                    Some(FOREIGN_KEY_VIOLATION) => {
                        Some(DatabaseError::ForeignKeyViolation(constraint))
                    }
                    _ => None,
                }
            }
            _ => None,
        };

        classified.unwrap_or(DatabaseError::Query(error))
    }

    /// Whether this error is a uniqueness violation
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DatabaseError::UniqueViolation(_))
    }
}

impl From<SqlxError> for DatabaseError {
    fn from(error: SqlxError) -> Self {
        match error {
            SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_) => {
                DatabaseError::Connection(error)
            }
            other => DatabaseError::from_query(other),
        }
    }
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;
