//! Error types shared by the services

use sqlx::{Error as SqlxError, migrate::MigrateError};
use thiserror::Error;

/// Failures of the PostgreSQL layer
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// The pool could not open a connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    #[error("Database query error: {0}")]
    Query(#[from] SqlxError),

    /// An embedded migration failed to apply
    #[error("Database migration error: {0}")]
    Migration(#[from] MigrateError),

    /// Settings taken from the environment are unusable
    #[error("Invalid database configuration: {0}")]
    Configuration(String),
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;
