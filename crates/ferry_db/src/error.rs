//! Error types for the database layer.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Database error types.
#[derive(Debug, Error, Diagnostic)]
pub enum DbError {
    /// SQLite/sqlx error
    #[error("Database error: {0}")]
    #[diagnostic(code(ferry_db::sqlx))]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    #[diagnostic(code(ferry_db::migration))]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Entity not found
    #[error("{entity_type} not found: {id}")]
    #[diagnostic(code(ferry_db::not_found))]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// IO error (creating the database directory)
    #[error("IO error: {0}")]
    #[diagnostic(code(ferry_db::io))]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Create a not found error.
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Whether this error came from a UNIQUE/PRIMARY KEY/CHECK constraint.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::Sqlx(sqlx::Error::Database(e)) => {
                e.is_unique_violation() || e.is_check_violation() || e.is_foreign_key_violation()
            }
            _ => false,
        }
    }
}
