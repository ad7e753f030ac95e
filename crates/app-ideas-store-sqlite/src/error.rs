use std::path::PathBuf;

use app_ideas_core::CoreError;
use rusqlite::ErrorCode;

/// Startup-time failures. A store that hits one of these must not be used.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to open database at {location}: {source}")]
    Open {
        location: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to prepare database directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("foreign key enforcement is not available on this connection")]
    ForeignKeysUnavailable,
    #[error("migration `{0}` is registered more than once")]
    DuplicateMigration(String),
    #[error("database was migrated with unknown migration `{0}`")]
    UnknownMigration(String),
    #[error("migration `{name}` failed: {source}")]
    Migration {
        name: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("migration `{name}` left {violations} foreign key violation(s)")]
    ForeignKeyViolation { name: String, violations: usize },
    #[error("failed to install updatedAt trigger: {0}")]
    Trigger(#[source] rusqlite::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("storage error: {0}")]
    Io(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error(transparent)]
    Validation(#[from] CoreError),
    #[error("failed to decode stored row: {0}")]
    Decode(String),
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Everything except a broken schema is scoped to the single call that
    /// produced it.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Schema(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                Self::Constraint(err.to_string())
            }
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => Self::Decode(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

pub trait NotFoundExt<T> {
    /// Treat a missing target as a successful no-op.
    ///
    /// # Errors
    /// Passes through every error other than [`StoreError::NotFound`].
    fn not_found_ok(self) -> Result<Option<T>, StoreError>;
}

impl<T> NotFoundExt<T> for Result<T, StoreError> {
    fn not_found_ok(self) -> Result<Option<T>, StoreError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Log a failed mutation and abandon it, leaving prior state intact.
pub fn report_mutation<T>(operation: &str, result: Result<T, StoreError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                operation,
                error = %err,
                recoverable = err.is_recoverable(),
                "mutation abandoned"
            );
            None
        }
    }
}
