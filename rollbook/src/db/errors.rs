use thiserror::Error;

/// Unified error type for database operations that application code can handle
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// Unique constraint violation
    #[error("Unique constraint violation")]
    UniqueViolation {
        /// Column the constraint covers, as `table.column`
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Check constraint violation
    #[error("Check constraint violation")]
    CheckViolation { message: String },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DbError {
    /// True when the violated constraint is the unique index on `students.email`
    pub fn is_duplicate_email(&self) -> bool {
        matches!(
            self,
            DbError::UniqueViolation { constraint: Some(c), .. } if c == "students.email"
        )
    }
}

/// Convert from sqlx::Error using proper sqlx error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    let (table, constraint) = match extract_unique_target(db_err.message()) {
                        Some((table, column)) => (Some(table.to_string()), Some(format!("{table}.{column}"))),
                        None => (db_err.table().map(|s| s.to_string()), db_err.constraint().map(|s| s.to_string())),
                    };

                    DbError::UniqueViolation {
                        constraint,
                        table,
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_check_violation() {
                    DbError::CheckViolation {
                        message: db_err.message().to_string(),
                    }
                } else {
                    // All other database errors are non-recoverable - convert to anyhow
                    DbError::Other(anyhow::Error::from(err))
                }
            }
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::Other(anyhow::Error::from(err))
    }
}

/// Pull `(table, column)` out of SQLite's unique violation message.
///
/// SQLite reports these as `UNIQUE constraint failed: students.email` and does not fill in
/// the table/constraint fields sqlx exposes for other backends.
fn extract_unique_target(message: &str) -> Option<(&str, &str)> {
    let target = message.strip_prefix("UNIQUE constraint failed: ")?;
    // Composite indexes list several columns; the first one is enough to identify it
    let first = target.split(',').next()?.trim();
    first.split_once('.')
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, DbError>;
