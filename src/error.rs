use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(tokio_rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// A row with the same unique key already exists.
    #[error("Record not unique: {0}")]
    NotUnique(String),

    /// The store rejected a field value.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Feed {0} not found")]
    FeedNotFound(i64),

    #[error("Sanitize error: {0}")]
    Sanitize(String),

    #[error("Duplicate cache error: {0}")]
    Cache(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Classify a raw SQLite failure by its extended result code.
    pub fn from_sqlite(err: rusqlite::Error) -> Self {
        use rusqlite::ffi;

        if let rusqlite::Error::SqliteFailure(failure, message) = &err {
            let detail = message.clone().unwrap_or_else(|| failure.to_string());
            match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    return AppError::NotUnique(detail);
                }
                ffi::SQLITE_CONSTRAINT_CHECK | ffi::SQLITE_CONSTRAINT_NOTNULL => {
                    return AppError::Validation(detail);
                }
                _ => {}
            }
        }
        AppError::Database(tokio_rusqlite::Error::Rusqlite(err))
    }

    pub fn is_not_unique(&self) -> bool {
        matches!(self, AppError::NotUnique(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}

impl From<tokio_rusqlite::Error> for AppError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Rusqlite(err) => AppError::from_sqlite(err),
            other => AppError::Database(other),
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::from_sqlite(err)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn constraint_failure(extended_code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(extended_code),
            Some("constraint failed".to_string()),
        )
    }

    #[test]
    fn unique_violation_is_not_unique() {
        let err = AppError::from(constraint_failure(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE));
        assert!(err.is_not_unique());
    }

    #[test]
    fn check_violation_is_validation() {
        let err = AppError::from(constraint_failure(rusqlite::ffi::SQLITE_CONSTRAINT_CHECK));
        assert!(err.is_validation());
    }

    #[test]
    fn other_failures_stay_database_errors() {
        let err = AppError::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(err, AppError::Database(_)));
    }
}
