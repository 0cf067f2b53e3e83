use log::error;
use std::fmt;

#[derive(Debug)]
pub enum StorageError {
    /// Unique-key violation; callers treat this as "already persisted".
    DuplicateKey(String),
    QueryError(String),
    InternalError(String),
}

impl StorageError {
    fn format_message(&self) -> String {
        match self {
            Self::DuplicateKey(msg) => format!("Duplicate key: {}", msg),
            Self::QueryError(msg) => format!("Query error: {}", msg),
            Self::InternalError(msg) => format!("Internal error: {}", msg),
        }
    }

    // Duplicates are an expected outcome of replays; no log on construction.
    pub fn duplicate_key(msg: impl Into<String>) -> Self {
        Self::DuplicateKey(msg.into())
    }

    pub fn query_error(msg: impl Into<String>) -> Self {
        let error = Self::QueryError(msg.into());
        error!("{}", error.format_message());
        error
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        let error = Self::InternalError(msg.into());
        error!("{}", error.format_message());
        error
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateKey(_))
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_message())
    }
}

impl std::error::Error for StorageError {}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return Self::duplicate_key(db_err.to_string());
            }
        }
        Self::query_error(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal_error(format!("Document decode failed: {}", err))
    }
}
