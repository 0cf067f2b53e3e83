use log::error;
use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum RepositoryError {
    QueryError(String),
    ValidationError(String),
    InternalError(String),
}

impl RepositoryError {
    fn format_message(&self) -> String {
        match self {
            Self::QueryError(msg) => format!("Query error: {}", msg),
            Self::ValidationError(msg) => format!("Validation error: {}", msg),
            Self::InternalError(msg) => format!("Internal error: {}", msg),
        }
    }

    pub fn query_error(msg: impl Into<String>) -> Self {
        let error = Self::QueryError(msg.into());
        error!("{}", error.format_message());
        error
    }

    pub fn validation_error(msg: impl Into<String>) -> Self {
        let error = Self::ValidationError(msg.into());
        error!("{}", error.format_message());
        error
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        let error = Self::InternalError(msg.into());
        error!("{}", error.format_message());
        error
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_message())
    }
}

impl Error for RepositoryError {}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        Self::query_error(err.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal_error(format!("Document decode failed: {}", err))
    }
}
