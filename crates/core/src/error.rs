//! Error types for the balancing acceptance pipeline.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the balancing acceptance pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid request parameters.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No raw or aggregate data exists for the requested range.
    #[error("No data available between {start} and {end}")]
    Unavailable { start: NaiveDate, end: NaiveDate },

    /// Aggregate cache (database) error.
    #[error("Database error: {0}")]
    Database(String),

    /// The request was cancelled before it completed.
    #[error("Request cancelled")]
    Cancelled,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create an unavailable-range error.
    pub fn unavailable(start: NaiveDate, end: NaiveDate) -> Self {
        Error::Unavailable { start, end }
    }

    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Error::Database(msg.into())
    }

    /// Whether this error is a typed absence of data rather than a failure.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::Unavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_message() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let err = Error::unavailable(start, end);

        assert!(err.is_unavailable());
        assert_eq!(err.to_string(), "No data available between 2024-01-01 and 2024-01-31");
    }

    #[test]
    fn test_validation_is_not_unavailable() {
        assert!(!Error::validation("capacity_mw must be positive").is_unavailable());
    }
}
