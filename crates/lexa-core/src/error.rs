//! Error types for lexa-core

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias using lexa-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in lexa-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport error talking to the remote store
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote store rejected the request
    #[error("Remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// Write to a date whose statistics are frozen
    #[error("Cannot modify historical stats for date {0}")]
    FrozenDate(NaiveDate),

    /// Local storage quota exhausted
    #[error("Storage quota exceeded: {needed} bytes needed, limit is {limit}")]
    QuotaExceeded { needed: usize, limit: usize },

    /// Local document could not be decoded
    #[error("Corrupted local document: {0}")]
    Corrupted(String),
}

impl Error {
    /// Whether the failure may succeed when retried later.
    ///
    /// Frozen-date violations, invalid input, missing entities and local
    /// quota/corruption problems are permanent.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::LibSql(_) | Self::Io(_) | Self::Http(_) | Self::Remote { .. }
        )
    }

    /// Whether the failure is the frozen-date policy violation.
    pub const fn is_frozen_date(&self) -> bool {
        matches!(self, Self::FrozenDate(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frozen_date_is_not_transient() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 13).unwrap();
        let error = Error::FrozenDate(date);
        assert!(!error.is_transient());
        assert!(error.is_frozen_date());
        assert_eq!(
            error.to_string(),
            "Cannot modify historical stats for date 2026-02-13"
        );
    }

    #[test]
    fn remote_errors_are_transient() {
        let error = Error::Remote {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(error.is_transient());
        assert!(!Error::InvalidInput("bad".to_string()).is_transient());
    }
}
