//! Error types for offline-catalog
//!
//! The library distinguishes between:
//! - Local cache failures ([`DatabaseError`])
//! - Download record lifecycle violations ([`DownloadError`])
//! - Failures expanding a download request into concrete ids ([`ExpansionError`])
//! - Transport and API failures from the content service
//!
//! Background paths (sequencer, engine events, boundary fetches) never propagate
//! these across component boundaries; they record them on the `UiState` or on the
//! affected download record and log them.

use crate::types::DownloadState;
use thiserror::Error;

/// Result type alias for offline-catalog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for offline-catalog
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "page_size")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Network error talking to the content API
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Content API answered with a non-success status
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Download record lifecycle error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// A download request could not be expanded into download ids
    #[error("expansion error: {0}")]
    Expansion(#[from] ExpansionError),

    /// The transfer engine rejected a request
    #[error("transfer engine error: {0}")]
    Engine(String),

    /// Record not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Download-related errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Download not found in the local cache
    #[error("download {id} not found")]
    NotFound {
        /// The download id that was not found
        id: String,
    },

    /// The requested state change is not an edge of the download state machine
    #[error("download {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        /// The download id
        id: String,
        /// Current persisted state
        from: DownloadState,
        /// Requested state
        to: DownloadState,
    },

    /// Cannot perform operation in current state
    #[error("cannot {operation} download {id} in state {current_state:?}")]
    InvalidState {
        /// The download id
        id: String,
        /// The operation that was attempted (e.g., "pause", "remove")
        operation: String,
        /// The current state that prevents the operation
        current_state: DownloadState,
    },
}

/// Errors produced while expanding a download request
#[derive(Debug, Error)]
pub enum ExpansionError {
    /// Content detail could not be fetched and is not cached
    #[error("content {content_id} detail unavailable: {reason}")]
    DetailUnavailable {
        /// The requested content id
        content_id: String,
        /// Underlying failure
        reason: String,
    },

    /// The content type is not downloadable
    #[error("content {content_id} has unrecognized type {content_type}")]
    UnrecognizedType {
        /// The requested content id
        content_id: String,
        /// Raw type tag
        content_type: String,
    },

    /// An explicit episode id does not belong to the collection
    #[error("episode {episode_id} is not part of collection {content_id}")]
    UnknownEpisode {
        /// The collection id
        content_id: String,
        /// The requested episode id
        episode_id: String,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_context() {
        let err = Error::from(DownloadError::InvalidTransition {
            id: "42".to_string(),
            from: DownloadState::Completed,
            to: DownloadState::InProgress,
        });
        assert_eq!(
            err.to_string(),
            "download error: download 42 cannot move from Completed to InProgress"
        );

        let err = Error::config("page_size", "must be at least 1");
        assert!(matches!(err, Error::Config { key: Some(ref k), .. } if k == "page_size"));
    }

    #[test]
    fn test_expansion_error_display() {
        let err = ExpansionError::UnrecognizedType {
            content_id: "7".to_string(),
            content_type: "podcast".to_string(),
        };
        assert_eq!(err.to_string(), "content 7 has unrecognized type podcast");
    }
}
