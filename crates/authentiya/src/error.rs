//! Error types for authentiya.
//!
//! This module defines all error types used throughout the authentiya crate.
//! Validation errors carry the message shown to the user; everything else is
//! logged by the recorder and treated as a no-op.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for authentiya operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Session Errors ===
    /// A user action was rejected; the message is meant for the user.
    #[error("{message}")]
    Validation {
        /// User-facing description.
        message: String,
    },

    /// A session is already being tracked.
    #[error("a session is already active; submit or reset it first")]
    SessionAlreadyActive,

    /// The operation needs an active session.
    #[error("no active session")]
    NoActiveSession,

    // === Message Errors ===
    /// An inbound message used a subject or action we do not handle.
    #[error("unknown message: {0}")]
    UnknownMessage(String),

    /// An inbound message had the right shape but bad contents.
    #[error("malformed message '{kind}': {message}")]
    MalformedMessage {
        /// Subject or action of the message.
        kind: String,
        /// Description of what was wrong.
        message: String,
    },

    // === Export Errors ===
    /// Writing the CSV report failed.
    #[error("failed to write report to {path}: {source}")]
    Export {
        /// Path of the report file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Remote Errors ===
    /// An HTTP request could not be completed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote answered with a non-success status.
    #[error("remote {url} answered {status}")]
    RemoteStatus {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for authentiya operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a user-facing validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a malformed message error.
    #[must_use]
    pub fn malformed(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedMessage {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error should be shown to the user as-is.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::SessionAlreadyActive | Self::NoActiveSession
        )
    }

    /// Check if this error came from a malformed or unknown inbound message.
    #[must_use]
    pub fn is_message_error(&self) -> bool {
        matches!(self, Self::UnknownMessage(_) | Self::MalformedMessage { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display_is_user_message() {
        let err = Error::validation("Please select a course");
        assert_eq!(err.to_string(), "Please select a course");
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_session_errors_are_validation_errors() {
        assert!(Error::SessionAlreadyActive.is_validation_error());
        assert!(Error::NoActiveSession.is_validation_error());
        assert!(!Error::internal("boom").is_validation_error());
    }

    #[test]
    fn test_message_errors() {
        let err = Error::UnknownMessage("subject 'nope'".to_string());
        assert!(err.is_message_error());
        assert!(err.to_string().contains("nope"));

        let err = Error::malformed("record_event", "expected 6 fields");
        assert!(err.is_message_error());
        let msg = err.to_string();
        assert!(msg.contains("record_event"));
        assert!(msg.contains("expected 6 fields"));
    }

    #[test]
    fn test_internal_error() {
        let err = Error::internal("something went wrong");
        assert_eq!(err.to_string(), "internal error: something went wrong");
    }

    #[test]
    fn test_remote_status_display() {
        let err = Error::RemoteStatus {
            url: "https://lms.example.edu/api/v1/courses".to_string(),
            status: 401,
        };
        let msg = err.to_string();
        assert!(msg.contains("401"));
        assert!(msg.contains("lms.example.edu"));
    }

    #[test]
    fn test_export_error_display() {
        let err = Error::Export {
            path: PathBuf::from("/tmp/report.csv"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/tmp/report.csv"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "tick_interval_ms must be greater than 0".to_string(),
        };
        assert!(err.to_string().contains("tick_interval_ms"));
    }
}
