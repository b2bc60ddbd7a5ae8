//! Error types and recovery strategies for FitSync
//!
//! This module provides a comprehensive error handling system with three severity tiers:
//! - **Recoverable**: Can be automatically retried (locked database)
//! - **Degraded**: The current operation fails but the app continues (rejected payload)
//! - **Fatal**: Local durability is compromised (corrupted database, failed migration)
//!
//! Each error includes a recovery action to guide automatic error handling.

use std::fmt;
use std::io;
use thiserror::Error;

/// Recovery actions that can be taken when an error occurs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Retry with exponential backoff (e.g., database locked by another connection)
    RetryWithBackoff,
    /// Drop the local edit and keep the stored version
    DiscardChange,
    /// Attempt to repair the database and retry
    RepairDatabase,
    /// No automatic recovery - user intervention required
    UserIntervention,
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetryWithBackoff => write!(f, "Retrying with backoff"),
            Self::DiscardChange => write!(f, "Discarding change"),
            Self::RepairDatabase => write!(f, "Repairing database"),
            Self::UserIntervention => write!(f, "User intervention required"),
        }
    }
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Error can be automatically recovered from
    Recoverable,
    /// Operation failed but app can continue
    Degraded,
    /// Critical error, local data durability is at risk
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recoverable => write!(f, "Recoverable"),
            Self::Degraded => write!(f, "Degraded"),
            Self::Fatal => write!(f, "Fatal"),
        }
    }
}

/// Main error type for FitSync
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Database Errors =====
    /// Database operation failed
    #[error("Database error: {message}")]
    DatabaseError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database is corrupted and needs repair
    #[error("Database corrupted: {details}")]
    DatabaseCorrupted { details: String },

    /// Database migration failed
    #[error("Migration failed: {version} - {reason}")]
    MigrationFailed { version: String, reason: String },

    /// Database is locked by another process
    #[error("Database locked: {operation}")]
    DatabaseLocked { operation: String },

    /// Record not found in database
    #[error("Record not found: {entity} with {identifier}")]
    RecordNotFound { entity: String, identifier: String },

    /// Write rejected because the stored record is newer
    #[error("Stale write rejected for {entity}: incoming {incoming} < stored {stored}")]
    StaleWrite {
        entity: String,
        incoming: i64,
        stored: i64,
    },

    // ===== Entity Errors =====
    /// Entity failed validation
    #[error("Invalid {entity}: {}", .reasons.join("; "))]
    InvalidEntity { entity: String, reasons: Vec<String> },

    /// Status lifecycle does not allow this transition
    #[error("Invalid transition for {entity}: {from} -> {to}")]
    InvalidStateTransition {
        entity: String,
        from: String,
        to: String,
    },

    // ===== File System Errors =====
    /// General I/O error
    #[error("I/O error: {message}")]
    IoError {
        message: String,
        #[source]
        source: io::Error,
    },

    // ===== Serialization Errors =====
    /// Stored or received payload could not be (de)serialized
    #[error("Serialization error: {message}")]
    SerializationError {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    // ===== Generic Errors =====
    /// Generic internal error
    #[error("Internal error: {message}")]
    InternalError { message: String },

    /// Operation cancelled by user
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    /// Invalid argument provided
    #[error("Invalid argument: {argument} - {reason}")]
    InvalidArgument { argument: String, reason: String },
}

impl AppError {
    /// Returns the severity level of this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::DatabaseLocked { .. } => ErrorSeverity::Recoverable,

            Self::DatabaseCorrupted { .. }
            | Self::MigrationFailed { .. }
            | Self::DatabaseError { .. }
            | Self::IoError { .. } => ErrorSeverity::Fatal,

            _ => ErrorSeverity::Degraded,
        }
    }

    /// Returns the recommended recovery action for this error
    pub fn recovery_action(&self) -> RecoveryAction {
        match self {
            Self::DatabaseLocked { .. } => RecoveryAction::RetryWithBackoff,

            Self::DatabaseCorrupted { .. } | Self::MigrationFailed { .. } => {
                RecoveryAction::RepairDatabase
            }

            Self::StaleWrite { .. } => RecoveryAction::DiscardChange,

            _ => RecoveryAction::UserIntervention,
        }
    }

    /// Returns a user-friendly error message suitable for display in the UI
    pub fn user_message(&self) -> String {
        match self {
            Self::DatabaseError { .. } | Self::DatabaseLocked { .. } => {
                "Local storage is temporarily unavailable. Please try again.".to_string()
            }
            Self::DatabaseCorrupted { .. } => {
                "The app's local data is damaged and needs repair.".to_string()
            }
            Self::MigrationFailed { .. } => {
                "Failed to update the app's local storage.".to_string()
            }
            Self::RecordNotFound { .. } => "The requested item was not found.".to_string(),
            Self::StaleWrite { .. } => {
                "This item was changed elsewhere. Showing the latest version.".to_string()
            }
            Self::InvalidEntity { reasons, .. } => match reasons.first() {
                Some(first) => format!("Please check your input: {}", first),
                None => "Please check your input.".to_string(),
            },
            Self::InvalidStateTransition { to, .. } => {
                format!("This item cannot be marked as {} yet.", to)
            }
            Self::IoError { .. } => "A file operation failed. Please try again.".to_string(),
            Self::SerializationError { .. } => {
                "Received data in an unexpected format.".to_string()
            }
            Self::InternalError { .. } => {
                "An unexpected error occurred. Please try again.".to_string()
            }
            Self::Cancelled { .. } => "Operation was cancelled.".to_string(),
            Self::InvalidArgument { .. } => "Invalid input provided.".to_string(),
        }
    }

    /// Returns true if this error should be logged at ERROR level
    pub fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Fatal
    }

    /// Returns true if this error can be automatically retried
    pub fn is_retryable(&self) -> bool {
        self.recovery_action() == RecoveryAction::RetryWithBackoff
    }

    /// Helper to create a database error from any error type
    pub fn database<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::DatabaseError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Helper to create a serialization error
    pub fn serialization(message: impl Into<String>, source: serde_json::Error) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        Self::IoError {
            message: err.to_string(),
            source: err,
        }
    }
}
