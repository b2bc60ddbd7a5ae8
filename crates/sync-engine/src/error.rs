// crates/sync-engine/src/error.rs
//! Error types for sync operations

use crate::remote::RemoteError;
use fitsync_core::AppError;
use thiserror::Error;

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during synchronization
#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote unreachable or answered with a transient failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Entity rejected as invalid, locally or by the server
    #[error("Validation failed for {entity}: {message}")]
    Validation { entity: String, message: String },

    /// Server-side optimistic locking conflict
    #[error("Sync conflict: {0}")]
    Conflict(String),

    /// Local store failure, fatal to the running cycle
    #[error("Storage error: {0}")]
    Storage(AppError),

    /// Write older than the stored version
    #[error("Stale write for {entity}: incoming {incoming} < stored {stored}")]
    StaleWrite {
        entity: String,
        incoming: i64,
        stored: i64,
    },

    /// Entity does not exist locally
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not allowed on the entity in its current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Cycle stopped at a phase boundary
    #[error("Sync cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport(_) => true,
            SyncError::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<AppError> for SyncError {
    fn from(error: AppError) -> Self {
        match error {
            AppError::StaleWrite {
                entity,
                incoming,
                stored,
            } => SyncError::StaleWrite {
                entity,
                incoming,
                stored,
            },
            AppError::RecordNotFound { entity, identifier } => {
                SyncError::NotFound(format!("{} {}", entity, identifier))
            }
            AppError::InvalidEntity { entity, reasons } => SyncError::Validation {
                entity,
                message: reasons.join("; "),
            },
            AppError::InvalidStateTransition { entity, from, to } => SyncError::Validation {
                entity,
                message: format!("cannot move from {} to {}", from, to),
            },
            AppError::InvalidArgument { argument, reason } => {
                SyncError::InvalidOperation(format!("{}: {}", argument, reason))
            }
            AppError::Cancelled { .. } => SyncError::Cancelled,
            other => SyncError::Storage(other),
        }
    }
}

impl From<RemoteError> for SyncError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Transport { message, .. } => SyncError::Transport(message),
            RemoteError::Validation(message) => SyncError::Validation {
                entity: "remote".to_string(),
                message,
            },
            RemoteError::NotFound(what) => SyncError::NotFound(what),
            RemoteError::Duplicate(what) => {
                SyncError::Conflict(format!("{} already exists", what))
            }
            RemoteError::Conflict(what) => SyncError::Conflict(what),
            RemoteError::Decode(message) => SyncError::Transport(message),
        }
    }
}
