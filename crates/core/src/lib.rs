//! Core domain model for FitSync
//!
//! Entities, identifiers, sync metadata, the clock abstraction and the
//! shared `AppError` type used by the storage and sync crates.

pub mod error;
pub mod types;

// Re-export commonly used types
pub use error::{AppError, ErrorSeverity, RecoveryAction, Result};
pub use types::{
    Assignment, AssignmentStatus, Clock, Cursor, Entity, EntityId, EntityKind, EntityRef,
    Exercise, ManualClock, OperationKind, SyncMeta, SyncStatus, SystemClock, Timestamp, User,
    UserRole, Validator, Workout, WorkoutExercise,
};
