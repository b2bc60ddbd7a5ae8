//! Domain types for FitSync
//!
//! This module contains all domain models organized by responsibility:
//! - `sync`: Identifiers, entity kinds and sync metadata
//! - `user`, `exercise`, `workout`, `assignment`: Synchronized records
//! - `entity`: The closed `Entity` enum over all records
//! - `clock`: Timestamp sources for local mutations
//! - `common`: Shared traits and utilities

mod assignment;
mod clock;
mod common;
mod entity;
mod exercise;
mod sync;
mod user;
mod workout;

// Re-export all public types
pub use assignment::{Assignment, AssignmentStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use common::{Timestamp, Validator};
pub use entity::Entity;
pub use exercise::Exercise;
pub use sync::{Cursor, EntityId, EntityKind, EntityRef, OperationKind, SyncMeta, SyncStatus};
pub use user::{User, UserRole};
pub use workout::{Workout, WorkoutExercise};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_types_are_exported() {
        let trainer = User::new("Sam", "sam@gym.io", UserRole::Trainer);
        let exercise = Exercise::new("Deadlift").created_by(&trainer.meta.id);
        let workout = Workout::new("Pull").owned_by(&trainer.meta.id);
        let item: WorkoutExercise = workout.item(&exercise.meta.id, 0);
        let _assignment = Assignment::new(
            &trainer.meta.id,
            &trainer.meta.id,
            &exercise.meta.id,
            1,
            1,
        );
        let _entity: Entity = item.into();
        let _cursor = Cursor::START;
    }

    #[test]
    fn test_new_entities_start_clean_at_epoch() {
        let user = User::new("Sam", "sam@gym.io", UserRole::Trainer);
        assert_eq!(user.meta.sync_status, SyncStatus::Clean);
        assert_eq!(user.meta.last_modified_at, Timestamp::EPOCH);
        assert!(!user.meta.is_deleted);
    }
}
