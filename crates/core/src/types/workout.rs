//! Workout and WorkoutExercise domain models

use crate::types::common::collect;
use crate::types::{EntityId, SyncMeta, Timestamp, Validator};
use serde::{Deserialize, Serialize};

/// A training session owning an ordered list of line items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workout {
    #[serde(flatten)]
    pub meta: SyncMeta,
    #[serde(default)]
    pub owner_id: Option<EntityId>,
    pub name: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub performed_at: Option<Timestamp>,
}

impl Workout {
    /// Creates a new workout with a generated id
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: SyncMeta::new(),
            owner_id: None,
            name: name.into(),
            notes: None,
            performed_at: None,
        }
    }

    /// Sets the owning user
    pub fn owned_by(mut self, owner: &EntityId) -> Self {
        self.owner_id = Some(owner.clone());
        self
    }

    /// Records when the workout was performed
    pub fn performed(mut self, at: Timestamp) -> Self {
        self.performed_at = Some(at);
        self
    }

    /// Builds a line item belonging to this workout
    pub fn item(&self, exercise: &EntityId, position: u32) -> WorkoutExercise {
        WorkoutExercise::new(&self.meta.id, exercise, position)
    }
}

impl Validator for Workout {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("Workout name cannot be empty".to_string());
        }

        collect(errors)
    }
}

/// One exercise line inside a workout.
///
/// `workout_id` is required: line items are owned by their workout and go
/// away with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutExercise {
    #[serde(flatten)]
    pub meta: SyncMeta,
    pub workout_id: EntityId,
    #[serde(default)]
    pub exercise_id: Option<EntityId>,
    pub position: u32,
    pub sets: u32,
    pub reps: u32,
    #[serde(default)]
    pub weight: Option<f64>,
}

impl WorkoutExercise {
    /// Creates a line item with one set of one rep
    pub fn new(workout: &EntityId, exercise: &EntityId, position: u32) -> Self {
        Self {
            meta: SyncMeta::new(),
            workout_id: workout.clone(),
            exercise_id: Some(exercise.clone()),
            position,
            sets: 1,
            reps: 1,
            weight: None,
        }
    }

    /// Sets the prescribed volume
    pub fn with_volume(mut self, sets: u32, reps: u32, weight: Option<f64>) -> Self {
        self.sets = sets;
        self.reps = reps;
        self.weight = weight;
        self
    }
}

impl Validator for WorkoutExercise {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.workout_id.as_str().is_empty() {
            errors.push("Workout line item must belong to a workout".to_string());
        }

        if self.sets == 0 {
            errors.push("Sets must be greater than zero".to_string());
        }

        if self.reps == 0 {
            errors.push("Reps must be greater than zero".to_string());
        }

        if let Some(weight) = self.weight {
            if !weight.is_finite() || weight < 0.0 {
                errors.push(format!("Weight {} must be a non-negative number", weight));
            }
        }

        collect(errors)
    }
}
