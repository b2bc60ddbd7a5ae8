//! Assignment domain model

use crate::error::AppError;
use crate::types::common::collect;
use crate::types::{EntityId, SyncMeta, Timestamp, Validator};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of an assignment: assigned, completed, submitted, reviewed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    #[default]
    Assigned,
    Completed,
    Submitted,
    Reviewed,
}

impl AssignmentStatus {
    /// The only status this one may move to
    pub fn next(&self) -> Option<AssignmentStatus> {
        match self {
            AssignmentStatus::Assigned => Some(AssignmentStatus::Completed),
            AssignmentStatus::Completed => Some(AssignmentStatus::Submitted),
            AssignmentStatus::Submitted => Some(AssignmentStatus::Reviewed),
            AssignmentStatus::Reviewed => None,
        }
    }

    pub fn can_transition_to(&self, target: AssignmentStatus) -> bool {
        self.next() == Some(target)
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Submitted => "submitted",
            AssignmentStatus::Reviewed => "reviewed",
        };
        write!(f, "{}", name)
    }
}

/// An exercise prescribed by a trainer to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    #[serde(flatten)]
    pub meta: SyncMeta,
    #[serde(default)]
    pub client_id: Option<EntityId>,
    #[serde(default)]
    pub exercise_id: Option<EntityId>,
    #[serde(default)]
    pub trainer_id: Option<EntityId>,
    pub sets: u32,
    pub reps: u32,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub status: AssignmentStatus,
    #[serde(default)]
    pub due_date: Option<Timestamp>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
}

impl Assignment {
    /// Creates an assignment in the `assigned` state
    pub fn new(
        trainer: &EntityId,
        client: &EntityId,
        exercise: &EntityId,
        sets: u32,
        reps: u32,
    ) -> Self {
        Self {
            meta: SyncMeta::new(),
            client_id: Some(client.clone()),
            exercise_id: Some(exercise.clone()),
            trainer_id: Some(trainer.clone()),
            sets,
            reps,
            weight: None,
            status: AssignmentStatus::Assigned,
            due_date: None,
            video_url: None,
            feedback: None,
        }
    }

    /// Sets the due date
    pub fn due(mut self, at: Timestamp) -> Self {
        self.due_date = Some(at);
        self
    }

    /// Client marks the exercise as done
    pub fn complete(&mut self) -> crate::Result<()> {
        self.transition(AssignmentStatus::Completed)
    }

    /// Client attaches the proof video
    pub fn submit(&mut self, video_url: impl Into<String>) -> crate::Result<()> {
        let url = video_url.into();
        if url.trim().is_empty() {
            return Err(AppError::InvalidArgument {
                argument: "video_url".to_string(),
                reason: "Submission requires a video URL".to_string(),
            });
        }
        self.transition(AssignmentStatus::Submitted)?;
        self.video_url = Some(url);
        Ok(())
    }

    /// Trainer reviews the submission
    pub fn review(&mut self, feedback: impl Into<String>) -> crate::Result<()> {
        self.transition(AssignmentStatus::Reviewed)?;
        self.feedback = Some(feedback.into());
        Ok(())
    }

    fn transition(&mut self, target: AssignmentStatus) -> crate::Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(AppError::InvalidStateTransition {
                entity: format!("Assignment {}", self.meta.id),
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        Ok(())
    }
}

impl Validator for Assignment {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

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

        if self.status >= AssignmentStatus::Submitted && self.video_url.is_none() {
            errors.push("Submitted assignment must have a video URL".to_string());
        }

        collect(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Assignment {
        Assignment::new(
            &EntityId::generate(),
            &EntityId::generate(),
            &EntityId::generate(),
            3,
            10,
        )
    }

    #[test]
    fn test_full_lifecycle() {
        let mut assignment = sample();
        assignment.complete().unwrap();
        assignment.submit("https://cdn.example/proof.mp4").unwrap();
        assignment.review("Great depth").unwrap();

        assert_eq!(assignment.status, AssignmentStatus::Reviewed);
        assert_eq!(assignment.feedback.as_deref(), Some("Great depth"));
        assert!(assignment.is_valid());
    }

    #[test]
    fn test_cannot_skip_steps() {
        let mut assignment = sample();
        let err = assignment.submit("https://cdn.example/proof.mp4").unwrap_err();

        assert!(matches!(err, AppError::InvalidStateTransition { .. }));
        assert_eq!(assignment.status, AssignmentStatus::Assigned);
        assert!(assignment.video_url.is_none());
    }

    #[test]
    fn test_cannot_go_backwards() {
        let mut assignment = sample();
        assignment.complete().unwrap();
        assert!(assignment.complete().is_err());
        assert!(AssignmentStatus::Reviewed.next().is_none());
    }

    #[test]
    fn test_submit_requires_url() {
        let mut assignment = sample();
        assignment.complete().unwrap();
        assert!(matches!(
            assignment.submit(""),
            Err(AppError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_value(AssignmentStatus::Submitted).unwrap();
        assert_eq!(json, "submitted");
    }
}
