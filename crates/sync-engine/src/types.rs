// crates/sync-engine/src/types.rs
//! Core sync types and data structures

use fitsync_core::{Cursor, EntityRef, OperationKind, Timestamp};
use serde::{Deserialize, Serialize};

/// Phase of the sync coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Pushing,
    Pulling,
    Resolving,
    /// Transport failure during push or pull; the next cycle starts from Idle
    Failed,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::Pushing => write!(f, "pushing"),
            SyncState::Pulling => write!(f, "pulling"),
            SyncState::Resolving => write!(f, "resolving"),
            SyncState::Failed => write!(f, "failed"),
        }
    }
}

/// Who produced a write to the local store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A user edit; recorded in the change journal
    Local,
    /// A version confirmed by or received from the server
    Remote,
}

/// One entity that could not be pushed in a cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityFailure {
    pub entity: EntityRef,
    pub operation: Option<OperationKind>,
    pub message: String,
}

impl EntityFailure {
    pub fn new(entity: EntityRef, operation: Option<OperationKind>, message: impl Into<String>) -> Self {
        Self {
            entity,
            operation,
            message: message.into(),
        }
    }
}

/// Outcome of one sync cycle, handed to the UI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    /// Entities confirmed by the server
    pub pushed: usize,
    /// Remote versions applied locally
    pub pulled: usize,
    /// Records physically removed
    pub purged: usize,
    /// Entities that stayed pending because the push failed
    pub failures: Vec<EntityFailure>,
    /// Local edits discarded in favor of a newer remote version
    pub superseded: Vec<EntityRef>,
    /// Workout deletes held back while children still exist
    pub deferred: Vec<EntityRef>,
    /// Cursor after the cycle
    pub cursor: Cursor,
    /// Set when push or pull was aborted by a transport failure
    pub transport_error: Option<String>,
    pub cancelled: bool,
}

impl SyncReport {
    pub(crate) fn started(at: Timestamp, cursor: Cursor) -> Self {
        Self {
            started_at: at,
            finished_at: at,
            cursor,
            ..Default::default()
        }
    }

    /// True when nothing failed and nothing was aborted
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.transport_error.is_none() && !self.cancelled
    }
}

/// Notifications broadcast while cycles run
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    StateChanged(SyncState),
    EntityFailed(EntityFailure),
    Superseded(EntityRef),
    CycleCompleted(SyncReport),
    CycleFailed { message: String },
}

/// Result of asking for a sync cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed(SyncReport),
    /// Stopped at a phase boundary; the cursor was not advanced
    Cancelled(SyncReport),
    /// Another cycle is in flight
    AlreadyRunning,
}

impl CycleOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            CycleOutcome::Completed(report) | CycleOutcome::Cancelled(report) => Some(report),
            CycleOutcome::AlreadyRunning => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitsync_core::{EntityId, EntityKind};

    #[test]
    fn test_default_state_is_idle() {
        assert_eq!(SyncState::default(), SyncState::Idle);
        assert_eq!(SyncState::Resolving.to_string(), "resolving");
    }

    #[test]
    fn test_report_cleanliness() {
        let mut report = SyncReport::started(Timestamp::from_millis(10), Cursor::START);
        assert!(report.is_clean());

        report.failures.push(EntityFailure::new(
            EntityRef::new(EntityKind::User, EntityId::generate()),
            Some(OperationKind::Create),
            "email is invalid",
        ));
        assert!(!report.is_clean());
    }

    #[test]
    fn test_outcome_report() {
        let report = SyncReport::default();
        assert_eq!(
            CycleOutcome::Completed(report.clone()).report(),
            Some(&report)
        );
        assert!(CycleOutcome::AlreadyRunning.report().is_none());
    }
}
