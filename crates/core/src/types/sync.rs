//! Sync metadata shared by every entity kind

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Globally unique entity identifier, generated on the client
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Generates a new random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an existing identifier (e.g. one assigned by the server)
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The five synchronized entity kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Exercise,
    Workout,
    WorkoutExercise,
    Assignment,
}

impl EntityKind {
    /// All kinds, referenced kinds before the kinds that reference them
    pub const ALL: [EntityKind; 5] = [
        EntityKind::User,
        EntityKind::Exercise,
        EntityKind::Workout,
        EntityKind::WorkoutExercise,
        EntityKind::Assignment,
    ];

    /// Collection name, used as the table name and the URL path segment
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Exercise => "exercises",
            EntityKind::Workout => "workouts",
            EntityKind::WorkoutExercise => "workout_exercises",
            EntityKind::Assignment => "assignments",
        }
    }

    /// Position in dependency order (0 = nothing referenced)
    pub fn rank(&self) -> usize {
        match self {
            EntityKind::User => 0,
            EntityKind::Exercise => 1,
            EntityKind::Workout => 2,
            EntityKind::WorkoutExercise => 3,
            EntityKind::Assignment => 4,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::User => "User",
            EntityKind::Exercise => "Exercise",
            EntityKind::Workout => "Workout",
            EntityKind::WorkoutExercise => "WorkoutExercise",
            EntityKind::Assignment => "Assignment",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.collection() == s)
            .ok_or_else(|| format!("unknown entity kind '{}'", s))
    }
}

/// Typed pointer to an entity: kind plus id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityRef {
    /// Creates a new entity reference
    pub fn new(kind: EntityKind, id: EntityId) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.collection(), self.id)
    }
}

/// Local mutation kinds tracked for push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Create => write!(f, "create"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// Where an entity stands relative to the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Matches the last version confirmed by the server
    #[default]
    Clean,
    PendingCreate,
    PendingUpdate,
    PendingDelete,
}

impl SyncStatus {
    /// Returns the storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Clean => "clean",
            SyncStatus::PendingCreate => "pending_create",
            SyncStatus::PendingUpdate => "pending_update",
            SyncStatus::PendingDelete => "pending_delete",
        }
    }

    /// Returns true for every status except `Clean`
    pub fn is_pending(&self) -> bool {
        !matches!(self, SyncStatus::Clean)
    }

    /// The operation a pending status will push
    pub fn operation(&self) -> Option<OperationKind> {
        match self {
            SyncStatus::Clean => None,
            SyncStatus::PendingCreate => Some(OperationKind::Create),
            SyncStatus::PendingUpdate => Some(OperationKind::Update),
            SyncStatus::PendingDelete => Some(OperationKind::Delete),
        }
    }

    /// The pending status that records `op`
    pub fn for_operation(op: OperationKind) -> Self {
        match op {
            OperationKind::Create => SyncStatus::PendingCreate,
            OperationKind::Update => SyncStatus::PendingUpdate,
            OperationKind::Delete => SyncStatus::PendingDelete,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clean" => Ok(SyncStatus::Clean),
            "pending_create" => Ok(SyncStatus::PendingCreate),
            "pending_update" => Ok(SyncStatus::PendingUpdate),
            "pending_delete" => Ok(SyncStatus::PendingDelete),
            other => Err(format!("unknown sync status '{}'", other)),
        }
    }
}

/// Fields every entity carries for synchronization.
///
/// `sync_status` is local bookkeeping: it is never sent over the wire and
/// deserializes to `Clean`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMeta {
    pub id: EntityId,
    #[serde(default)]
    pub is_deleted: bool,
    pub last_modified_at: Timestamp,
    #[serde(skip_serializing, default)]
    pub sync_status: SyncStatus,
}

impl SyncMeta {
    /// Metadata for a brand new entity with a generated id
    pub fn new() -> Self {
        Self::with_id(EntityId::generate())
    }

    /// Metadata for an entity with a known id
    pub fn with_id(id: EntityId) -> Self {
        Self {
            id,
            is_deleted: false,
            last_modified_at: Timestamp::EPOCH,
            sync_status: SyncStatus::Clean,
        }
    }

    /// Stamps a mutation at `now`, keeping the timestamp strictly increasing
    pub fn touch(&mut self, now: Timestamp) {
        self.last_modified_at = now.max(self.last_modified_at.successor());
    }
}

impl Default for SyncMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// High-water mark of the last successful pull
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(i64);

impl Cursor {
    /// Cursor that fetches everything
    pub const START: Self = Self(0);

    /// Creates a cursor from its raw value
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw value
    pub fn as_raw(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
