//! Storage backend abstraction

use fitsync_core::{AppError, Cursor, Entity, EntityKind, EntityRef};
use std::future::Future;

/// A single mutation inside a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert or overwrite, subject to the last-writer-wins guard
    Upsert(Entity),
    /// Physically remove the record; missing records are ignored
    Purge(EntityRef),
}

/// Ordered group of writes that commit atomically
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Batch holding one upsert
    pub fn single(entity: Entity) -> Self {
        let mut batch = Self::new();
        batch.upsert(entity);
        batch
    }

    pub fn upsert(&mut self, entity: Entity) -> &mut Self {
        self.ops.push(WriteOp::Upsert(entity));
        self
    }

    pub fn purge(&mut self, entity: EntityRef) -> &mut Self {
        self.ops.push(WriteOp::Purge(entity));
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Durable keyed storage for entity records.
///
/// Implementations must honor two rules:
/// - an upsert only replaces a stored record when the incoming
///   `last_modified_at` is greater than or equal to the stored one,
///   otherwise the whole batch fails with [`AppError::StaleWrite`];
/// - [`StoreBackend::apply`] is all-or-nothing.
pub trait StoreBackend: Send + Sync + 'static {
    /// Fetches one record, tombstones included
    fn get(
        &self,
        entity: &EntityRef,
    ) -> impl Future<Output = Result<Option<Entity>, AppError>> + Send;

    /// All records of a kind, tombstones included
    fn list(&self, kind: EntityKind) -> impl Future<Output = Result<Vec<Entity>, AppError>> + Send;

    /// Records of a kind whose sync status is not clean
    fn list_pending(
        &self,
        kind: EntityKind,
    ) -> impl Future<Output = Result<Vec<Entity>, AppError>> + Send;

    /// Commits a batch atomically
    fn apply(&self, batch: WriteBatch) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Last persisted pull cursor
    fn cursor(&self) -> impl Future<Output = Result<Cursor, AppError>> + Send;

    fn set_cursor(&self, cursor: Cursor) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Builds the error for an upsert older than what is stored
pub(crate) fn stale_write(incoming: &Entity, stored_millis: i64) -> AppError {
    AppError::StaleWrite {
        entity: incoming.entity_ref().to_string(),
        incoming: incoming.last_modified_at().as_millis(),
        stored: stored_millis,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitsync_core::{EntityId, Workout};

    #[test]
    fn test_batch_builder_keeps_order() {
        let workout = Workout::new("Legs");
        let target = EntityRef::new(EntityKind::Workout, EntityId::generate());

        let mut batch = WriteBatch::single(workout.clone().into());
        batch.purge(target.clone());

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.ops()[0], WriteOp::Upsert(workout.into()));
        assert_eq!(batch.ops()[1], WriteOp::Purge(target));
        assert!(!batch.is_empty());
        assert!(WriteBatch::new().is_empty());
    }
}
