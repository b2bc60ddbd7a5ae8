//! In-process backend

use crate::backend::{stale_write, StoreBackend, WriteBatch, WriteOp};
use fitsync_core::{AppError, Cursor, Entity, EntityId, EntityKind, EntityRef};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    records: HashMap<EntityKind, BTreeMap<EntityId, Entity>>,
    cursor: Cursor,
}

/// Map-backed store with the same semantics as the SQLite backend.
///
/// Nothing survives the process. `fail_next_write` makes the next batch
/// fail before any record changes, which is how crash atomicity is
/// exercised in tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    fail_next: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `apply` or `set_cursor` fail with a database error
    pub fn fail_next_write(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of stored records of a kind
    pub fn count(&self, kind: EntityKind) -> Result<usize, AppError> {
        let tables = self.lock()?;
        Ok(tables.records.get(&kind).map_or(0, BTreeMap::len))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, AppError> {
        self.tables.lock().map_err(|_| AppError::InternalError {
            message: "Lock poisoned".to_string(),
        })
    }

    fn injected_failure(&self) -> Result<(), AppError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AppError::DatabaseError {
                message: "Injected write failure".to_string(),
                source: None,
            });
        }
        Ok(())
    }
}

impl Tables {
    fn get(&self, entity: &EntityRef) -> Option<&Entity> {
        self.records
            .get(&entity.kind)
            .and_then(|table| table.get(&entity.id))
    }
}

/// Net effect of a batch on the records it touches; `None` is a purge
type Staged = BTreeMap<EntityRef, Option<Entity>>;

fn stage_op(tables: &Tables, staged: &mut Staged, op: WriteOp) -> Result<(), AppError> {
    match op {
        WriteOp::Upsert(entity) => {
            let target = entity.entity_ref();
            let current = match staged.get(&target) {
                Some(pending) => pending.as_ref(),
                None => tables.get(&target),
            };
            if let Some(stored) = current {
                if entity.last_modified_at() < stored.last_modified_at() {
                    return Err(stale_write(&entity, stored.last_modified_at().as_millis()));
                }
            }
            staged.insert(target, Some(entity));
        }
        WriteOp::Purge(target) => {
            staged.insert(target, None);
        }
    }
    Ok(())
}

impl StoreBackend for MemoryBackend {
    async fn get(&self, entity: &EntityRef) -> Result<Option<Entity>, AppError> {
        let tables = self.lock()?;
        Ok(tables
            .records
            .get(&entity.kind)
            .and_then(|table| table.get(&entity.id))
            .cloned())
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<Entity>, AppError> {
        let tables = self.lock()?;
        Ok(tables
            .records
            .get(&kind)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_pending(&self, kind: EntityKind) -> Result<Vec<Entity>, AppError> {
        let tables = self.lock()?;
        Ok(tables
            .records
            .get(&kind)
            .map(|table| {
                table
                    .values()
                    .filter(|e| e.sync_status().is_pending())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn apply(&self, batch: WriteBatch) -> Result<(), AppError> {
        self.injected_failure()?;

        let mut tables = self.lock()?;
        // Nothing is written until every op has been checked
        let mut staged = Staged::new();
        for op in batch.into_ops() {
            stage_op(&tables, &mut staged, op)?;
        }

        for (target, entity) in staged {
            match entity {
                Some(entity) => {
                    tables
                        .records
                        .entry(target.kind)
                        .or_default()
                        .insert(target.id, entity);
                }
                None => {
                    if let Some(table) = tables.records.get_mut(&target.kind) {
                        table.remove(&target.id);
                    }
                }
            }
        }
        Ok(())
    }

    async fn cursor(&self) -> Result<Cursor, AppError> {
        Ok(self.lock()?.cursor)
    }

    async fn set_cursor(&self, cursor: Cursor) -> Result<(), AppError> {
        self.injected_failure()?;
        self.lock()?.cursor = cursor;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitsync_core::{Exercise, SyncStatus, Timestamp};

    fn exercise_at(millis: i64) -> Exercise {
        let mut exercise = Exercise::new("Squat");
        exercise.meta.last_modified_at = Timestamp::from_millis(millis);
        exercise
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let backend = MemoryBackend::new();
        let exercise = exercise_at(10);
        let target = Entity::from(exercise.clone()).entity_ref();

        backend.apply(WriteBatch::single(exercise.into())).await.unwrap();

        let stored = backend.get(&target).await.unwrap().unwrap();
        assert_eq!(stored.entity_ref(), target);
        assert_eq!(backend.count(EntityKind::Exercise).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stale_upsert_rejected() {
        let backend = MemoryBackend::new();
        let newer = exercise_at(20);
        let mut older = newer.clone();
        older.meta.last_modified_at = Timestamp::from_millis(10);
        older.name = "Old".to_string();

        backend.apply(WriteBatch::single(newer.clone().into())).await.unwrap();
        let err = backend
            .apply(WriteBatch::single(older.into()))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::StaleWrite { incoming: 10, stored: 20, .. }));
        let stored = backend
            .get(&Entity::from(newer.clone()).entity_ref())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, Entity::from(newer));
    }

    #[tokio::test]
    async fn test_equal_timestamp_overwrites() {
        let backend = MemoryBackend::new();
        let mut exercise = exercise_at(20);
        exercise.meta.sync_status = SyncStatus::PendingUpdate;
        backend.apply(WriteBatch::single(exercise.clone().into())).await.unwrap();

        exercise.meta.sync_status = SyncStatus::Clean;
        backend.apply(WriteBatch::single(exercise.into())).await.unwrap();

        assert!(backend
            .list_pending(EntityKind::Exercise)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_batch_is_atomic_on_stale_op() {
        let backend = MemoryBackend::new();
        let stored = exercise_at(50);
        backend.apply(WriteBatch::single(stored.clone().into())).await.unwrap();

        let fresh = exercise_at(1);
        let mut stale = stored.clone();
        stale.meta.last_modified_at = Timestamp::from_millis(40);

        let mut batch = WriteBatch::new();
        batch.upsert(fresh.into()).upsert(stale.into());
        assert!(backend.apply(batch).await.is_err());

        assert_eq!(backend.count(EntityKind::Exercise).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_batch_sees_its_own_earlier_ops() {
        let backend = MemoryBackend::new();
        let stored = exercise_at(50);
        let target = Entity::from(stored.clone()).entity_ref();
        backend.apply(WriteBatch::single(stored.clone().into())).await.unwrap();

        // Purged first, so an older copy may take its place
        let mut older = stored.clone();
        older.meta.last_modified_at = Timestamp::from_millis(10);
        let mut batch = WriteBatch::new();
        batch.purge(target.clone()).upsert(older.into());
        backend.apply(batch).await.unwrap();
        let current = backend.get(&target).await.unwrap().unwrap();
        assert_eq!(current.last_modified_at().as_millis(), 10);

        let mut newer = stored.clone();
        newer.meta.last_modified_at = Timestamp::from_millis(70);
        let mut between = stored;
        between.meta.last_modified_at = Timestamp::from_millis(60);
        let mut batch = WriteBatch::new();
        batch.upsert(newer.into()).upsert(between.into());
        let err = backend.apply(batch).await.unwrap_err();

        assert!(matches!(err, AppError::StaleWrite { incoming: 60, stored: 70, .. }));
        let current = backend.get(&target).await.unwrap().unwrap();
        assert_eq!(current.last_modified_at().as_millis(), 10);
    }

    #[tokio::test]
    async fn test_injected_failure_changes_nothing() {
        let backend = MemoryBackend::new();
        backend.fail_next_write();

        let result = backend.apply(WriteBatch::single(exercise_at(1).into())).await;
        assert!(matches!(result, Err(AppError::DatabaseError { .. })));
        assert_eq!(backend.count(EntityKind::Exercise).unwrap(), 0);

        // Only the next write fails
        backend.apply(WriteBatch::single(exercise_at(1).into())).await.unwrap();
        assert_eq!(backend.count(EntityKind::Exercise).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_and_pending_listing() {
        let backend = MemoryBackend::new();
        let mut pending = exercise_at(5);
        pending.meta.sync_status = SyncStatus::PendingCreate;
        let clean = exercise_at(6);

        let mut batch = WriteBatch::new();
        batch.upsert(pending.clone().into()).upsert(clean.into());
        backend.apply(batch).await.unwrap();

        let listed = backend.list_pending(EntityKind::Exercise).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id(), &pending.meta.id);

        let target = Entity::from(pending).entity_ref();
        let mut purge = WriteBatch::new();
        purge.purge(target.clone()).purge(target.clone());
        backend.apply(purge).await.unwrap();

        assert!(backend.get(&target).await.unwrap().is_none());
        assert_eq!(backend.list(EntityKind::Exercise).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cursor_roundtrip() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.cursor().await.unwrap(), Cursor::START);

        backend.set_cursor(Cursor::from_raw(99)).await.unwrap();
        assert_eq!(backend.cursor().await.unwrap().as_raw(), 99);
    }
}
