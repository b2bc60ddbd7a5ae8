// crates/sync-engine/src/store.rs
//! Local store facade: entity writes, soft deletes, journal and index upkeep

use crate::conflict::{LwwResolver, Resolution};
use crate::error::{SyncError, SyncResult};
use crate::index::ReferenceIndex;
use crate::journal::{ChangeJournal, JournalEntry};
use crate::types::Origin;
use fitsync_core::{
    Assignment, Clock, Cursor, Entity, EntityId, EntityKind, EntityRef, OperationKind, SyncStatus,
    Timestamp, User, WorkoutExercise,
};
use fitsync_database::{StoreBackend, WriteBatch, WriteOp};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-id lock table size above which idle locks are dropped
const LOCK_TABLE_PRUNE_AT: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalWrite {
    Create,
    Update,
    Put,
}

/// What happened to a pushed entity once the server confirmed it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushConfirmation {
    /// Local record now matches the server
    Clean,
    /// Confirmed delete, record removed
    Purged,
    /// Edited or deleted while the push was in flight
    StillPending,
    /// Record vanished while the push was in flight
    Missing,
}

/// Effect of applying one pulled entity
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RemoteApplied {
    pub applied: bool,
    pub purged: usize,
    pub superseded: Vec<EntityRef>,
}

/// The entity store the UI and the sync coordinator share.
///
/// Writes to one entity id are serialized; a write also locks the entities
/// it references so it cannot race a delete of one of them. Multi-record
/// changes commit as one backend batch, and the journal and reference index
/// are only touched after that batch succeeded.
pub struct LocalStore<B: StoreBackend> {
    backend: B,
    journal: ChangeJournal,
    index: Mutex<ReferenceIndex>,
    locks: Mutex<HashMap<EntityRef, Arc<AsyncMutex<()>>>>,
    clock: Arc<dyn Clock>,
}

impl<B: StoreBackend> LocalStore<B> {
    /// Opens the store, rebuilding the reference index and the change
    /// journal from what the backend holds.
    pub async fn open(backend: B, clock: Arc<dyn Clock>) -> SyncResult<Self> {
        let store = Self {
            backend,
            journal: ChangeJournal::new(),
            index: Mutex::new(ReferenceIndex::new()),
            locks: Mutex::new(HashMap::new()),
            clock,
        };

        let mut pending = Vec::new();
        let mut total = 0;
        for kind in EntityKind::ALL {
            let records = store.backend.list(kind).await?;
            total += records.len();

            let mut index = store.index()?;
            for entity in &records {
                index.insert(entity);
                if let Some(op) = entity.sync_status().operation() {
                    pending.push((entity.entity_ref(), op));
                }
            }
        }

        let journaled = store.journal.rebuild(pending)?;
        log::info!(
            "Opened local store: {} records, {} pending changes",
            total,
            journaled
        );
        Ok(store)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn journal(&self) -> &ChangeJournal {
        &self.journal
    }

    /// Current time according to the store's clock
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn index(&self) -> SyncResult<std::sync::MutexGuard<'_, ReferenceIndex>> {
        self.index
            .lock()
            .map_err(|_| SyncError::Internal("Lock poisoned".to_string()))
    }

    /// Fetches a record, tombstones included
    pub async fn get(&self, entity: &EntityRef) -> SyncResult<Option<Entity>> {
        Ok(self.backend.get(entity).await?)
    }

    /// Live (not deleted) records of `kind` matching `predicate`
    pub async fn query<P>(&self, kind: EntityKind, predicate: P) -> SyncResult<Vec<Entity>>
    where
        P: Fn(&Entity) -> bool,
    {
        let records = self.backend.list(kind).await?;
        Ok(records
            .into_iter()
            .filter(|entity| !entity.is_deleted() && predicate(entity))
            .collect())
    }

    /// Records of `kind` with unpushed changes
    pub async fn pending(&self, kind: EntityKind) -> SyncResult<Vec<Entity>> {
        Ok(self.backend.list_pending(kind).await?)
    }

    /// Upserts a record.
    ///
    /// `Origin::Local` writes are rejected when older than the stored copy,
    /// otherwise restamped with the clock, marked pending and journaled.
    /// `Origin::Remote` writes go through [`LwwResolver`] exactly like a
    /// pulled version: a pending local copy at the same or a later time is
    /// kept and `StaleWrite` is returned.
    pub async fn put(&self, entity: Entity, origin: Origin) -> SyncResult<Entity> {
        match origin {
            Origin::Local => self.write_local(entity, LocalWrite::Put).await,
            Origin::Remote => {
                let target = entity.entity_ref();
                let _guards = self.lock_all(&BTreeSet::from([target.clone()])).await?;

                let stored = self.backend.get(&target).await?;
                if let Some(existing) = &stored {
                    if LwwResolver.resolve(Some(existing), &entity) == Resolution::KeepLocal {
                        return Err(SyncError::StaleWrite {
                            entity: target.to_string(),
                            incoming: entity.last_modified_at().as_millis(),
                            stored: existing.last_modified_at().as_millis(),
                        });
                    }
                }

                let mut entity = entity;
                entity.meta_mut().sync_status = SyncStatus::Clean;
                self.commit(WriteBatch::single(entity.clone()), Vec::new())
                    .await?;
                self.journal.discard(&target)?;
                Ok(entity)
            }
        }
    }

    /// Stores a new entity as `PendingCreate`, stamped with the clock
    pub async fn create(&self, entity: impl Into<Entity>) -> SyncResult<Entity> {
        self.write_local(entity.into(), LocalWrite::Create).await
    }

    /// Stores a changed entity, stamped with the clock.
    ///
    /// An entity that was never pushed stays `PendingCreate`.
    pub async fn update(&self, entity: impl Into<Entity>) -> SyncResult<Entity> {
        self.write_local(entity.into(), LocalWrite::Update).await
    }

    async fn write_local(&self, mut entity: Entity, mode: LocalWrite) -> SyncResult<Entity> {
        let target = entity.entity_ref();
        if entity.is_deleted() {
            return Err(SyncError::InvalidOperation(format!(
                "{} is marked deleted, use mark_deleted",
                target
            )));
        }

        let mut wanted: BTreeSet<EntityRef> = entity.references().into_iter().collect();
        wanted.insert(target.clone());
        let _guards = self.lock_all(&wanted).await?;

        let stored = self.backend.get(&target).await?;
        let operation = match (&stored, mode) {
            (Some(_), LocalWrite::Create) => {
                return Err(SyncError::InvalidOperation(format!(
                    "{} already exists",
                    target
                )))
            }
            (None, LocalWrite::Update) => return Err(SyncError::NotFound(target.to_string())),
            (Some(existing), _) if existing.is_deleted() => {
                return Err(SyncError::InvalidOperation(format!(
                    "{} has been deleted",
                    target
                )))
            }
            (Some(_), _) => OperationKind::Update,
            (None, _) => OperationKind::Create,
        };

        let now = self.clock.now();
        let meta = entity.meta_mut();
        match (&stored, mode) {
            (Some(existing), LocalWrite::Put) => {
                if meta.last_modified_at < existing.last_modified_at() {
                    return Err(SyncError::StaleWrite {
                        entity: target.to_string(),
                        incoming: meta.last_modified_at.as_millis(),
                        stored: existing.last_modified_at().as_millis(),
                    });
                }
                meta.touch(now);
            }
            (Some(existing), _) => {
                meta.last_modified_at = existing.last_modified_at();
                meta.touch(now);
            }
            (None, _) => meta.touch(now),
        }
        meta.sync_status = match &stored {
            Some(existing) if existing.sync_status() == SyncStatus::PendingCreate => {
                SyncStatus::PendingCreate
            }
            Some(_) => SyncStatus::PendingUpdate,
            None => SyncStatus::PendingCreate,
        };

        entity.check()?;
        for reference in entity.references() {
            if let Some(referenced) = self.backend.get(&reference).await? {
                if referenced.is_deleted() {
                    return Err(SyncError::InvalidOperation(format!(
                        "{} references deleted {}",
                        target, reference
                    )));
                }
            }
        }

        self.commit(
            WriteBatch::single(entity.clone()),
            vec![(target, operation)],
        )
        .await?;
        Ok(entity)
    }

    /// Soft-deletes an entity.
    ///
    /// Deleting a workout tombstones its line items in the same batch; any
    /// other entity pointing at the target has that reference cleared and
    /// becomes pending. Returns every record that changed, target first.
    /// Deleting something already deleted is a no-op.
    pub async fn mark_deleted(&self, target: &EntityRef) -> SyncResult<Vec<EntityRef>> {
        let _guards = self
            .lock_stable(|index| {
                let mut set: BTreeSet<EntityRef> = index.referrers(target).into_iter().collect();
                set.insert(target.clone());
                set
            })
            .await?;

        let mut root = self
            .backend
            .get(target)
            .await?
            .ok_or_else(|| SyncError::NotFound(target.to_string()))?;
        if root.is_deleted() {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let referrers = self.index()?.referrers(target);

        let mut batch = WriteBatch::new();
        let mut journal_ops = Vec::new();
        let mut changed = vec![target.clone()];

        tombstone(&mut root, now);
        batch.upsert(root);
        journal_ops.push((target.clone(), OperationKind::Delete));

        for referrer in referrers {
            let Some(mut entity) = self.backend.get(&referrer).await? else {
                continue;
            };
            if entity.is_deleted() {
                continue;
            }

            if entity.parent().as_ref() == Some(target) {
                tombstone(&mut entity, now);
                journal_ops.push((referrer.clone(), OperationKind::Delete));
            } else if entity.nullify_reference(target) {
                entity.meta_mut().touch(now);
                if entity.sync_status() != SyncStatus::PendingCreate {
                    entity.meta_mut().sync_status = SyncStatus::PendingUpdate;
                }
                journal_ops.push((referrer.clone(), OperationKind::Update));
            } else {
                continue;
            }

            batch.upsert(entity);
            changed.push(referrer);
        }

        self.commit(batch, journal_ops).await?;
        log::debug!(
            "Deleted {} ({} related records updated)",
            target,
            changed.len() - 1
        );
        Ok(changed)
    }

    /// Physically removes a tombstone
    pub(crate) async fn purge(&self, target: &EntityRef) -> SyncResult<bool> {
        let _guards = self.lock_all(&BTreeSet::from([target.clone()])).await?;

        match self.backend.get(target).await? {
            None => Ok(false),
            Some(entity) if !entity.is_deleted() => Err(SyncError::InvalidOperation(format!(
                "{} is not deleted and cannot be purged",
                target
            ))),
            Some(_) => {
                let mut batch = WriteBatch::new();
                batch.purge(target.clone());
                self.commit(batch, Vec::new()).await?;
                self.journal.clear(target)?;
                Ok(true)
            }
        }
    }

    /// Records the server's acknowledgement of a pushed journal entry.
    ///
    /// `pushed` is the local state that was sent. If the record changed
    /// since, it stays pending; a confirmed create that was edited in the
    /// meantime is downgraded to a pending update.
    pub(crate) async fn confirm_push(
        &self,
        entry: &JournalEntry,
        pushed: &Entity,
    ) -> SyncResult<PushConfirmation> {
        let _guards = self
            .lock_all(&BTreeSet::from([entry.entity.clone()]))
            .await?;

        let Some(mut stored) = self.backend.get(&entry.entity).await? else {
            self.journal.confirm(entry)?;
            return Ok(PushConfirmation::Missing);
        };

        if entry.operation == OperationKind::Delete {
            if !stored.is_deleted() {
                self.journal.confirm(entry)?;
                return Ok(PushConfirmation::StillPending);
            }
            let mut batch = WriteBatch::new();
            batch.purge(entry.entity.clone());
            self.commit(batch, Vec::new()).await?;
            self.journal.clear(&entry.entity)?;
            return Ok(PushConfirmation::Purged);
        }

        let unchanged = stored.last_modified_at() == pushed.last_modified_at()
            && !stored.is_deleted();

        if unchanged {
            stored.meta_mut().sync_status = SyncStatus::Clean;
            self.commit(WriteBatch::single(stored), Vec::new()).await?;
            self.journal.confirm(entry)?;
            return Ok(PushConfirmation::Clean);
        }

        if entry.operation == OperationKind::Create
            && stored.sync_status() == SyncStatus::PendingCreate
        {
            stored.meta_mut().sync_status = SyncStatus::PendingUpdate;
            self.commit(WriteBatch::single(stored), Vec::new()).await?;
        }
        self.journal.confirm(entry)?;
        Ok(PushConfirmation::StillPending)
    }

    /// Applies one pulled entity under last-writer-wins.
    ///
    /// A winning tombstone purges the record; for a workout its line items
    /// go too, and for anything else the references to it are cleared
    /// without marking the referrers pending.
    pub(crate) async fn apply_remote(
        &self,
        remote: Entity,
        resolver: &LwwResolver,
    ) -> SyncResult<RemoteApplied> {
        let target = remote.entity_ref();
        let tombstone = remote.is_deleted();
        let parent = remote.parent();

        let _guards = self
            .lock_stable(|index| {
                let mut set = BTreeSet::from([target.clone()]);
                set.extend(parent.clone());
                if tombstone {
                    set.extend(index.referrers(&target));
                }
                set
            })
            .await?;

        let local = self.backend.get(&target).await?;
        let resolution = resolver.resolve(local.as_ref(), &remote);
        if !resolution.applies_remote() {
            return Ok(RemoteApplied::default());
        }

        let mut outcome = RemoteApplied {
            applied: true,
            ..Default::default()
        };
        if resolution == Resolution::RemoteWins
            && !local.as_ref().is_some_and(Entity::is_deleted)
        {
            outcome.superseded.push(target.clone());
        }

        let mut batch = WriteBatch::new();
        let mut discarded = vec![target.clone()];
        let mut journal_ops = Vec::new();

        if tombstone {
            batch.purge(target.clone());
            outcome.purged += 1;

            let referrers = self.index()?.referrers(&target);
            for referrer in referrers {
                let Some(mut entity) = self.backend.get(&referrer).await? else {
                    continue;
                };

                if entity.parent().as_ref() == Some(&target) {
                    if entity.sync_status().is_pending() && !entity.is_deleted() {
                        outcome.superseded.push(referrer.clone());
                    }
                    batch.purge(referrer.clone());
                    outcome.purged += 1;
                    discarded.push(referrer);
                } else if !entity.is_deleted() && entity.nullify_reference(&target) {
                    batch.upsert(entity);
                }
            }
        } else if let Some(parent) = self.orphaning_parent(parent.as_ref()).await? {
            // Parent is gone here: keep the line item only as a tombstone
            // so its delete reaches the server on the next push.
            log::info!(
                "Remote {} points at deleted {}, tombstoning it",
                target,
                parent
            );
            let mut entity = remote;
            self::tombstone(&mut entity, self.clock.now());
            batch.upsert(entity);
            discarded.clear();
            journal_ops.push((target.clone(), OperationKind::Delete));
        } else {
            let mut entity = remote;
            entity.meta_mut().sync_status = SyncStatus::Clean;
            batch.upsert(entity);
        }

        match self.commit(batch, journal_ops).await {
            Ok(()) => {}
            Err(SyncError::StaleWrite {
                entity,
                incoming,
                stored,
            }) => {
                log::warn!(
                    "Skipping remote {}: incoming {} older than stored {}",
                    entity,
                    incoming,
                    stored
                );
                return Ok(RemoteApplied::default());
            }
            Err(e) => return Err(e),
        }

        for entity in &discarded {
            self.journal.discard(entity)?;
        }
        Ok(outcome)
    }

    /// The parent of a pulled child when it is deleted or missing locally.
    ///
    /// Parents are applied before children, so a missing parent was either
    /// purged here or never existed on the server.
    async fn orphaning_parent(&self, parent: Option<&EntityRef>) -> SyncResult<Option<EntityRef>> {
        let Some(parent) = parent else {
            return Ok(None);
        };
        match self.backend.get(parent).await? {
            Some(entity) if !entity.is_deleted() => Ok(None),
            _ => Ok(Some(parent.clone())),
        }
    }

    /// Line items of a workout ordered by position, deleted ones excluded
    pub async fn workout_items(&self, workout: &EntityId) -> SyncResult<Vec<WorkoutExercise>> {
        let parent = EntityRef::new(EntityKind::Workout, workout.clone());
        let mut items: Vec<WorkoutExercise> = self
            .live_referrers(&parent, EntityKind::WorkoutExercise)
            .await?
            .into_iter()
            .map(WorkoutExercise::try_from)
            .collect::<Result<_, _>>()?;

        items.retain(|item| &item.workout_id == workout);
        items.sort_by_key(|item| item.position);
        Ok(items)
    }

    /// Clients managed by a trainer
    pub async fn clients_of(&self, trainer: &EntityId) -> SyncResult<Vec<User>> {
        let target = EntityRef::new(EntityKind::User, trainer.clone());
        let mut clients: Vec<User> = self
            .live_referrers(&target, EntityKind::User)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect::<Result<_, _>>()?;

        clients.retain(|user| user.trainer_id.as_ref() == Some(trainer));
        clients.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clients)
    }

    /// Assignments given to a client, earliest due date first
    pub async fn assignments_for(&self, client: &EntityId) -> SyncResult<Vec<Assignment>> {
        let target = EntityRef::new(EntityKind::User, client.clone());
        let mut assignments: Vec<Assignment> = self
            .live_referrers(&target, EntityKind::Assignment)
            .await?
            .into_iter()
            .map(Assignment::try_from)
            .collect::<Result<_, _>>()?;

        assignments.retain(|a| a.client_id.as_ref() == Some(client));
        assignments.sort_by_key(|a| (a.due_date.is_none(), a.due_date));
        Ok(assignments)
    }

    /// True while any line item (tombstones included) still points at `workout`
    pub(crate) fn has_children(&self, workout: &EntityRef) -> SyncResult<bool> {
        Ok(!self
            .index()?
            .referrers_of_kind(workout, EntityKind::WorkoutExercise)
            .is_empty())
    }

    async fn live_referrers(&self, target: &EntityRef, kind: EntityKind) -> SyncResult<Vec<Entity>> {
        let refs = self.index()?.referrers_of_kind(target, kind);
        let mut found = Vec::with_capacity(refs.len());
        for reference in refs {
            if let Some(entity) = self.backend.get(&reference).await? {
                if !entity.is_deleted() {
                    found.push(entity);
                }
            }
        }
        Ok(found)
    }

    /// Last persisted pull cursor
    pub async fn cursor(&self) -> SyncResult<Cursor> {
        Ok(self.backend.cursor().await?)
    }

    pub async fn set_cursor(&self, cursor: Cursor) -> SyncResult<()> {
        Ok(self.backend.set_cursor(cursor).await?)
    }

    /// Commits a batch, then brings the index and journal in line with it
    async fn commit(
        &self,
        batch: WriteBatch,
        journal_ops: Vec<(EntityRef, OperationKind)>,
    ) -> SyncResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let ops = batch.ops().to_vec();
        self.backend.apply(batch).await?;

        {
            let mut index = self.index()?;
            for op in &ops {
                match op {
                    WriteOp::Upsert(entity) => index.insert(entity),
                    WriteOp::Purge(target) => index.remove(target),
                }
            }
        }

        for (entity, operation) in journal_ops {
            self.journal.record(entity, operation)?;
        }
        Ok(())
    }

    /// Locks every entity in `wanted`, always in sorted order
    async fn lock_all(&self, wanted: &BTreeSet<EntityRef>) -> SyncResult<Vec<OwnedMutexGuard<()>>> {
        let mutexes: Vec<Arc<AsyncMutex<()>>> = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| SyncError::Internal("Lock poisoned".to_string()))?;

            if locks.len() > LOCK_TABLE_PRUNE_AT {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }

            wanted
                .iter()
                .map(|entity| locks.entry(entity.clone()).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }
        Ok(guards)
    }

    /// Locks the set computed by `affected`, retrying until it stops growing
    async fn lock_stable<F>(&self, affected: F) -> SyncResult<Vec<OwnedMutexGuard<()>>>
    where
        F: Fn(&ReferenceIndex) -> BTreeSet<EntityRef>,
    {
        let mut wanted = affected(&*self.index()?);
        loop {
            let guards = self.lock_all(&wanted).await?;
            let current = affected(&*self.index()?);
            if current.is_subset(&wanted) {
                return Ok(guards);
            }
            drop(guards);
            wanted.extend(current);
        }
    }
}

fn tombstone(entity: &mut Entity, now: Timestamp) {
    let meta = entity.meta_mut();
    meta.is_deleted = true;
    meta.sync_status = SyncStatus::PendingDelete;
    meta.touch(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitsync_core::{Exercise, ManualClock, UserRole, Workout};
    use fitsync_database::MemoryBackend;

    async fn store() -> (Arc<ManualClock>, LocalStore<MemoryBackend>) {
        let clock = Arc::new(ManualClock::starting_at(1_000));
        let store = LocalStore::open(MemoryBackend::new(), clock.clone())
            .await
            .unwrap();
        (clock, store)
    }

    #[tokio::test]
    async fn test_create_stamps_and_journals() {
        let (_clock, store) = store().await;

        let created = store.create(Exercise::new("Squat")).await.unwrap();

        assert_eq!(created.sync_status(), SyncStatus::PendingCreate);
        assert_eq!(created.last_modified_at().as_millis(), 1_000);
        let entry = store.journal().get(&created.entity_ref()).unwrap().unwrap();
        assert_eq!(entry.operation, OperationKind::Create);
    }

    #[tokio::test]
    async fn test_create_twice_rejected() {
        let (_clock, store) = store().await;
        let exercise = Exercise::new("Squat");

        store.create(exercise.clone()).await.unwrap();
        let err = store.create(exercise).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_update_keeps_pending_create_and_advances_time() {
        let (clock, store) = store().await;
        let created = store.create(Exercise::new("Squat")).await.unwrap();

        // Clock went backwards; the entity still moves forward
        clock.set(500);
        let mut exercise = Exercise::try_from(created).unwrap();
        exercise.name = "Front Squat".to_string();
        let updated = store.update(exercise).await.unwrap();

        assert_eq!(updated.sync_status(), SyncStatus::PendingCreate);
        assert_eq!(updated.last_modified_at().as_millis(), 1_001);
        assert_eq!(store.journal().len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let (_clock, store) = store().await;
        let err = store.update(Exercise::new("Ghost")).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_entity_rejected_without_journal() {
        let (_clock, store) = store().await;
        let err = store
            .create(User::new("", "not-an-email", UserRole::Client))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Validation { .. }));
        assert!(store.journal().is_empty());
    }

    #[tokio::test]
    async fn test_remote_put_is_clean_and_stale_put_rejected() {
        let (_clock, store) = store().await;
        let mut exercise = Exercise::new("Row");
        exercise.meta.last_modified_at = Timestamp::from_millis(50);

        let stored = store
            .put(exercise.clone().into(), Origin::Remote)
            .await
            .unwrap();
        assert_eq!(stored.sync_status(), SyncStatus::Clean);
        assert!(store.journal().is_empty());

        exercise.meta.last_modified_at = Timestamp::from_millis(40);
        let err = store.put(exercise.into(), Origin::Local).await.unwrap_err();
        assert!(matches!(err, SyncError::StaleWrite { stored: 50, .. }));
    }

    #[tokio::test]
    async fn test_local_put_restamps_with_clock() {
        let (clock, store) = store().await;
        let mut exercise = Exercise::new("Squat");
        exercise.meta.last_modified_at = Timestamp::from_millis(1_000);
        store
            .put(exercise.clone().into(), Origin::Remote)
            .await
            .unwrap();

        clock.set(5_000);
        exercise.name = "Box Squat".to_string();
        let stored = store.put(exercise.clone().into(), Origin::Local).await.unwrap();
        assert_eq!(stored.last_modified_at().as_millis(), 5_000);
        assert_eq!(stored.sync_status(), SyncStatus::PendingUpdate);

        // Clock behind the stored copy still moves the record forward
        clock.set(100);
        exercise.meta.last_modified_at = stored.last_modified_at();
        let again = store.put(exercise.into(), Origin::Local).await.unwrap();
        assert_eq!(again.last_modified_at().as_millis(), 5_001);
        assert_eq!(
            store.journal().get(&again.entity_ref()).unwrap().unwrap().operation,
            OperationKind::Update
        );
    }

    #[tokio::test]
    async fn test_remote_put_tie_keeps_pending_local() {
        let (_clock, store) = store().await;
        let created = store.create(Exercise::new("Dip")).await.unwrap();

        let mut remote = Exercise::try_from(created.clone()).unwrap();
        remote.name = "Ring Dip".to_string();
        let err = store
            .put(remote.clone().into(), Origin::Remote)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::StaleWrite { .. }));
        assert_eq!(store.journal().len(), 1);
        let stored = Exercise::try_from(store.get(&created.entity_ref()).await.unwrap().unwrap())
            .unwrap();
        assert_eq!(stored.name, "Dip");

        remote.meta.last_modified_at = created.last_modified_at().successor();
        let stored = store.put(remote.into(), Origin::Remote).await.unwrap();
        assert_eq!(stored.sync_status(), SyncStatus::Clean);
        assert!(store.journal().is_empty());
    }

    #[tokio::test]
    async fn test_delete_exercise_nullifies_references() {
        let (_clock, store) = store().await;
        let trainer = User::new("Tess", "tess@gym.io", UserRole::Trainer);
        let client = User::client_of("Cal", "cal@gym.io", &trainer.meta.id);
        let exercise = Exercise::new("Lunge");
        let assignment = Assignment::new(
            &trainer.meta.id,
            &client.meta.id,
            &exercise.meta.id,
            3,
            8,
        );

        store.create(trainer).await.unwrap();
        store.create(client.clone()).await.unwrap();
        let exercise = store.create(exercise).await.unwrap();
        let assignment = store.create(assignment).await.unwrap();

        let changed = store.mark_deleted(&exercise.entity_ref()).await.unwrap();
        assert_eq!(changed.len(), 2);

        let stored = store.get(&assignment.entity_ref()).await.unwrap().unwrap();
        let stored = Assignment::try_from(stored).unwrap();
        assert!(stored.exercise_id.is_none());
        assert_eq!(stored.meta.sync_status, SyncStatus::PendingCreate);

        let gone = store.get(&exercise.entity_ref()).await.unwrap().unwrap();
        assert!(gone.is_deleted());
        assert_eq!(gone.sync_status(), SyncStatus::PendingDelete);
        assert_eq!(store.assignments_for(&client.meta.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cannot_reference_deleted_workout() {
        let (_clock, store) = store().await;
        let workout = Workout::new("Legs");
        let workout_ref = store.create(workout.clone()).await.unwrap().entity_ref();
        store.mark_deleted(&workout_ref).await.unwrap();

        let err = store
            .create(workout.item(&EntityId::generate(), 0))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_mark_deleted_twice_is_noop() {
        let (_clock, store) = store().await;
        let created = store.create(Workout::new("Legs")).await.unwrap();

        assert_eq!(store.mark_deleted(&created.entity_ref()).await.unwrap().len(), 1);
        assert!(store
            .mark_deleted(&created.entity_ref())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_purge_requires_tombstone() {
        let (_clock, store) = store().await;
        let created = store.create(Workout::new("Legs")).await.unwrap();

        assert!(store.purge(&created.entity_ref()).await.is_err());
        store.mark_deleted(&created.entity_ref()).await.unwrap();
        assert!(store.purge(&created.entity_ref()).await.unwrap());
        assert!(store.get(&created.entity_ref()).await.unwrap().is_none());
        assert!(store.journal().is_empty());
    }

    #[tokio::test]
    async fn test_queries() {
        let (_clock, store) = store().await;
        let trainer = User::new("Tess", "tess@gym.io", UserRole::Trainer);
        store.create(trainer.clone()).await.unwrap();
        store
            .create(User::client_of("Zed", "zed@gym.io", &trainer.meta.id))
            .await
            .unwrap();
        store
            .create(User::client_of("Amy", "amy@gym.io", &trainer.meta.id))
            .await
            .unwrap();

        let workout = Workout::new("Full body");
        store.create(workout.clone()).await.unwrap();
        store
            .create(workout.item(&EntityId::generate(), 2))
            .await
            .unwrap();
        store
            .create(workout.item(&EntityId::generate(), 1))
            .await
            .unwrap();

        let names: Vec<String> = store
            .clients_of(&trainer.meta.id)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["Amy", "Zed"]);

        let positions: Vec<u32> = store
            .workout_items(&workout.meta.id)
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.position)
            .collect();
        assert_eq!(positions, vec![1, 2]);

        let trainers = store
            .query(EntityKind::User, |e| {
                matches!(e, Entity::User(u) if u.is_trainer())
            })
            .await
            .unwrap();
        assert_eq!(trainers.len(), 1);
        assert_eq!(store.pending(EntityKind::User).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_reopen_rebuilds_journal_and_index() {
        let clock = Arc::new(ManualClock::starting_at(1_000));
        let backend = MemoryBackend::new();

        let workout = Workout::new("Legs");
        let mut item: Entity = workout.item(&EntityId::generate(), 0).into();
        item.meta_mut().sync_status = SyncStatus::PendingUpdate;
        let mut batch = WriteBatch::single(workout.clone().into());
        batch.upsert(item.clone());
        backend.apply(batch).await.unwrap();

        let store = LocalStore::open(backend, clock).await.unwrap();
        let entry = store.journal().get(&item.entity_ref()).unwrap().unwrap();
        assert_eq!(entry.operation, OperationKind::Update);
        assert_eq!(store.workout_items(&workout.meta.id).await.unwrap().len(), 1);
    }
}
