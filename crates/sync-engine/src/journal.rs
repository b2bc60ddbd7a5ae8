// crates/sync-engine/src/journal.rs
//! Change journal: one coalesced pending operation per entity

use crate::error::{SyncError, SyncResult};
use fitsync_core::{EntityRef, OperationKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// A pending local operation awaiting push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub entity: EntityRef,
    pub operation: OperationKind,
    /// Bumped every time the entity is re-recorded
    pub seq: u64,
}

#[derive(Debug, Default)]
struct JournalState {
    entries: HashMap<EntityRef, JournalEntry>,
    next_seq: u64,
}

impl JournalState {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Net operation after `incoming` follows `existing`
fn coalesce(existing: OperationKind, incoming: OperationKind) -> OperationKind {
    use OperationKind::*;
    match (existing, incoming) {
        (Delete, _) | (_, Delete) => Delete,
        (Create, _) => Create,
        (Update, _) => Update,
    }
}

/// Tracks local mutations since the last confirmed push.
///
/// The journal is in-memory only; its durable form is the sync status of
/// the records in the store, which [`ChangeJournal::rebuild`] reads back.
#[derive(Clone, Default)]
pub struct ChangeJournal {
    state: Arc<Mutex<JournalState>>,
}

impl ChangeJournal {
    /// Creates an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> SyncResult<MutexGuard<'_, JournalState>> {
        self.state
            .lock()
            .map_err(|_| SyncError::Internal("Lock poisoned".to_string()))
    }

    /// Records an operation, merging it with any pending one.
    ///
    /// Returns the resulting net operation.
    pub fn record(&self, entity: EntityRef, operation: OperationKind) -> SyncResult<OperationKind> {
        let mut state = self.lock()?;
        let seq = state.next_seq();

        let net = match state.entries.get(&entity) {
            Some(existing) => coalesce(existing.operation, operation),
            None => operation,
        };

        log::trace!("Journal {} {} (seq {})", net, entity, seq);
        state.entries.insert(
            entity.clone(),
            JournalEntry {
                entity,
                operation: net,
                seq,
            },
        );

        Ok(net)
    }

    /// Snapshot of all entries in the order they were last recorded
    pub fn pending_entries(&self) -> SyncResult<Vec<JournalEntry>> {
        let state = self.lock()?;
        let mut entries: Vec<JournalEntry> = state.entries.values().cloned().collect();
        entries.sort_by_key(|entry| entry.seq);
        Ok(entries)
    }

    pub fn get(&self, entity: &EntityRef) -> SyncResult<Option<JournalEntry>> {
        Ok(self.lock()?.entries.get(entity).cloned())
    }

    /// Removes the entry for `entity` regardless of its sequence
    pub fn clear(&self, entity: &EntityRef) -> SyncResult<()> {
        self.lock()?.entries.remove(entity);
        Ok(())
    }

    /// Marks a snapshot entry as pushed.
    ///
    /// Returns true when the entry was removed. If the entity was recorded
    /// again after the snapshot the newer entry stays; a confirmed create
    /// turns a pending create into an update since the server now knows the id.
    pub fn confirm(&self, pushed: &JournalEntry) -> SyncResult<bool> {
        let mut state = self.lock()?;

        let Some(current) = state.entries.get_mut(&pushed.entity) else {
            return Ok(false);
        };

        if current.seq == pushed.seq {
            state.entries.remove(&pushed.entity);
            return Ok(true);
        }

        if pushed.operation == OperationKind::Create && current.operation == OperationKind::Create {
            current.operation = OperationKind::Update;
        }
        Ok(false)
    }

    /// Drops an entry whose local change lost to a newer remote version
    pub fn discard(&self, entity: &EntityRef) -> SyncResult<Option<JournalEntry>> {
        let removed = self.lock()?.entries.remove(entity);
        if let Some(entry) = &removed {
            log::debug!("Discarded pending {} for {}", entry.operation, entity);
        }
        Ok(removed)
    }

    /// Replaces the contents with entries derived from stored records
    pub fn rebuild<I>(&self, pending: I) -> SyncResult<usize>
    where
        I: IntoIterator<Item = (EntityRef, OperationKind)>,
    {
        let mut state = self.lock()?;
        state.entries.clear();

        for (entity, operation) in pending {
            let seq = state.next_seq();
            state.entries.insert(
                entity.clone(),
                JournalEntry {
                    entity,
                    operation,
                    seq,
                },
            );
        }

        Ok(state.entries.len())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|state| state.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
