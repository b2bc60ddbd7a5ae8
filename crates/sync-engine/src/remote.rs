// crates/sync-engine/src/remote.rs
//! Remote data source abstraction and an in-process implementation

use fitsync_core::{Cursor, Entity, EntityKind, EntityRef, SyncStatus};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a remote data source
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Connection, timeout or server-side failure
    #[error("Transport failure: {message}")]
    Transport { message: String, retryable: bool },

    /// Payload rejected by the server
    #[error("Rejected by server: {0}")]
    Validation(String),

    #[error("Not found on server: {0}")]
    NotFound(String),

    /// Create for an id the server already has
    #[error("Already exists on server: {0}")]
    Duplicate(String),

    #[error("Conflict on server: {0}")]
    Conflict(String),

    /// Response body could not be understood
    #[error("Malformed payload: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn transport(message: impl Into<String>) -> Self {
        RemoteError::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Whether the same request may succeed when repeated
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transport { retryable: true, .. })
    }

    /// Whether the failure concerns the connection rather than one entity
    pub fn is_transport(&self) -> bool {
        matches!(self, RemoteError::Transport { .. })
    }
}

/// One page of changes for an entity kind
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePage {
    pub entities: Vec<Entity>,
    /// Server high-water mark at the time of the fetch
    pub cursor: Cursor,
}

/// The server API the sync coordinator talks to.
///
/// Creates carry the client-generated id, so a retried create that already
/// reached the server comes back as [`RemoteError::Duplicate`].
pub trait RemoteDataSource: Send + Sync + 'static {
    fn create(&self, entity: &Entity) -> impl Future<Output = Result<(), RemoteError>> + Send;

    fn update(&self, entity: &Entity) -> impl Future<Output = Result<(), RemoteError>> + Send;

    fn delete(&self, entity: &EntityRef) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Entities of `kind` changed after `since`, tombstones included
    fn fetch_since(
        &self,
        kind: EntityKind,
        since: Cursor,
    ) -> impl Future<Output = Result<RemotePage, RemoteError>> + Send;
}

/// A request received by [`InMemoryRemote`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRequest {
    Create(EntityRef),
    Update(EntityRef),
    Delete(EntityRef),
    Fetch(EntityKind, Cursor),
}

#[derive(Debug, Clone)]
struct ServerRecord {
    entity: Entity,
    seq: i64,
}

#[derive(Debug, Default)]
struct ServerState {
    records: HashMap<EntityRef, ServerRecord>,
    seq: i64,
    rejected: HashSet<EntityRef>,
    failing_calls: usize,
    offline: bool,
    failing_fetches: HashSet<EntityKind>,
    requests: Vec<RemoteRequest>,
}

impl ServerState {
    fn store(&mut self, mut entity: Entity) {
        self.seq += 1;
        entity.meta_mut().sync_status = SyncStatus::Clean;
        self.records.insert(
            entity.entity_ref(),
            ServerRecord {
                entity,
                seq: self.seq,
            },
        );
    }

    fn injected_failure(&mut self) -> Result<(), RemoteError> {
        if self.offline {
            return Err(RemoteError::transport("server unreachable"));
        }
        if self.failing_calls > 0 {
            self.failing_calls -= 1;
            return Err(RemoteError::transport("injected transport failure"));
        }
        Ok(())
    }
}

/// Server stand-in that keeps everything in memory.
///
/// Behaves like the HTTP API: duplicate creates and missing targets are
/// reported, invalid payloads are rejected, deletes leave tombstones, and
/// every write advances a global change sequence used as the pull cursor.
/// Failure injection covers transport outages and per-entity rejections.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    state: Mutex<ServerState>,
    latency_ms: AtomicU64,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn delay(&self) {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
    }

    /// Stores an entity as if another device had pushed it
    pub fn seed(&self, entity: impl Into<Entity>) {
        self.lock().store(entity.into());
    }

    /// Server copy of an entity, tombstones included
    pub fn get(&self, entity: &EntityRef) -> Option<Entity> {
        self.lock()
            .records
            .get(entity)
            .map(|record| record.entity.clone())
    }

    /// Number of stored records of a kind, tombstones included
    pub fn count(&self, kind: EntityKind) -> usize {
        self.lock()
            .records
            .keys()
            .filter(|entity| entity.kind == kind)
            .count()
    }

    /// Rejects every write for `entity` as invalid
    pub fn reject(&self, entity: EntityRef) {
        self.lock().rejected.insert(entity);
    }

    /// Stops rejecting writes for `entity`
    pub fn accept(&self, entity: &EntityRef) {
        self.lock().rejected.remove(entity);
    }

    /// Fails the next `calls` requests with a retryable transport error
    pub fn fail_next(&self, calls: usize) {
        self.lock().failing_calls = calls;
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Fails every fetch of `kind` until cleared
    pub fn fail_fetch_for(&self, kind: EntityKind) {
        self.lock().failing_fetches.insert(kind);
    }

    pub fn clear_fetch_failures(&self) {
        self.lock().failing_fetches.clear();
    }

    /// Delays every request
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.lock().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    fn validate(state: &ServerState, entity: &Entity) -> Result<(), RemoteError> {
        if state.rejected.contains(&entity.entity_ref()) {
            return Err(RemoteError::Validation(format!(
                "{} rejected",
                entity.entity_ref()
            )));
        }
        entity
            .check()
            .map_err(|e| RemoteError::Validation(e.to_string()))
    }
}

impl RemoteDataSource for InMemoryRemote {
    async fn create(&self, entity: &Entity) -> Result<(), RemoteError> {
        self.delay().await;
        let target = entity.entity_ref();
        let mut state = self.lock();
        state.requests.push(RemoteRequest::Create(target.clone()));
        state.injected_failure()?;

        if state.records.contains_key(&target) {
            return Err(RemoteError::Duplicate(target.to_string()));
        }
        Self::validate(&state, entity)?;
        state.store(entity.clone());
        Ok(())
    }

    async fn update(&self, entity: &Entity) -> Result<(), RemoteError> {
        self.delay().await;
        let target = entity.entity_ref();
        let mut state = self.lock();
        state.requests.push(RemoteRequest::Update(target.clone()));
        state.injected_failure()?;

        match state.records.get(&target) {
            Some(record) if !record.entity.is_deleted() => {}
            _ => return Err(RemoteError::NotFound(target.to_string())),
        }
        Self::validate(&state, entity)?;
        state.store(entity.clone());
        Ok(())
    }

    async fn delete(&self, entity: &EntityRef) -> Result<(), RemoteError> {
        self.delay().await;
        let mut state = self.lock();
        state.requests.push(RemoteRequest::Delete(entity.clone()));
        state.injected_failure()?;

        if state.rejected.contains(entity) {
            return Err(RemoteError::Validation(format!("{} rejected", entity)));
        }

        let mut tombstone = match state.records.get(entity) {
            Some(record) if !record.entity.is_deleted() => record.entity.clone(),
            _ => return Err(RemoteError::NotFound(entity.to_string())),
        };
        let meta = tombstone.meta_mut();
        meta.is_deleted = true;
        meta.last_modified_at = meta.last_modified_at.successor();
        state.store(tombstone);
        Ok(())
    }

    async fn fetch_since(&self, kind: EntityKind, since: Cursor) -> Result<RemotePage, RemoteError> {
        self.delay().await;
        let mut state = self.lock();
        state.requests.push(RemoteRequest::Fetch(kind, since));
        state.injected_failure()?;

        if state.failing_fetches.contains(&kind) {
            return Err(RemoteError::transport(format!("fetch of {} failed", kind)));
        }

        let mut changed: Vec<&ServerRecord> = state
            .records
            .iter()
            .filter(|(entity, record)| entity.kind == kind && record.seq > since.as_raw())
            .map(|(_, record)| record)
            .collect();
        changed.sort_by_key(|record| record.seq);

        Ok(RemotePage {
            entities: changed.into_iter().map(|r| r.entity.clone()).collect(),
            cursor: Cursor::from_raw(state.seq),
        })
    }
}
