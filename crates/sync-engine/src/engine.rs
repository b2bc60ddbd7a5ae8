// crates/sync-engine/src/engine.rs
//! Sync coordinator: push, pull and resolve cycles

use crate::conflict::LwwResolver;
use crate::error::SyncResult;
use crate::journal::JournalEntry;
use crate::remote::{RemoteDataSource, RemoteError, RemotePage};
use crate::store::{LocalStore, PushConfirmation};
use crate::types::{CycleOutcome, EntityFailure, SyncEvent, SyncReport, SyncState};
use fitsync_core::{Cursor, Entity, EntityKind, OperationKind};
use fitsync_database::StoreBackend;
use fitsync_resilience::{with_retry, with_timeout, RetryPolicy};
use std::cmp::Reverse;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Configuration for the sync engine
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Retry policy for transient remote failures
    pub retry: RetryPolicy,
    /// Upper bound for one remote call attempt
    pub request_timeout: Duration,
    /// Capacity of the event broadcast channel
    pub event_buffer: usize,
    /// Interval for background cycles, `None` when disabled
    pub auto_sync_interval: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::new(3)
                .with_initial_delay(Duration::from_millis(200))
                .with_max_delay(Duration::from_secs(10)),
            request_timeout: Duration::from_secs(30),
            event_buffer: 64,
            auto_sync_interval: None,
        }
    }
}

impl SyncConfig {
    /// Builds the engine settings from the `remote` and `sync` sections
    pub fn from_config(config: &fitsync_config::Config) -> Self {
        Self {
            retry: RetryPolicy::new(config.remote.max_attempts as usize)
                .with_initial_delay(config.remote.initial_backoff())
                .with_max_delay(config.remote.max_backoff()),
            request_timeout: config.remote.request_timeout(),
            event_buffer: config.sync.event_buffer,
            auto_sync_interval: config.sync.auto_sync_interval(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    pub fn with_auto_sync_interval(mut self, interval: Option<Duration>) -> Self {
        self.auto_sync_interval = interval;
        self
    }
}

/// Resets the running flag when a cycle ends, however it ends
struct RunningGuard<'a, B: StoreBackend, R: RemoteDataSource> {
    engine: &'a SyncEngine<B, R>,
}

impl<B: StoreBackend, R: RemoteDataSource> Drop for RunningGuard<'_, B, R> {
    fn drop(&mut self) {
        self.engine.set_state(SyncState::Idle);
        self.engine.running.send_replace(false);
    }
}

/// Runs sync cycles between a [`LocalStore`] and a remote data source.
///
/// A cycle pushes the journal snapshot taken at its start, then fetches
/// every entity kind and only after all fetches succeeded applies the
/// pages parents-first. At most one cycle runs at a time.
pub struct SyncEngine<B: StoreBackend, R: RemoteDataSource> {
    store: Arc<LocalStore<B>>,
    remote: Arc<R>,
    config: SyncConfig,
    resolver: LwwResolver,
    running: watch::Sender<bool>,
    cancel_requested: AtomicBool,
    state: watch::Sender<SyncState>,
    events: broadcast::Sender<SyncEvent>,
}

impl<B: StoreBackend, R: RemoteDataSource> SyncEngine<B, R> {
    /// Creates a new sync engine
    pub fn new(store: Arc<LocalStore<B>>, remote: Arc<R>, config: SyncConfig) -> Self {
        let events = broadcast::channel(config.event_buffer.max(1)).0;

        Self {
            store,
            remote,
            config,
            resolver: LwwResolver::new(),
            running: watch::channel(false).0,
            cancel_requested: AtomicBool::new(false),
            state: watch::channel(SyncState::Idle).0,
            events,
        }
    }

    pub fn store(&self) -> &Arc<LocalStore<B>> {
        &self.store
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Current phase
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Watches phase changes
    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Subscribes to sync events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Asks the running cycle to stop at the next phase boundary
    pub fn cancel(&self) {
        if self.is_running() {
            log::info!("Sync cancellation requested");
            self.cancel_requested.store(true, Ordering::SeqCst);
        }
    }

    /// Waits until no cycle is in flight
    pub async fn wait_idle(&self) {
        let mut running = self.running.subscribe();
        let _ = running.wait_for(|running| !*running).await;
    }

    /// Runs one sync cycle.
    ///
    /// Transport failures end the cycle with a report carrying the error;
    /// storage failures abort it with `Err`.
    pub async fn sync(&self) -> SyncResult<CycleOutcome> {
        let acquired = self.running.send_if_modified(|running| {
            if *running {
                false
            } else {
                *running = true;
                true
            }
        });
        if !acquired {
            log::debug!("Sync requested while a cycle is in flight");
            return Ok(CycleOutcome::AlreadyRunning);
        }

        let _guard = RunningGuard { engine: self };
        self.cancel_requested.store(false, Ordering::SeqCst);

        match self.run_cycle().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                log::error!("Sync cycle aborted: {}", e);
                self.set_state(SyncState::Failed);
                self.emit(SyncEvent::CycleFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Starts background cycles using the configured interval, if any
    pub fn start_auto_sync(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        self.config
            .auto_sync_interval
            .map(|interval| self.spawn_periodic(interval))
    }

    /// Runs a cycle every `period` until the handle is aborted
    pub fn spawn_periodic(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let period = period.max(Duration::from_millis(1));
        log::info!("Periodic sync every {:?}", period);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match engine.sync().await {
                    Ok(CycleOutcome::Completed(report)) if !report.is_clean() => {
                        log::warn!(
                            "Periodic sync finished with {} failures",
                            report.failures.len()
                        );
                    }
                    Ok(_) => {}
                    Err(e) => log::error!("Periodic sync failed: {}", e),
                }
            }
        })
    }

    async fn run_cycle(&self) -> SyncResult<CycleOutcome> {
        let since = self.store.cursor().await?;
        let mut report = SyncReport::started(self.store.now(), since);
        log::info!("Sync cycle started (cursor {})", since);

        self.set_state(SyncState::Pushing);
        self.push(&mut report).await?;
        if report.transport_error.is_some() {
            return Ok(self.fail(report));
        }
        if self.cancel_requested.load(Ordering::SeqCst) {
            return Ok(self.cancelled(report));
        }

        self.set_state(SyncState::Pulling);
        let pages = match self.pull(since).await {
            Ok(pages) => pages,
            Err(error) => {
                report.transport_error = Some(error.to_string());
                return Ok(self.fail(report));
            }
        };
        if self.cancel_requested.load(Ordering::SeqCst) {
            return Ok(self.cancelled(report));
        }

        self.set_state(SyncState::Resolving);
        for (kind, page) in &pages {
            for entity in &page.entities {
                let applied = self
                    .store
                    .apply_remote(entity.clone(), &self.resolver)
                    .await?;
                if applied.applied {
                    report.pulled += 1;
                }
                report.purged += applied.purged;
                for superseded in applied.superseded {
                    self.emit(SyncEvent::Superseded(superseded.clone()));
                    report.superseded.push(superseded);
                }
            }
            log::trace!("Resolved {} {}", page.entities.len(), kind.collection());
        }

        // Pages are fetched one after another against a moving server
        // sequence; only the lowest one is known to cover every kind.
        let next = pages
            .iter()
            .map(|(_, page)| page.cursor)
            .min()
            .unwrap_or(since)
            .max(since);
        if next > since {
            self.store.set_cursor(next).await?;
        }
        report.cursor = next;
        report.finished_at = self.store.now();

        log::info!(
            "Sync cycle completed: {} pushed, {} pulled, {} purged, {} failed",
            report.pushed,
            report.pulled,
            report.purged,
            report.failures.len()
        );
        self.emit(SyncEvent::CycleCompleted(report.clone()));
        Ok(CycleOutcome::Completed(report))
    }

    /// Pushes the journal snapshot.
    ///
    /// Entity-level rejections are recorded in the report; a transport
    /// failure stops the phase and is stored in `report.transport_error`.
    async fn push(&self, report: &mut SyncReport) -> SyncResult<()> {
        let entries = self.store.journal().pending_entries()?;
        if entries.is_empty() {
            return Ok(());
        }

        let (mut upserts, mut deletes): (Vec<JournalEntry>, Vec<JournalEntry>) = entries
            .into_iter()
            .partition(|entry| entry.operation != OperationKind::Delete);
        upserts.sort_by_key(|entry| (entry.entity.kind.rank(), entry.seq));
        deletes.sort_by_key(|entry| (Reverse(entry.entity.kind.rank()), entry.seq));
        log::debug!(
            "Pushing {} upserts and {} deletes",
            upserts.len(),
            deletes.len()
        );

        for entry in upserts.iter().chain(deletes.iter()) {
            let Some(entity) = self.store.get(&entry.entity).await? else {
                self.store.journal().clear(&entry.entity)?;
                continue;
            };

            if entry.operation == OperationKind::Delete
                && entry.entity.kind == EntityKind::Workout
                && self.store.has_children(&entry.entity)?
            {
                log::info!("Deferring delete of {} while line items remain", entry.entity);
                report.deferred.push(entry.entity.clone());
                continue;
            }

            match self.send(entry, &entity).await {
                Ok(()) => match self.store.confirm_push(entry, &entity).await? {
                    PushConfirmation::Purged => {
                        report.pushed += 1;
                        report.purged += 1;
                    }
                    PushConfirmation::Missing => {}
                    PushConfirmation::Clean | PushConfirmation::StillPending => {
                        report.pushed += 1;
                    }
                },
                Err(error) if error.is_transport() => {
                    log::warn!("Push aborted at {}: {}", entry.entity, error);
                    report.transport_error = Some(error.to_string());
                    return Ok(());
                }
                Err(error) => {
                    log::warn!(
                        "Server rejected {} of {}: {}",
                        entry.operation,
                        entry.entity,
                        error
                    );
                    let failure = EntityFailure::new(
                        entry.entity.clone(),
                        Some(entry.operation),
                        error.to_string(),
                    );
                    self.emit(SyncEvent::EntityFailed(failure.clone()));
                    report.failures.push(failure);
                }
            }
        }

        Ok(())
    }

    async fn send(&self, entry: &JournalEntry, entity: &Entity) -> Result<(), RemoteError> {
        let remote = &self.remote;
        let target = &entry.entity;

        match entry.operation {
            OperationKind::Create => match self.call(move || remote.create(entity)).await {
                Err(RemoteError::Duplicate(_)) => {
                    log::debug!("{} already known to the server", target);
                    Ok(())
                }
                other => other,
            },
            OperationKind::Update => self.call(move || remote.update(entity)).await,
            OperationKind::Delete => match self.call(move || remote.delete(target)).await {
                Err(RemoteError::NotFound(_)) => {
                    log::debug!("{} already gone from the server", target);
                    Ok(())
                }
                other => other,
            },
        }
    }

    /// Fetches every kind parents-first; nothing is applied here
    async fn pull(&self, since: Cursor) -> Result<Vec<(EntityKind, RemotePage)>, RemoteError> {
        let remote = &self.remote;
        let mut pages = Vec::with_capacity(EntityKind::ALL.len());

        for kind in EntityKind::ALL {
            let page = self
                .call(move || remote.fetch_since(kind, since))
                .await
                .inspect_err(|e| log::warn!("Pull of {} failed: {}", kind.collection(), e))?;
            pages.push((kind, page));
        }

        Ok(pages)
    }

    /// One remote call with timeout per attempt and retry on transient failures
    async fn call<T, F, Fut>(&self, mut operation: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let timeout = self.config.request_timeout;

        with_retry(&self.config.retry, RemoteError::is_retryable, |_attempt| {
            let request = operation();
            async move {
                match with_timeout(timeout, request).await {
                    Ok(result) => result,
                    Err(e) => Err(RemoteError::transport(e.to_string())),
                }
            }
        })
        .await
    }

    fn fail(&self, mut report: SyncReport) -> CycleOutcome {
        let message = report.transport_error.clone().unwrap_or_default();
        log::warn!("Sync cycle failed: {}", message);

        report.finished_at = self.store.now();
        self.set_state(SyncState::Failed);
        self.emit(SyncEvent::CycleFailed { message });
        CycleOutcome::Completed(report)
    }

    fn cancelled(&self, mut report: SyncReport) -> CycleOutcome {
        log::info!("Sync cycle cancelled");
        report.cancelled = true;
        report.finished_at = self.store.now();
        CycleOutcome::Cancelled(report)
    }

    fn set_state(&self, state: SyncState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });

        if changed {
            log::debug!("Sync state: {}", state);
            self.emit(SyncEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
