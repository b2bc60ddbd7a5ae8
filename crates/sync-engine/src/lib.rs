// crates/sync-engine/src/lib.rs
//! Local-first entity synchronization
//!
//! This module provides:
//! - A local store that serves every read and journals every user edit
//! - Soft deletes with workout line-item cascade and reference nullification
//! - Push/pull sync cycles against a remote data source
//! - Last-writer-wins conflict resolution on `last_modified_at`
//!
//! # Example
//!
//! ```rust
//! use fitsync_core::{Exercise, SystemClock};
//! use fitsync_database::MemoryBackend;
//! use fitsync_sync_engine::{InMemoryRemote, LocalStore, SyncConfig, SyncEngine};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = LocalStore::open(MemoryBackend::new(), Arc::new(SystemClock::new()))
//!     .await
//!     .unwrap();
//! let engine = SyncEngine::new(
//!     Arc::new(store),
//!     Arc::new(InMemoryRemote::new()),
//!     SyncConfig::default(),
//! );
//!
//! engine.store().create(Exercise::new("Deadlift")).await.unwrap();
//! let outcome = engine.sync().await.unwrap();
//! assert_eq!(outcome.report().unwrap().pushed, 1);
//! # }
//! ```

mod conflict;
mod engine;
mod error;
mod http;
mod index;
mod journal;
mod remote;
mod store;
mod types;

pub use conflict::{LwwResolver, Resolution};
pub use engine::{SyncConfig, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use http::{HttpConfig, HttpRemote};
pub use journal::{ChangeJournal, JournalEntry};
pub use remote::{InMemoryRemote, RemoteDataSource, RemoteError, RemotePage, RemoteRequest};
pub use store::LocalStore;
pub use types::{CycleOutcome, EntityFailure, Origin, SyncEvent, SyncReport, SyncState};
