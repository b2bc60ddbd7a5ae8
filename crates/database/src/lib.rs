//! FitSync Database Layer
//!
//! Durable storage for synchronized entities. [`StoreBackend`] is the seam
//! the sync engine writes through; [`SqliteBackend`] persists with sqlx and
//! [`MemoryBackend`] keeps everything in process.

pub mod backend;
pub mod connection;
pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use backend::{StoreBackend, WriteBatch, WriteOp};
pub use connection::{DatabaseConfig, DbPool};
pub use memory::MemoryBackend;
pub use migrations::{current_version, optimize, run_migrations, verify_integrity};
pub use sqlite::SqliteBackend;
