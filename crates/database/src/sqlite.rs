//! SQLite backend

use crate::backend::{stale_write, StoreBackend, WriteBatch, WriteOp};
use crate::connection::{connect, database_exists, DatabaseConfig, DbPool};
use crate::migrations::{optimize, run_migrations, verify_integrity};
use fitsync_core::{AppError, Cursor, Entity, EntityKind, EntityRef, SyncStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};

/// Entity store on SQLite, one table per entity kind.
///
/// Payloads are stored as JSON next to the columns the sync engine
/// filters on. Table names come from [`EntityKind::collection`], never from
/// caller input.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: DbPool,
}

impl SqliteBackend {
    /// Connects and brings the schema up to date
    pub async fn open(config: DatabaseConfig) -> Result<Self, AppError> {
        let existing = !config.is_in_memory() && database_exists(&config.path);
        let pool = connect(config).await?;
        run_migrations(&pool).await?;
        if existing {
            verify_integrity(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// Wraps a pool whose schema is already migrated
    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn close(&self) {
        if let Err(e) = optimize(&self.pool).await {
            log::warn!("Skipping optimize on close: {}", e);
        }
        self.pool.close().await;
    }
}

/// Maps a write failure, telling lock contention apart from real errors
fn write_error(operation: impl Into<String>, error: sqlx::Error) -> AppError {
    let busy = error
        .as_database_error()
        .and_then(|db| db.code())
        .and_then(|code| code.parse::<i32>().ok())
        // SQLITE_BUSY and SQLITE_LOCKED, extended codes included
        .is_some_and(|code| matches!(code & 0xff, 5 | 6));

    if busy {
        AppError::DatabaseLocked {
            operation: operation.into(),
        }
    } else {
        AppError::database(operation, error)
    }
}

fn row_to_entity(kind: EntityKind, row: &SqliteRow) -> Result<Entity, AppError> {
    let payload: String = row
        .try_get("payload")
        .map_err(|e| AppError::database("Failed to get payload", e))?;
    let status: String = row
        .try_get("sync_status")
        .map_err(|e| AppError::database("Failed to get sync_status", e))?;

    let value = serde_json::from_str(&payload)
        .map_err(|e| AppError::serialization(format!("Corrupt {} payload", kind), e))?;
    let mut entity = Entity::from_json(kind, value)?;
    entity.meta_mut().sync_status =
        status
            .parse::<SyncStatus>()
            .map_err(|reason| AppError::DatabaseCorrupted {
                details: format!("{} in {}", reason, kind.collection()),
            })?;
    Ok(entity)
}

async fn upsert(tx: &mut Transaction<'_, Sqlite>, entity: &Entity) -> Result<(), AppError> {
    let table = entity.kind().collection();
    let payload = entity.to_json()?.to_string();
    let meta = entity.meta();

    let sql = format!(
        "INSERT INTO {table} (id, payload, is_deleted, sync_status, last_modified_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             payload = excluded.payload,
             is_deleted = excluded.is_deleted,
             sync_status = excluded.sync_status,
             last_modified_at = excluded.last_modified_at
         WHERE excluded.last_modified_at >= {table}.last_modified_at"
    );

    let result = sqlx::query(&sql)
        .bind(meta.id.as_str())
        .bind(payload)
        .bind(meta.is_deleted)
        .bind(meta.sync_status.as_str())
        .bind(meta.last_modified_at.as_millis())
        .execute(&mut **tx)
        .await
        .map_err(|e| write_error(format!("Failed to upsert into {}", table), e))?;

    if result.rows_affected() == 0 {
        let stored: i64 = sqlx::query_scalar(&format!(
            "SELECT last_modified_at FROM {table} WHERE id = ?"
        ))
        .bind(meta.id.as_str())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| AppError::database("Failed to read stored timestamp", e))?;
        return Err(stale_write(entity, stored));
    }

    Ok(())
}

async fn purge(tx: &mut Transaction<'_, Sqlite>, target: &EntityRef) -> Result<(), AppError> {
    let table = target.kind.collection();
    sqlx::query(&format!("DELETE FROM {table} WHERE id = ?"))
        .bind(target.id.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|e| write_error(format!("Failed to purge from {}", table), e))?;
    Ok(())
}

impl StoreBackend for SqliteBackend {
    async fn get(&self, entity: &EntityRef) -> Result<Option<Entity>, AppError> {
        let sql = format!(
            "SELECT payload, sync_status FROM {} WHERE id = ?",
            entity.kind.collection()
        );
        let row = sqlx::query(&sql)
            .bind(entity.id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database("Failed to get entity", e))?;

        row.map(|row| row_to_entity(entity.kind, &row)).transpose()
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<Entity>, AppError> {
        let sql = format!(
            "SELECT payload, sync_status FROM {} ORDER BY id",
            kind.collection()
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database("Failed to list entities", e))?;

        rows.iter().map(|row| row_to_entity(kind, row)).collect()
    }

    async fn list_pending(&self, kind: EntityKind) -> Result<Vec<Entity>, AppError> {
        let sql = format!(
            "SELECT payload, sync_status FROM {} WHERE sync_status != 'clean' ORDER BY id",
            kind.collection()
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database("Failed to list pending entities", e))?;

        rows.iter().map(|row| row_to_entity(kind, row)).collect()
    }

    async fn apply(&self, batch: WriteBatch) -> Result<(), AppError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| write_error("Failed to begin transaction", e))?;

        // An error returns early and drops `tx`, which rolls back
        for op in batch.ops() {
            match op {
                WriteOp::Upsert(entity) => upsert(&mut tx, entity).await?,
                WriteOp::Purge(target) => purge(&mut tx, target).await?,
            }
        }

        tx.commit()
            .await
            .map_err(|e| write_error("Failed to commit transaction", e))
    }

    async fn cursor(&self) -> Result<Cursor, AppError> {
        let value: Option<i64> = sqlx::query_scalar("SELECT value FROM sync_cursor WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database("Failed to read sync cursor", e))?;

        Ok(value.map(Cursor::from_raw).unwrap_or(Cursor::START))
    }

    async fn set_cursor(&self, cursor: Cursor) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO sync_cursor (id, value) VALUES (1, ?)
             ON CONFLICT(id) DO UPDATE SET value = excluded.value",
        )
        .bind(cursor.as_raw())
        .execute(&self.pool)
        .await
        .map_err(|e| write_error("Failed to store sync cursor", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitsync_core::{Timestamp, User, UserRole, Workout};
    use std::time::Duration;
    use tempfile::TempDir;

    async fn backend() -> SqliteBackend {
        SqliteBackend::open(DatabaseConfig::in_memory()).await.unwrap()
    }

    fn user_at(millis: i64) -> User {
        let mut user = User::new("Sam", "sam@gym.io", UserRole::Trainer);
        user.meta.last_modified_at = Timestamp::from_millis(millis);
        user
    }

    #[tokio::test]
    async fn test_roundtrip_keeps_status() {
        let backend = backend().await;
        let mut user = user_at(10);
        user.meta.sync_status = SyncStatus::PendingCreate;
        let entity = Entity::from(user);

        backend.apply(WriteBatch::single(entity.clone())).await.unwrap();

        let stored = backend.get(&entity.entity_ref()).await.unwrap().unwrap();
        assert_eq!(stored, entity);
        assert_eq!(stored.sync_status(), SyncStatus::PendingCreate);
    }

    #[tokio::test]
    async fn test_missing_entity() {
        let backend = backend().await;
        let entity = Entity::from(user_at(1));
        assert!(backend.get(&entity.entity_ref()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_upsert_rolls_back_batch() {
        let backend = backend().await;
        let stored = user_at(100);
        backend.apply(WriteBatch::single(stored.clone().into())).await.unwrap();

        let workout = Workout::new("Legs");
        let mut stale = stored.clone();
        stale.meta.last_modified_at = Timestamp::from_millis(50);
        stale.name = "Stale".to_string();

        let mut batch = WriteBatch::new();
        batch.upsert(workout.clone().into()).upsert(stale.into());
        let err = backend.apply(batch).await.unwrap_err();

        assert!(matches!(err, AppError::StaleWrite { incoming: 50, stored: 100, .. }));
        assert!(backend
            .get(&Entity::from(workout).entity_ref())
            .await
            .unwrap()
            .is_none());
        let kept = backend
            .get(&Entity::from(stored.clone()).entity_ref())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept, Entity::from(stored));
    }

    #[tokio::test]
    async fn test_pending_listing_and_purge() {
        let backend = backend().await;
        let mut pending = user_at(1);
        pending.meta.sync_status = SyncStatus::PendingDelete;
        pending.meta.is_deleted = true;
        let clean = user_at(2);

        let mut batch = WriteBatch::new();
        batch.upsert(pending.clone().into()).upsert(clean.into());
        backend.apply(batch).await.unwrap();

        let listed = backend.list_pending(EntityKind::User).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].is_deleted());

        let mut purge = WriteBatch::new();
        purge.purge(Entity::from(pending).entity_ref());
        backend.apply(purge).await.unwrap();

        assert_eq!(backend.list(EntityKind::User).await.unwrap().len(), 1);
        assert!(backend
            .list_pending(EntityKind::User)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_cursor_persisted() {
        let backend = backend().await;
        assert_eq!(backend.cursor().await.unwrap(), Cursor::START);

        backend.set_cursor(Cursor::from_raw(1_000)).await.unwrap();
        backend.set_cursor(Cursor::from_raw(2_000)).await.unwrap();
        assert_eq!(backend.cursor().await.unwrap(), Cursor::from_raw(2_000));
    }

    #[tokio::test]
    async fn test_reopen_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fitsync.db").to_string_lossy().to_string();

        let first = SqliteBackend::open(DatabaseConfig::new(path.clone())).await.unwrap();
        first.set_cursor(Cursor::from_raw(7)).await.unwrap();
        first.close().await;

        let second = SqliteBackend::open(DatabaseConfig::new(path)).await.unwrap();
        assert_eq!(second.cursor().await.unwrap(), Cursor::from_raw(7));
        second.close().await;
    }

    #[tokio::test]
    async fn test_write_under_foreign_lock_reports_locked() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("locked.db").to_string_lossy().to_string();
        let config = DatabaseConfig::new(path).with_busy_timeout(Duration::ZERO);

        let backend = SqliteBackend::open(config.clone()).await.unwrap();
        let other = connect(config).await.unwrap();
        let mut holder = other.acquire().await.unwrap();
        sqlx::query("BEGIN EXCLUSIVE")
            .execute(&mut *holder)
            .await
            .unwrap();

        let err = backend
            .apply(WriteBatch::single(user_at(1).into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DatabaseLocked { .. }));
        assert!(err.is_retryable());

        sqlx::query("ROLLBACK").execute(&mut *holder).await.unwrap();
        backend
            .apply(WriteBatch::single(user_at(1).into()))
            .await
            .unwrap();
    }
}
