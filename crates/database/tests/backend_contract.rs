//! Behavior every backend must share

use fitsync_core::{
    Cursor, Entity, EntityKind, Exercise, SyncStatus, Timestamp, Workout, WorkoutExercise,
};
use fitsync_database::{DatabaseConfig, MemoryBackend, SqliteBackend, StoreBackend, WriteBatch};
use tempfile::TempDir;

fn stamped<E: Into<Entity>>(entity: E, millis: i64, status: SyncStatus) -> Entity {
    let mut entity = entity.into();
    entity.meta_mut().last_modified_at = Timestamp::from_millis(millis);
    entity.meta_mut().sync_status = status;
    entity
}

async fn workout_cascade<B: StoreBackend>(backend: &B) {
    let workout = Workout::new("Legs");
    let squat = Exercise::new("Squat");
    let items: Vec<WorkoutExercise> = (0..3).map(|i| workout.item(&squat.meta.id, i)).collect();

    let mut batch = WriteBatch::new();
    batch.upsert(stamped(workout.clone(), 10, SyncStatus::PendingCreate));
    for item in &items {
        batch.upsert(stamped(item.clone(), 10, SyncStatus::PendingCreate));
    }
    backend.apply(batch).await.unwrap();

    assert_eq!(
        backend
            .list_pending(EntityKind::WorkoutExercise)
            .await
            .unwrap()
            .len(),
        3
    );

    // A stale parent at the end of the batch keeps every child untouched
    let mut batch = WriteBatch::new();
    for item in &items {
        let mut deleted = stamped(item.clone(), 20, SyncStatus::PendingDelete);
        deleted.meta_mut().is_deleted = true;
        batch.upsert(deleted);
    }
    batch.upsert(stamped(workout.clone(), 5, SyncStatus::PendingDelete));
    assert!(backend.apply(batch).await.is_err());

    for entity in backend.list(EntityKind::WorkoutExercise).await.unwrap() {
        assert!(!entity.is_deleted());
        assert_eq!(entity.sync_status(), SyncStatus::PendingCreate);
    }
}

async fn cursor_defaults_to_start<B: StoreBackend>(backend: &B) {
    assert_eq!(backend.cursor().await.unwrap(), Cursor::START);
    backend.set_cursor(Cursor::from_raw(7)).await.unwrap();
    assert_eq!(backend.cursor().await.unwrap(), Cursor::from_raw(7));
}

#[tokio::test]
async fn test_memory_backend_contract() {
    let backend = MemoryBackend::new();
    workout_cascade(&backend).await;
    cursor_defaults_to_start(&backend).await;
}

#[tokio::test]
async fn test_sqlite_backend_contract() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("contract.db");
    let backend = SqliteBackend::open(DatabaseConfig::new(path.to_str().unwrap()))
        .await
        .unwrap();

    workout_cascade(&backend).await;
    cursor_defaults_to_start(&backend).await;
    backend.close().await;
}

#[tokio::test]
async fn test_sqlite_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reopen.db");
    let path = path.to_str().unwrap().to_string();

    let exercise = stamped(Exercise::new("Plank"), 42, SyncStatus::PendingUpdate);
    {
        let backend = SqliteBackend::open(DatabaseConfig::new(path.clone()))
            .await
            .unwrap();
        backend
            .apply(WriteBatch::single(exercise.clone()))
            .await
            .unwrap();
        backend.set_cursor(Cursor::from_raw(42)).await.unwrap();
        backend.close().await;
    }

    let backend = SqliteBackend::open(DatabaseConfig::new(path)).await.unwrap();
    let stored = backend.get(&exercise.entity_ref()).await.unwrap().unwrap();
    assert_eq!(stored, exercise);
    assert_eq!(backend.cursor().await.unwrap(), Cursor::from_raw(42));
}
