// crates/sync-engine/examples/sync_demo.rs
//! Demonstration of sync engine capabilities

use fitsync_core::{Entity, Exercise, SystemClock, User, UserRole, Workout};
use fitsync_database::MemoryBackend;
use fitsync_sync_engine::{
    CycleOutcome, InMemoryRemote, LocalStore, SyncConfig, SyncEngine, SyncResult,
};
use std::sync::Arc;

type Device = SyncEngine<MemoryBackend, InMemoryRemote>;

async fn device(server: &Arc<InMemoryRemote>) -> SyncResult<Device> {
    let store = LocalStore::open(MemoryBackend::new(), Arc::new(SystemClock::new())).await?;
    Ok(SyncEngine::new(
        Arc::new(store),
        Arc::clone(server),
        SyncConfig::default(),
    ))
}

fn print_outcome(label: &str, outcome: &CycleOutcome) {
    match outcome.report() {
        Some(report) => println!(
            "  {}: pushed {}, pulled {}, purged {}, failures {}",
            label,
            report.pushed,
            report.pulled,
            report.purged,
            report.failures.len()
        ),
        None => println!("  {}: already running", label),
    }
}

#[tokio::main]
async fn main() -> SyncResult<()> {
    println!("FitSync Sync Engine Demo");
    println!("========================\n");

    let server = Arc::new(InMemoryRemote::new());
    let trainer_phone = device(&server).await?;
    let client_phone = device(&server).await?;

    println!("1. Trainer plans a workout offline");
    let coach = User::new("Jordan", "jordan@gym.io", UserRole::Trainer);
    let client = User::client_of("Riley", "riley@gym.io", &coach.meta.id);
    let squat = Exercise::new("Back Squat").created_by(&coach.meta.id);
    let workout = Workout::new("Lower body").owned_by(&coach.meta.id);

    let store = trainer_phone.store();
    store.create(coach.clone()).await?;
    store.create(client.clone()).await?;
    store.create(squat.clone()).await?;
    store.create(workout.clone()).await?;
    store
        .create(workout.item(&squat.meta.id, 0).with_volume(5, 5, Some(100.0)))
        .await?;
    println!("  {} pending changes", store.journal().len());

    println!("\n2. Both devices sync");
    print_outcome("trainer", &trainer_phone.sync().await?);
    print_outcome("client", &client_phone.sync().await?);

    let clients = client_phone.store().clients_of(&coach.meta.id).await?;
    println!("  client device sees {} client(s) of {}", clients.len(), coach.name);

    println!("\n3. Trainer deletes the workout");
    let workout_ref = Entity::from(workout.clone()).entity_ref();
    let changed = trainer_phone.store().mark_deleted(&workout_ref).await?;
    println!("  {} records tombstoned", changed.len());
    print_outcome("trainer", &trainer_phone.sync().await?);
    print_outcome("client", &client_phone.sync().await?);

    let items = client_phone.store().workout_items(&workout.meta.id).await?;
    println!("  client device has {} line items left", items.len());

    println!("\n✓ Demo complete");
    Ok(())
}
