//! Shared test helpers for storage module tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use crate::clock::ManualClock;
use crate::storage::{init_memory_pool, DomainStateStore, MemoryBackend, SqliteBackend};

pub(crate) fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
    ))
}

/// SQLite backend over an in-memory database with migrations applied.
pub(crate) async fn create_test_backend() -> SqliteBackend {
    let pool = init_memory_pool()
        .await
        .expect("Failed to create test database pool");
    SqliteBackend::new(pool)
        .await
        .expect("Failed to run migrations")
}

pub(crate) async fn create_sqlite_store(clock: Arc<ManualClock>) -> DomainStateStore {
    DomainStateStore::new(
        Arc::new(create_test_backend().await),
        clock,
        Duration::from_secs(1),
    )
}

pub(crate) fn create_memory_store(
    clock: Arc<ManualClock>,
) -> (DomainStateStore, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let store = DomainStateStore::new(backend.clone(), clock, Duration::from_secs(1));
    (store, backend)
}
