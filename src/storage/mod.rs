//! Durable per-domain state.
//!
//! `DomainStateStore` is the only component that reads or writes records.
//! It sits on a `StateBackend`: `SqliteBackend` in production (WAL,
//! `synchronous=FULL`, JSON record per row plus a transitions journal) and
//! `MemoryBackend` for tests and embedding.

mod backend;
mod circuit_breaker;
mod memory;
mod migrations;
mod pool;
mod sqlite;
mod store;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use backend::{StateBackend, StoredRecord};
pub use circuit_breaker::StoreWriteCircuitBreaker;
pub use memory::MemoryBackend;
pub use migrations::run_migrations;
pub use pool::{init_db_pool_with_path, init_memory_pool};
pub use sqlite::SqliteBackend;
pub use store::{DomainStateStore, Journal};
