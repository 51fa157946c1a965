//! Persistence seam for the domain state store.

use async_trait::async_trait;

use crate::error_handling::DatabaseError;
use crate::models::{DomainRecord, JournalEntry, Transition};

/// A record as last committed, with the version the next commit must match.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub record: DomainRecord,
    pub version: i64,
}

/// Durable storage for domain records and their transition journal.
///
/// `commit` is all-or-nothing and conditional: it succeeds only if the
/// stored version still equals `expected` (`None` meaning no row exists yet).
/// Otherwise it returns `DatabaseError::WriteConflict` and changes nothing,
/// so writers in other processes never overwrite each other blindly.
#[async_trait]
pub trait StateBackend: Send + Sync {
    async fn load(&self, domain: &str) -> Result<Option<StoredRecord>, DatabaseError>;

    async fn commit(
        &self,
        record: &DomainRecord,
        transitions: &[Transition],
        expected: Option<i64>,
    ) -> Result<(), DatabaseError>;

    async fn list_domains(&self) -> Result<Vec<String>, DatabaseError>;

    /// Most recent journal entries for `domain`, newest first.
    async fn history(&self, domain: &str, limit: u32) -> Result<Vec<JournalEntry>, DatabaseError>;
}
