//! In-memory state backend for tests and embedding.
//!
//! Records are kept as serialized JSON so reads go through the same serde
//! path as the SQLite backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error_handling::DatabaseError;
use crate::models::{DomainRecord, JournalEntry, Transition};

use super::backend::{StateBackend, StoredRecord};

#[derive(Default)]
pub struct MemoryBackend {
    /// Serialized record and its version
    records: Mutex<HashMap<String, (String, i64)>>,
    journal: Mutex<Vec<JournalEntry>>,
    /// Number of upcoming commits that will fail
    failing_commits: AtomicU32,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` commits fail with a simulated I/O error.
    pub fn fail_next_commits(&self, count: u32) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Stores raw JSON for `domain`, bypassing serialization.
    ///
    /// Bumps the version like any other writer would.
    pub fn insert_raw(&self, domain: &str, json: &str) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let version = records.get(domain).map_or(0, |(_, v)| v + 1);
        records.insert(domain.to_string(), (json.to_string(), version));
    }

    fn take_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl StateBackend for MemoryBackend {
    async fn load(&self, domain: &str) -> Result<Option<StoredRecord>, DatabaseError> {
        let stored = self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(domain)
            .cloned();
        match stored {
            Some((json, version)) => Ok(Some(StoredRecord {
                record: serde_json::from_str(&json)?,
                version,
            })),
            None => Ok(None),
        }
    }

    async fn commit(
        &self,
        record: &DomainRecord,
        transitions: &[Transition],
        expected: Option<i64>,
    ) -> Result<(), DatabaseError> {
        if self.take_failure() {
            return Err(DatabaseError::SqlError(sqlx::Error::Io(std::io::Error::other(
                "simulated commit failure",
            ))));
        }

        let json = serde_json::to_string(record)?;
        // Lock order: records, then journal
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let current = records.get(&record.domain).map(|(_, version)| *version);
        if current != expected {
            return Err(DatabaseError::WriteConflict {
                domain: record.domain.clone(),
            });
        }
        let mut journal = self.journal.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(
            record.domain.clone(),
            (json, expected.map_or(0, |version| version + 1)),
        );
        journal.extend(transitions.iter().map(|t| JournalEntry {
            domain: record.domain.clone(),
            kind: t.kind,
            at: t.at,
            detail: t.detail.clone(),
        }));
        Ok(())
    }

    async fn list_domains(&self) -> Result<Vec<String>, DatabaseError> {
        let mut domains: Vec<String> = self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        domains.sort();
        Ok(domains)
    }

    async fn history(&self, domain: &str, limit: u32) -> Result<Vec<JournalEntry>, DatabaseError> {
        let journal = self.journal.lock().unwrap_or_else(|e| e.into_inner());
        Ok(journal
            .iter()
            .rev()
            .filter(|entry| entry.domain == domain)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
