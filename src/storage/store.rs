//! The domain state store.
//!
//! Canonical owner of every `DomainRecord`. Mutations on one domain are
//! serialized by a per-domain async mutex acquired with a deadline; different
//! domains never contend beyond the lock-map lookup. Each mutation is a
//! read-modify-commit cycle: the closure works on a copy, and only a
//! successful commit makes it visible, so a failed write leaves the
//! previously durable record in place. Commits are conditional on the version
//! that was read; when another process wrote in between, the mutation is
//! re-run on the fresh record.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_retry::RetryIf;

use crate::clock::Clock;
use crate::config::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT, STORE_CONFLICT_MAX_RETRIES};
use crate::domain::normalize_domain;
use crate::error_handling::{get_retry_strategy, DatabaseError, StoreError};
use crate::models::{DomainRecord, JournalEntry, RepairAttempt, Transition, TransitionKind};

use super::backend::{StateBackend, StoredRecord};
use super::circuit_breaker::StoreWriteCircuitBreaker;
use super::memory::MemoryBackend;
use super::pool::init_db_pool_with_path;
use super::sqlite::SqliteBackend;

/// Transitions collected while a mutation runs, all stamped with one time.
pub struct Journal {
    at: DateTime<Utc>,
    entries: Vec<Transition>,
}

impl Journal {
    pub(crate) fn new(at: DateTime<Utc>) -> Self {
        Journal {
            at,
            entries: Vec::new(),
        }
    }

    /// Time of the mutation, as read from the store's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.at
    }

    pub fn record(&mut self, kind: TransitionKind, detail: impl Serialize) {
        self.entries.push(Transition::new(kind, self.at, detail));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

type LockMap = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Held per-domain lock. Its map entry is dropped once nobody else uses it.
pub(crate) struct DomainLock<'a> {
    locks: &'a LockMap,
    domain: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DomainLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        prune_lock(self.locks, &self.domain);
    }
}

fn prune_lock(locks: &LockMap, domain: &str) {
    let mut locks = locks.lock().unwrap_or_else(|e| e.into_inner());
    if locks
        .get(domain)
        .is_some_and(|lock| Arc::strong_count(lock) == 1)
    {
        locks.remove(domain);
    }
}

pub struct DomainStateStore {
    backend: Arc<dyn StateBackend>,
    locks: LockMap,
    lock_timeout: Duration,
    breaker: StoreWriteCircuitBreaker,
    clock: Arc<dyn Clock>,
}

impl DomainStateStore {
    pub fn new(backend: Arc<dyn StateBackend>, clock: Arc<dyn Clock>, lock_timeout: Duration) -> Self {
        DomainStateStore {
            backend,
            locks: Mutex::new(HashMap::new()),
            lock_timeout,
            breaker: StoreWriteCircuitBreaker::new(),
            clock,
        }
    }

    /// Opens (or creates) the SQLite database at `db_path`.
    pub async fn open(
        db_path: &Path,
        clock: Arc<dyn Clock>,
        lock_timeout: Duration,
    ) -> Result<Self, DatabaseError> {
        let pool = init_db_pool_with_path(db_path).await?;
        let backend = SqliteBackend::new(pool).await?;
        Ok(Self::new(Arc::new(backend), clock, lock_timeout))
    }

    /// Store over a fresh `MemoryBackend`.
    pub fn in_memory(clock: Arc<dyn Clock>, lock_timeout: Duration) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), clock, lock_timeout)
    }

    /// Replaces the write circuit breaker.
    pub fn with_circuit_breaker(mut self, breaker: StoreWriteCircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Whether writes are currently suspended by the circuit breaker.
    pub fn is_degraded(&self) -> bool {
        self.breaker.is_open()
    }

    /// Current record for `raw_domain`, or a fresh default if none is stored.
    ///
    /// Never creates a row; the record is persisted by its first mutation.
    pub async fn get(&self, raw_domain: &str) -> Result<DomainRecord, StoreError> {
        let domain = normalize_domain(raw_domain)?;
        let (record, _) = self.load_or_default(&domain).await?;
        Ok(record)
    }

    /// Atomic read-modify-write of one domain's record.
    ///
    /// `f` runs on a copy of the current record while the domain lock is
    /// held. Health is re-derived and `updated_at` bumped before the commit.
    /// When `f` changes nothing and journals nothing, no write is issued.
    /// If another writer of the same database committed after the read, `f`
    /// runs again on the newer record, so it must not have side effects
    /// beyond the record and the journal.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidDomain` if `raw_domain` does not normalize
    /// - `StoreError::LockTimeout` if the domain lock is not acquired in time
    /// - `StoreError::CircuitOpen` while the write circuit is open
    /// - `StoreError::Persistence` when the commit still fails after retries,
    ///   or keeps conflicting with other writers
    pub async fn mutate<T, F>(
        &self,
        raw_domain: &str,
        mut f: F,
    ) -> Result<(DomainRecord, T), StoreError>
    where
        F: FnMut(&mut DomainRecord, &mut Journal) -> T + Send,
        T: Send,
    {
        let domain = normalize_domain(raw_domain)?;
        let _lock = self.lock_domain(&domain).await?;

        let mut conflicts = 0;
        loop {
            let (original, version) = self.load_or_default(&domain).await?;
            let mut record = original.clone();
            let mut journal = Journal::new(self.clock.now());
            let output = f(&mut record, &mut journal);
            record.domain = domain.clone();
            record.refresh_health();

            if record == original && journal.is_empty() {
                return Ok((record, output));
            }
            record.updated_at = journal.now();

            match self.commit(&record, &journal.entries, version).await {
                Ok(()) => return Ok((record, output)),
                Err(StoreError::Persistence(e))
                    if e.is_conflict() && conflicts < STORE_CONFLICT_MAX_RETRIES =>
                {
                    conflicts += 1;
                    debug!("{domain} was written by another store, re-running mutation ({conflicts})");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Appends one attempt to the audit trail.
    pub async fn append_attempt(
        &self,
        raw_domain: &str,
        attempt: RepairAttempt,
    ) -> Result<DomainRecord, StoreError> {
        let (record, _) = self
            .mutate(raw_domain, move |record, _| {
                record.append_attempt(attempt.clone());
            })
            .await?;
        Ok(record)
    }

    /// Every stored domain, sorted.
    pub async fn list_domains(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.backend.list_domains().await?)
    }

    /// Most recent journal entries, newest first.
    pub async fn history(
        &self,
        raw_domain: &str,
        limit: Option<u32>,
    ) -> Result<Vec<JournalEntry>, StoreError> {
        let domain = normalize_domain(raw_domain)?;
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
        Ok(self.backend.history(&domain, limit).await?)
    }

    async fn load_or_default(
        &self,
        domain: &str,
    ) -> Result<(DomainRecord, Option<i64>), StoreError> {
        let (mut record, version) = match self.backend.load(domain).await? {
            Some(StoredRecord { record, version }) => (record, Some(version)),
            None => (DomainRecord::new(domain, self.clock.now()), None),
        };
        record.refresh_health();
        Ok((record, version))
    }

    pub(crate) async fn lock_domain(&self, domain: &str) -> Result<DomainLock<'_>, StoreError> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(domain.to_string()).or_default().clone()
        };

        let acquired = tokio::time::timeout(self.lock_timeout, lock.lock_owned()).await;
        match acquired {
            Ok(guard) => Ok(DomainLock {
                locks: &self.locks,
                domain: domain.to_string(),
                guard: Some(guard),
            }),
            Err(_) => {
                prune_lock(&self.locks, domain);
                warn!("Timed out waiting for the state lock on {domain}");
                Err(StoreError::LockTimeout {
                    domain: domain.to_string(),
                    secs: self.lock_timeout.as_secs(),
                })
            }
        }
    }

    /// Domains with a lock entry, held or awaited.
    #[cfg(test)]
    pub(crate) fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn commit(
        &self,
        record: &DomainRecord,
        transitions: &[Transition],
        expected: Option<i64>,
    ) -> Result<(), StoreError> {
        if self.breaker.is_circuit_open().await {
            warn!(
                "State store degraded: dropping write for {} while the circuit is open",
                record.domain
            );
            return Err(StoreError::CircuitOpen);
        }

        let result = RetryIf::spawn(
            get_retry_strategy(),
            move || async move {
                let result = self.backend.commit(record, transitions, expected).await;
                match &result {
                    Err(e) if !e.is_conflict() => {
                        warn!("Commit for {} failed, will retry: {e}", record.domain)
                    }
                    _ => {}
                }
                result
            },
            |e: &DatabaseError| !e.is_conflict(),
        )
        .await;

        match result {
            Ok(()) => {
                self.breaker.record_success().await;
                debug!(
                    "Committed {} ({} transition(s), health={})",
                    record.domain,
                    transitions.len(),
                    record.health_state
                );
                Ok(())
            }
            Err(e) if e.is_conflict() => Err(StoreError::Persistence(e)),
            Err(e) => {
                self.breaker.record_failure().await;
                error!("Giving up on commit for {}: {e}", record.domain);
                Err(StoreError::Persistence(e))
            }
        }
    }
}
