//! SQLite-backed state persistence.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::DateTime;
use sqlx::{Row, SqlitePool};

use crate::error_handling::DatabaseError;
use crate::models::{DomainRecord, JournalEntry, Transition, TransitionKind};

use super::backend::{StateBackend, StoredRecord};
use super::migrations::run_migrations;

/// One row per domain holding the JSON record, plus the `transitions` journal.
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Wraps `pool` and brings its schema up to date.
    pub async fn new(pool: SqlitePool) -> Result<Self, DatabaseError> {
        run_migrations(&pool).await?;
        Ok(SqliteBackend { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl StateBackend for SqliteBackend {
    async fn load(&self, domain: &str) -> Result<Option<StoredRecord>, DatabaseError> {
        let row = sqlx::query("SELECT record_json, version FROM domain_records WHERE domain = ?")
            .bind(domain)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let json: String = row.try_get("record_json")?;
                Ok(Some(StoredRecord {
                    record: serde_json::from_str(&json)?,
                    version: row.try_get("version")?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn commit(
        &self,
        record: &DomainRecord,
        transitions: &[Transition],
        expected: Option<i64>,
    ) -> Result<(), DatabaseError> {
        let record_json = serde_json::to_string(record)?;
        // The first statement writes, so the transaction takes the write lock
        // before it reads the version it compares against.
        let mut tx = self.pool.begin().await?;

        let written = match expected {
            None => sqlx::query(
                "INSERT INTO domain_records (
                    domain, record_json, health_state, renewal_mode, created_at_ms, updated_at_ms
                ) VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(domain) DO NOTHING",
            )
            .bind(&record.domain)
            .bind(&record_json)
            .bind(record.health_state.to_string())
            .bind(record.renewal_mode.to_string())
            .bind(record.created_at.timestamp_millis())
            .bind(record.updated_at.timestamp_millis())
            .execute(&mut *tx)
            .await?,
            Some(version) => sqlx::query(
                "UPDATE domain_records SET
                    record_json = ?,
                    health_state = ?,
                    renewal_mode = ?,
                    updated_at_ms = ?,
                    version = version + 1
                WHERE domain = ? AND version = ?",
            )
            .bind(&record_json)
            .bind(record.health_state.to_string())
            .bind(record.renewal_mode.to_string())
            .bind(record.updated_at.timestamp_millis())
            .bind(&record.domain)
            .bind(version)
            .execute(&mut *tx)
            .await?,
        };
        if written.rows_affected() == 0 {
            // Dropping `tx` rolls back
            return Err(DatabaseError::WriteConflict {
                domain: record.domain.clone(),
            });
        }

        for transition in transitions {
            sqlx::query(
                "INSERT INTO transitions (domain, kind, at_ms, detail_json) VALUES (?, ?, ?, ?)",
            )
            .bind(&record.domain)
            .bind(transition.kind.to_string())
            .bind(transition.at.timestamp_millis())
            .bind(serde_json::to_string(&transition.detail)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_domains(&self) -> Result<Vec<String>, DatabaseError> {
        let rows = sqlx::query("SELECT domain FROM domain_records ORDER BY domain")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("domain").map_err(DatabaseError::from))
            .collect()
    }

    async fn history(&self, domain: &str, limit: u32) -> Result<Vec<JournalEntry>, DatabaseError> {
        let rows = sqlx::query(
            "SELECT kind, at_ms, detail_json FROM transitions
             WHERE domain = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(domain)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let kind: String = row.try_get("kind")?;
            let Ok(kind) = TransitionKind::from_str(&kind) else {
                // Written by a newer version; skip rather than fail the read
                log::debug!("Skipping journal entry of unknown kind '{kind}' for {domain}");
                continue;
            };
            let at_ms: i64 = row.try_get("at_ms")?;
            let detail: String = row.try_get("detail_json")?;
            entries.push(JournalEntry {
                domain: domain.to_string(),
                kind,
                at: DateTime::from_timestamp_millis(at_ms).unwrap_or_default(),
                detail: serde_json::from_str(&detail)?,
            });
        }
        Ok(entries)
    }
}
