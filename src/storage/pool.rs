//! Database connection pool management.
//!
//! This module initializes and configures the SQLite connection pool with:
//! - WAL mode and `synchronous=FULL`, so a returned commit survives a crash
//! - A busy timeout for writers contending on the file
//! - Automatic database file (and parent directory) creation

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use log::{error, info};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::error_handling::DatabaseError;

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
/// Pool size for the file-backed database
const MAX_CONNECTIONS: u32 = 5;

/// Initializes and returns a connection pool for the database at `db_path`.
///
/// Creates the database file if it doesn't exist.
///
/// # Errors
///
/// Returns `DatabaseError::FileCreationError` if the file or its directory
/// cannot be created, and `DatabaseError::SqlError` if connecting fails.
pub async fn init_db_pool_with_path(db_path: &Path) -> Result<SqlitePool, DatabaseError> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            error!("Failed to create database directory {}: {e}", parent.display());
            DatabaseError::FileCreationError(e.to_string())
        })?;
    }

    match OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(db_path)
    {
        Ok(_) => info!("Database file created at {}", db_path.display()),
        Err(ref e) if e.kind() == ErrorKind::AlreadyExists => {
            info!("Using existing database at {}", db_path.display())
        }
        Err(e) => {
            error!("Failed to create database file: {e}");
            return Err(DatabaseError::FileCreationError(e.to_string()));
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .map_err(DatabaseError::SqlError)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(BUSY_TIMEOUT);

    SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {e}");
            DatabaseError::SqlError(e)
        })
}

/// Pool over a private in-memory database.
///
/// Limited to a single connection: every new connection to `sqlite::memory:`
/// would see its own empty database.
pub async fn init_memory_pool() -> Result<SqlitePool, DatabaseError> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .map_err(DatabaseError::SqlError)
}
