//! SQLite target registry implementation.

use rusqlite::{params, Connection, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;
use super::TargetRegistry;

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("connection lock poisoned")]
    Poisoned,
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.lock()?;
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }
}

impl TargetRegistry for Store {
    fn insert_target(&self, target: &Target) -> Result<(), DbError> {
        let interval = i64::try_from(target.collection_interval).unwrap_or(i64::MAX);
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO targets (url, collection_interval) VALUES (?1, ?2)",
            params![target.url, interval],
        )?;
        Ok(())
    }

    fn find_targets(&self) -> Result<Vec<Target>, DbError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT url, collection_interval FROM targets ORDER BY id ASC")?;

        let targets = stmt
            .query_map([], |row| {
                let interval: i64 = row.get(1)?;
                Ok(Target {
                    url: row.get(0)?,
                    // Negative intervals cannot be scheduled; surface them as 0.
                    collection_interval: u64::try_from(interval).unwrap_or(0),
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(targets)
    }
}
