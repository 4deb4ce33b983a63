//! SQLite state database
//!
//! Every completed install is a row in `installs`. At most one row per package
//! is active; reinstalling deactivates the previous row in the same
//! transaction that inserts the new one, so superseded installs remain as
//! history.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use thiserror::Error;

use kiln_schema::{PackageName, Version};

use crate::registry::{HistoryEntry, InstallRecord};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// State database for tracking installations
#[derive(Debug)]
pub struct StateDb {
    conn: Connection,
}

const COLUMNS: &str = "name, version, revision, install_path, host, completed_at, active";

impl StateDb {
    /// Open or create the database at `path`.
    pub fn open_at(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS installs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                revision TEXT,
                install_path TEXT NOT NULL,
                host INTEGER NOT NULL DEFAULT 0,
                completed_at INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_installs_name ON installs(name);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_installs_active
                ON installs(name) WHERE active = 1;
            ",
        )?;
        Ok(())
    }

    /// Insert `record` as the active install, superseding any previous one.
    pub fn commit(&mut self, record: &InstallRecord) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE installs SET active = 0 WHERE name = ?1 AND active = 1",
            params![record.name.as_str()],
        )?;
        tx.execute(
            "INSERT INTO installs (name, version, revision, install_path, host, completed_at, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
            params![
                record.name.as_str(),
                record.version.as_str(),
                record.revision,
                record.install_path.to_string_lossy().to_string(),
                record.host,
                record.completed_at.timestamp_millis(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Delete every row for `name`, history included. Returns the row count.
    pub fn remove(&self, name: &str) -> Result<usize, DbError> {
        let deleted = self
            .conn
            .execute("DELETE FROM installs WHERE name = ?1", params![name])?;
        Ok(deleted)
    }

    /// All active installs, ordered by name.
    pub fn active(&self) -> Result<Vec<InstallRecord>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM installs WHERE active = 1 ORDER BY name"
        ))?;
        let rows = stmt.query_map([], |row| Ok(read_entry(row)?.record))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Every install of `name`, newest first.
    pub fn history(&self, name: &str) -> Result<Vec<HistoryEntry>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM installs WHERE name = ?1 ORDER BY id DESC"
        ))?;
        let rows = stmt.query_map(params![name], read_entry)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

fn read_entry(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let name: String = row.get(0)?;
    let version: String = row.get(1)?;
    let install_path: String = row.get(3)?;
    let completed_at: i64 = row.get(5)?;

    Ok(HistoryEntry {
        record: InstallRecord {
            name: PackageName::new(&name),
            version: Version::new(&version),
            revision: row.get(2)?,
            install_path: PathBuf::from(install_path),
            host: row.get(4)?,
            completed_at: DateTime::<Utc>::from_timestamp_millis(completed_at).unwrap_or_default(),
        },
        active: row.get(6)?,
    })
}
