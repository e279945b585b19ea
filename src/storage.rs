//! Local persistence for notification markers and events.
//!
//! Everything lives in one `SQLite` database under the storage root:
//!
//! ```text
//! <root>/notify.sqlite
//!   notification_marker   # One row per watched application
//!   event                 # Append-only delivery events
//! ```
//!
//! Connections are opened per call, so a `Storage` can be shared freely
//! between worker threads.

mod event;
mod marker;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use rusqlite::Connection;

use crate::model::ResourceKey;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("notification marker not found: {0}")]
    NotFound(ResourceKey),

    #[error("notification marker already exists: {0}")]
    AlreadyExists(ResourceKey),

    /// The stored `resource_version` moved on since the marker was read.
    #[error("notification marker was modified concurrently: {0}")]
    Conflict(ResourceKey),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = core::result::Result<T, StorageError>;

const DB_FILE: &str = "notify.sqlite";

/// How long a writer waits for another connection's lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS notification_marker (
        namespace           TEXT NOT NULL,
        name                TEXT NOT NULL,
        owner_uid           TEXT NOT NULL,
        current_state       TEXT,
        last_notified_state TEXT,
        phase_observed      TEXT,
        phase_notified      TEXT,
        health_observed     TEXT,
        health_notified     TEXT,
        resource_version    INTEGER NOT NULL,
        updated_at          TEXT NOT NULL,
        PRIMARY KEY (namespace, name)
    );
    CREATE TABLE IF NOT EXISTS event (
        id              TEXT PRIMARY KEY,
        namespace       TEXT NOT NULL,
        name            TEXT NOT NULL,
        type            TEXT NOT NULL,
        reason          TEXT NOT NULL,
        message         TEXT NOT NULL,
        notification_id TEXT,
        recorded_at     TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS event_by_resource ON event (namespace, name, recorded_at);
";

/// `SQLite`-backed storage for markers and events.
#[derive(Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Creates a storage instance rooted at the given directory.
    ///
    /// The directory and the schema are created if they don't exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let storage = Self { root };
        storage.open_db()?.execute_batch(SCHEMA)?;
        Ok(storage)
    }

    /// Returns the default storage root: `~/.argocd-notify/`.
    pub fn default_root() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".argocd-notify"))
    }

    fn open_db(&self) -> Result<Connection> {
        let conn = Connection::open(self.root.join(DB_FILE))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }
}

/// Parses a timestamp column.
fn parse_timestamp(column: &str, value: &str) -> Result<jiff::Timestamp> {
    value
        .parse()
        .map_err(|e| StorageError::Corrupt(format!("invalid {column}: {e}")))
}
