//! Storage layer for chamada.
//!
//! A single `SQLite` file holds the device key-value store written by login
//! (session token, student id) and a journal of scan attempt outcomes.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// How a scan attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The server accepted the attendance.
    Recorded,
    /// The server answered with a non-2xx status.
    Rejected,
    /// No response arrived.
    NetworkFailure,
    /// The QR payload was unreadable or incomplete.
    InvalidPayload,
    /// The device position was not available.
    LocationUnavailable,
}

impl AttemptOutcome {
    /// Stable name stored in the database.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Recorded => "recorded",
            Self::Rejected => "rejected",
            Self::NetworkFailure => "network_failure",
            Self::InvalidPayload => "invalid_payload",
            Self::LocationUnavailable => "location_unavailable",
        }
    }

    fn from_db(value: &str) -> Option<Self> {
        Some(match value {
            "recorded" => Self::Recorded,
            "rejected" => Self::Rejected,
            "network_failure" => Self::NetworkFailure,
            "invalid_payload" => Self::InvalidPayload,
            "location_unavailable" => Self::LocationUnavailable,
            _ => return None,
        })
    }
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// One journaled scan attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptEntry {
    /// Row id (assigned by storage).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// When the attempt ended.
    pub timestamp: DateTime<Utc>,
    /// Roll call id, when the payload was readable.
    pub call_id: Option<String>,
    /// BLAKE3 hash of the scanned text.
    pub payload_hash: String,
    /// How it ended.
    pub outcome: AttemptOutcome,
    /// Text shown to the user.
    pub message: String,
}

impl AttemptEntry {
    /// Create an entry stamped now.
    #[must_use]
    pub fn new(
        call_id: Option<String>,
        payload_hash: String,
        outcome: AttemptOutcome,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            call_id,
            payload_hash,
            outcome,
            message: message.into(),
        }
    }
}

/// `SQLite`-backed device storage.
#[derive(Debug)]
pub struct Storage {
    path: PathBuf,
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a stored value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Store a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            r"
            INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            ",
            params![key, value],
        )?;
        debug!(key, "stored value");
        Ok(())
    }

    /// Remove a value. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let affected = self.conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(affected > 0)
    }

    /// Append an attempt to the journal, returning its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn record_attempt(&self, entry: &AttemptEntry) -> Result<i64> {
        self.conn.execute(
            r"
            INSERT INTO attempts (timestamp, call_id, payload_hash, outcome, message)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                entry.timestamp.to_rfc3339(),
                entry.call_id,
                entry.payload_hash,
                entry.outcome.as_str(),
                entry.message,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, outcome = %entry.outcome, "journaled attempt");
        Ok(id)
    }

    /// Most recent attempts, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent_attempts(&self, limit: usize) -> Result<Vec<AttemptEntry>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, timestamp, call_id, payload_hash, outcome, message
            FROM attempts ORDER BY timestamp DESC, id DESC LIMIT ?1
            ",
        )?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let entries = stmt
            .query_map([limit_i64], Self::row_to_attempt)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Count journaled attempts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_attempts(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM attempts", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Keep only the `keep_count` most recent attempts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_attempts(&self, keep_count: usize) -> Result<usize> {
        let keep_i64 = i64::try_from(keep_count).unwrap_or(i64::MAX);
        let affected = self.conn.execute(
            r"
            DELETE FROM attempts WHERE id NOT IN (
                SELECT id FROM attempts ORDER BY timestamp DESC, id DESC LIMIT ?1
            )
            ",
            [keep_i64],
        )?;

        if affected > 0 {
            info!("Pruned {} attempts to keep {} recent", affected, keep_count);
        }
        Ok(affected)
    }

    fn row_to_attempt(row: &rusqlite::Row) -> rusqlite::Result<AttemptEntry> {
        let timestamp_str: String = row.get(1)?;
        let outcome_str: String = row.get(4)?;

        let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
            .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc));
        let outcome = AttemptOutcome::from_db(&outcome_str).unwrap_or_else(|| {
            warn!("Unknown attempt outcome: {}, reading as rejected", outcome_str);
            AttemptOutcome::Rejected
        });

        Ok(AttemptEntry {
            id: Some(row.get(0)?),
            timestamp,
            call_id: row.get(2)?,
            payload_hash: row.get(3)?,
            outcome,
            message: row.get(5)?,
        })
    }
}

/// Asynchronous persistence as the scanner screen sees it.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Read a value written by the login flow.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Journal a finished attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    async fn record_attempt(&self, entry: AttemptEntry) -> Result<()>;
}

/// [`Storage`] shared with the screen; prunes the journal as it grows.
#[derive(Debug, Clone)]
pub struct SharedStorage {
    inner: Arc<Mutex<Storage>>,
    max_attempts: usize,
}

impl SharedStorage {
    /// Share `storage`, keeping at most `max_attempts` journal rows (0 = unlimited).
    #[must_use]
    pub fn new(storage: Storage, max_attempts: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(storage)),
            max_attempts,
        }
    }

    /// Run `f` against the database on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Storage) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let storage = inner
                .lock()
                .map_err(|_| Error::internal("storage lock poisoned"))?;
            f(&storage)
        })
        .await
        .map_err(|e| Error::internal(format!("storage task failed: {e}")))?
    }
}

#[async_trait]
impl DeviceStore for SharedStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.run(move |storage| storage.get(&key)).await
    }

    async fn record_attempt(&self, entry: AttemptEntry) -> Result<()> {
        let max_attempts = self.max_attempts;
        self.run(move |storage| {
            storage.record_attempt(&entry)?;
            if max_attempts > 0 {
                storage.prune_attempts(max_attempts)?;
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    fn entry(outcome: AttemptOutcome) -> AttemptEntry {
        AttemptEntry::new(Some("7".to_string()), "abc".to_string(), outcome, "msg")
    }

    #[test]
    fn test_set_get_remove() {
        let storage = create_test_storage();
        assert_eq!(storage.get("@token").unwrap(), None);

        storage.set("@token", "first").unwrap();
        storage.set("@token", "second").unwrap();
        assert_eq!(storage.get("@token").unwrap().as_deref(), Some("second"));

        assert!(storage.remove("@token").unwrap());
        assert!(!storage.remove("@token").unwrap());
        assert_eq!(storage.get("@token").unwrap(), None);
    }

    #[test]
    fn test_record_and_list_attempts() {
        let storage = create_test_storage();
        storage.record_attempt(&entry(AttemptOutcome::Rejected)).unwrap();
        storage.record_attempt(&entry(AttemptOutcome::Recorded)).unwrap();

        let recent = storage.recent_attempts(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].outcome, AttemptOutcome::Recorded);
        assert_eq!(recent[0].call_id.as_deref(), Some("7"));
        assert!(recent[0].id.is_some());
    }

    #[test]
    fn test_prune_attempts() {
        let storage = create_test_storage();
        for _ in 0..5 {
            storage.record_attempt(&entry(AttemptOutcome::NetworkFailure)).unwrap();
        }

        assert_eq!(storage.prune_attempts(2).unwrap(), 3);
        assert_eq!(storage.count_attempts().unwrap(), 2);
        assert_eq!(storage.prune_attempts(10).unwrap(), 0);
    }

    #[test]
    fn test_attempt_outcome_round_trips_through_db_names() {
        for outcome in [
            AttemptOutcome::Recorded,
            AttemptOutcome::Rejected,
            AttemptOutcome::NetworkFailure,
            AttemptOutcome::InvalidPayload,
            AttemptOutcome::LocationUnavailable,
        ] {
            assert_eq!(AttemptOutcome::from_db(outcome.as_str()), Some(outcome));
        }
        assert_eq!(AttemptOutcome::from_db("bogus"), None);
    }

    #[test]
    fn test_open_file_based_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chamada.db");

        {
            let storage = Storage::open(&path).unwrap();
            storage.set("@id_aluno", "42").unwrap();
            assert_eq!(storage.path(), path.as_path());
        }

        let reopened = Storage::open(&path).unwrap();
        assert_eq!(reopened.get("@id_aluno").unwrap().as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_shared_storage_prunes_journal() {
        let shared = SharedStorage::new(create_test_storage(), 3);
        for _ in 0..5 {
            shared.record_attempt(entry(AttemptOutcome::Recorded)).await.unwrap();
        }

        let count = shared.run(Storage::count_attempts).await.unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_shared_storage_get() {
        let storage = create_test_storage();
        storage.set("@token", "abc").unwrap();
        let shared = SharedStorage::new(storage, 0);

        assert_eq!(shared.get("@token").await.unwrap().as_deref(), Some("abc"));
        assert_eq!(shared.get("@missing").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shared_storage_concurrent_writes() {
        let shared = Arc::new(SharedStorage::new(create_test_storage(), 0));
        let mut writers = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let shared = Arc::clone(&shared);
            writers.spawn(async move {
                shared
                    .record_attempt(entry(AttemptOutcome::Rejected))
                    .await
            });
        }
        while let Some(written) = writers.join_next().await {
            written.unwrap().unwrap();
        }

        let count = shared.run(Storage::count_attempts).await.unwrap();
        assert_eq!(count, 8);
    }
}
