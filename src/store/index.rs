//! SQLite hash index.
//!
//! The index is shared by every scraper and worker process on the host, so
//! it never holds a connection between calls: each logical operation opens
//! a connection, runs inside an `IMMEDIATE` transaction, commits and closes.

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::store::schema::apply_schema;
use crate::store::types::{ContentRecord, ContentStatus, IndexCounts};

/// Default busy timeout while another process holds the write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the on-disk content index.
#[derive(Debug, Clone)]
pub struct HashIndex {
    path: PathBuf,
}

impl HashIndex {
    /// Open (creating if needed) the index at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let index = Self {
            path: path.to_path_buf(),
        };
        let conn = index.connect()?;
        apply_schema(&conn)?;
        Ok(index)
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh connection with the busy timeout applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Run a write under an `IMMEDIATE` transaction on a short-lived connection.
    ///
    /// The transaction is rolled back if the closure fails.
    fn mutate<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Insert a `pending` row unless the hash is already known.
    ///
    /// Returns `true` if a row was inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_pending(&self, hash: &str, content_path: &str, created_at: &str) -> Result<bool> {
        self.mutate(|tx| {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO content_index (hash, status, content_path, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![hash, ContentStatus::Pending.as_str(), content_path, created_at],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Transition a row to `completed`.
    ///
    /// When no row exists yet (a result delivered without a prior content
    /// submission) a completed row is inserted pointing at
    /// `expected_content_path`, which may not exist on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the update or insert fails.
    pub fn mark_completed(
        &self,
        hash: &str,
        expected_content_path: &str,
        result_path: &str,
        job_id: &str,
        processed_at: &str,
    ) -> Result<()> {
        self.mutate(|tx| {
            let updated = tx.execute(
                "UPDATE content_index
                 SET status = ?2, result_path = ?3, job_id = ?4, processed_at = ?5
                 WHERE hash = ?1",
                rusqlite::params![
                    hash,
                    ContentStatus::Completed.as_str(),
                    result_path,
                    job_id,
                    processed_at
                ],
            )?;

            if updated == 0 {
                tx.execute(
                    "INSERT OR IGNORE INTO content_index
                     (hash, status, content_path, result_path, job_id, created_at, processed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                    rusqlite::params![
                        hash,
                        ContentStatus::Completed.as_str(),
                        expected_content_path,
                        result_path,
                        job_id,
                        processed_at
                    ],
                )?;
            }
            Ok(())
        })
    }

    /// Fetch a row by hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, hash: &str) -> Result<Option<ContentRecord>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT hash, status, content_path, result_path, job_id, created_at, processed_at
                 FROM content_index WHERE hash = ?1",
                [hash],
                |row| {
                    let status: String = row.get(1)?;
                    Ok(ContentRecord {
                        hash: row.get(0)?,
                        status: status.parse().unwrap_or(ContentStatus::Pending),
                        content_path: row.get(2)?,
                        result_path: row.get(3)?,
                        job_id: row.get(4)?,
                        created_at: row.get(5)?,
                        processed_at: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Job id linked to a hash, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn job_id(&self, hash: &str) -> Result<Option<String>> {
        let conn = self.connect()?;
        let job: Option<Option<String>> = conn
            .query_row(
                "SELECT job_id FROM content_index WHERE hash = ?1",
                [hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(job.flatten())
    }

    /// Set or clear the job id. Returns `true` if a row was touched.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn set_job_id(&self, hash: &str, job_id: Option<&str>) -> Result<bool> {
        self.mutate(|tx| {
            let updated = tx.execute(
                "UPDATE content_index SET job_id = ?2 WHERE hash = ?1",
                rusqlite::params![hash, job_id],
            )?;
            Ok(updated > 0)
        })
    }

    /// Aggregate row counts by status.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn counts(&self) -> Result<IndexCounts> {
        let conn = self.connect()?;
        let counts = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0)
             FROM content_index",
            [],
            |row| {
                let total: i64 = row.get(0)?;
                let completed: i64 = row.get(1)?;
                let pending: i64 = row.get(2)?;
                Ok(IndexCounts {
                    total: u64::try_from(total).unwrap_or(0),
                    completed: u64::try_from(completed).unwrap_or(0),
                    pending: u64::try_from(pending).unwrap_or(0),
                })
            },
        )?;
        Ok(counts)
    }

    /// Current journal mode as reported by SQLite.
    ///
    /// # Errors
    ///
    /// Returns an error if the pragma query fails.
    pub fn journal_mode(&self) -> Result<String> {
        let conn = self.connect()?;
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        Ok(mode)
    }
}
