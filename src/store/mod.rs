//! Content-addressed store.
//!
//! Raw scraped content is keyed by its SHA-256 digest so identical pages are
//! processed once. The store owns three things under its root:
//!
//! - `index.db` - the [`HashIndex`], authoritative record of every digest
//! - `content/<hh>/<hash>.json` - raw content plus scraper metadata
//! - `results/<hh>/<hash>.json` - processed result plus producing job id
//!
//! The two-character shard directory keeps fan-out at 256 per level.
//!
//! # Concurrency
//!
//! Many scraper and worker processes write concurrently. Index writes are
//! connection-scoped transactions; file writes go through temp-and-rename
//! and a content file is only ever written while absent. Two writers racing
//! on the same digest are writing the same content, so either may win.
//!
//! # Submodules
//!
//! - [`hash`] - digest computation and validation
//! - [`index`] - SQLite hash index
//! - [`schema`] - index schema
//! - [`types`] - records, files and statistics

pub mod hash;
pub mod index;
pub mod schema;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::collab::jobs::{JobStatusLookup, NoJobQueue};
use crate::error::Result;
use crate::sync::file::{dir_size, read_json, write_json_atomic};

pub use hash::{hash_content, is_valid_hash, validate_hash};
pub use index::HashIndex;
pub use types::{
    ContentFile, ContentRecord, ContentStatus, IndexCounts, ResultFile, StoreOutcome,
    StoreStatistics,
};

/// Directory of raw content files.
pub const CONTENT_DIR: &str = "content";
/// Directory of result files.
pub const RESULTS_DIR: &str = "results";
/// File name of the hash index inside the store root.
pub const INDEX_FILE: &str = "index.db";

/// Store-relative path of the content file for a validated hash.
#[must_use]
pub fn content_rel_path(hash: &str) -> String {
    format!("{CONTENT_DIR}/{}/{hash}.json", &hash[..2])
}

/// Store-relative path of the result file for a validated hash.
#[must_use]
pub fn result_rel_path(hash: &str) -> String {
    format!("{RESULTS_DIR}/{}/{hash}.json", &hash[..2])
}

/// Content-addressed dedup cache with asynchronous result attachment.
///
/// Constructed explicitly and passed to whoever needs it; there is no
/// process-wide instance.
pub struct ContentStore {
    root: PathBuf,
    index: HashIndex,
    jobs: Arc<dyn JobStatusLookup>,
}

impl std::fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStore")
            .field("root", &self.root)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl ContentStore {
    /// Open a store rooted at `root`, creating directories and the index.
    ///
    /// # Errors
    ///
    /// Returns an error if the root or index cannot be created.
    pub fn open(root: &Path, jobs: Arc<dyn JobStatusLookup>) -> Result<Self> {
        std::fs::create_dir_all(root.join(CONTENT_DIR))?;
        std::fs::create_dir_all(root.join(RESULTS_DIR))?;
        let index = HashIndex::open(&root.join(INDEX_FILE))?;
        debug!(root = %root.display(), "Opened content store");
        Ok(Self {
            root: root.to_path_buf(),
            index,
            jobs,
        })
    }

    /// Open a store with no job queue attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the root or index cannot be created.
    pub fn open_standalone(root: &Path) -> Result<Self> {
        Self::open(root, Arc::new(NoJobQueue))
    }

    /// Rebind the job-status collaborator.
    #[must_use]
    pub fn with_job_status(mut self, jobs: Arc<dyn JobStatusLookup>) -> Self {
        self.jobs = jobs;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn index(&self) -> &HashIndex {
        &self.index
    }

    fn content_path(&self, hash: &str) -> PathBuf {
        self.root.join(content_rel_path(hash))
    }

    fn result_path(&self, hash: &str) -> PathBuf {
        self.root.join(result_rel_path(hash))
    }

    fn read_result_file(&self, hash: &str) -> Result<Option<ResultFile>> {
        read_json(&self.result_path(hash))
    }

    /// Submit raw content for deduplication.
    ///
    /// Returns `Completed` with the cached result when the digest has already
    /// been processed. Otherwise recovers a stale job link, records the
    /// content if it is new, and returns `Pending`; enqueuing work is the
    /// caller's decision.
    ///
    /// # Errors
    ///
    /// Returns an error if the index or the file system fails.
    pub fn store_content(
        &self,
        content: &str,
        metadata: serde_json::Value,
    ) -> Result<StoreOutcome> {
        let hash = hash_content(content);

        // A corrupt result file is a miss; the next store_result replaces it.
        let cached = self.read_result_file(&hash).unwrap_or_else(|e| {
            warn!(hash, error = %e, "Ignoring unreadable result file");
            None
        });
        if let Some(cached) = cached {
            debug!(hash, job_id = cached.job_id, "Dedup hit, returning cached result");
            return Ok(StoreOutcome {
                hash,
                status: ContentStatus::Completed,
                result: Some(cached.result),
                job_id: Some(cached.job_id),
            });
        }

        if let Some(job_id) = self.index.job_id(&hash)? {
            if !self.jobs.is_active(&job_id) {
                info!(hash, job_id, "Clearing stale job link");
                self.index.set_job_id(&hash, None)?;
            }
        }

        let path = self.content_path(&hash);
        let now = Utc::now().to_rfc3339();
        if path.exists() {
            debug!(hash, "Content already stored");
        } else {
            write_json_atomic(
                &path,
                &ContentFile {
                    content: content.to_string(),
                    metadata,
                    timestamp: now.clone(),
                },
            )?;
            debug!(hash, "Stored new content");
        }

        // Covers a crash between the file write and the insert on an
        // earlier attempt; a no-op when the row exists.
        self.index
            .insert_pending(&hash, &content_rel_path(&hash), &now)?;

        Ok(StoreOutcome {
            hash,
            status: ContentStatus::Pending,
            result: None,
            job_id: None,
        })
    }

    /// Attach a processed result to a digest.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHash` for a malformed digest, or an error if
    /// the write or index update fails.
    pub fn store_result(&self, hash: &str, result: &str, job_id: &str) -> Result<()> {
        validate_hash(hash)?;
        let now = Utc::now().to_rfc3339();

        write_json_atomic(
            &self.result_path(hash),
            &ResultFile {
                result: result.to_string(),
                job_id: job_id.to_string(),
                timestamp: now.clone(),
            },
        )?;

        self.index.mark_completed(
            hash,
            &content_rel_path(hash),
            &result_rel_path(hash),
            job_id,
            &now,
        )?;
        info!(hash, job_id, "Stored result");
        Ok(())
    }

    /// Cached result for a digest.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHash` for a malformed digest, or an error if
    /// the result file exists but cannot be read.
    pub fn get_result(&self, hash: &str) -> Result<Option<String>> {
        validate_hash(hash)?;
        Ok(self.read_result_file(hash)?.map(|r| r.result))
    }

    /// Raw content file for a digest; `None` when absent on disk, which is
    /// expected for rows created by an out-of-band result.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHash` for a malformed digest, or an error if
    /// the file exists but cannot be read.
    pub fn get_content(&self, hash: &str) -> Result<Option<ContentFile>> {
        validate_hash(hash)?;
        read_json(&self.content_path(hash))
    }

    /// Index row for a digest.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHash` for a malformed digest, or a database error.
    pub fn get_record(&self, hash: &str) -> Result<Option<ContentRecord>> {
        validate_hash(hash)?;
        self.index.get(hash)
    }

    /// Whether raw content is stored for a digest.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHash` for a malformed digest.
    pub fn has_content(&self, hash: &str) -> Result<bool> {
        validate_hash(hash)?;
        Ok(self.content_path(hash).exists())
    }

    /// Job id linked to a digest.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHash` for a malformed digest, or a database error.
    pub fn get_job_id(&self, hash: &str) -> Result<Option<String>> {
        validate_hash(hash)?;
        self.index.job_id(hash)
    }

    /// Link a digest to the job processing it.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHash` for a malformed digest, or a database error.
    pub fn link_job(&self, hash: &str, job_id: &str) -> Result<()> {
        validate_hash(hash)?;
        if !self.index.set_job_id(hash, Some(job_id))? {
            warn!(hash, job_id, "No index row to link job to");
        }
        Ok(())
    }

    /// Remove the job link from a digest.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHash` for a malformed digest, or a database error.
    pub fn clear_job_id(&self, hash: &str) -> Result<()> {
        validate_hash(hash)?;
        self.index.set_job_id(hash, None)?;
        Ok(())
    }

    /// Index counts and on-disk size.
    ///
    /// Never fails: each part that cannot be measured is `None` and logged.
    #[must_use]
    pub fn get_statistics(&self) -> StoreStatistics {
        let counts = self
            .index
            .counts()
            .map_err(|e| warn!(error = %e, "Could not count index rows"))
            .ok();
        let store_size_bytes = dir_size(&self.root)
            .map_err(|e| warn!(root = %self.root.display(), error = %e, "Could not measure store size"))
            .ok();
        StoreStatistics {
            counts,
            store_size_bytes,
        }
    }
}

/// Number of content and result files in a store tree at `root`.
///
/// Used to compare a store copy before and after git operations. Missing
/// directories count as empty.
#[must_use]
pub fn count_items(root: &Path) -> u64 {
    [CONTENT_DIR, RESULTS_DIR]
        .iter()
        .map(|dir| {
            WalkDir::new(root.join(dir))
                .into_iter()
                .filter_map(std::result::Result::ok)
                .filter(|e| {
                    e.file_type().is_file()
                        && e.path().extension().is_some_and(|ext| ext == "json")
                })
                .count() as u64
        })
        .sum()
}
