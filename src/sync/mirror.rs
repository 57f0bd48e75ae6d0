//! Mirroring the content store into the repository.
//!
//! Content and result files are write-once, so an mtime comparison is
//! enough to find what changed. The live index is never copied as a file:
//! it is snapshotted through the SQLite online-backup API so a concurrently
//! written WAL database is captured consistently.

use std::fs;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, DatabaseName};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::file::temp_path_for;
use crate::error::Result;
use crate::store::INDEX_FILE;

/// Counts from one mirror pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub copied: usize,
    pub unchanged: usize,
    pub index_snapshot: bool,
}

/// Whether a store file is handled by the snapshot or is transient.
fn is_skipped(name: &str) -> bool {
    name.starts_with(INDEX_FILE) || name.ends_with(".tmp")
}

fn needs_copy(source: &Path, target: &Path) -> Result<bool> {
    let Ok(target_meta) = fs::metadata(target) else {
        return Ok(true);
    };
    let source_mtime = fs::metadata(source)?.modified()?;
    Ok(target_meta.modified()? < source_mtime)
}

/// Copy new or updated store files from `store_root` into `dest`, then
/// snapshot the index.
///
/// # Errors
///
/// Returns an error if a copy or the snapshot fails.
pub fn mirror_store(store_root: &Path, dest: &Path) -> Result<MirrorReport> {
    let mut report = MirrorReport::default();
    fs::create_dir_all(dest)?;

    for entry in WalkDir::new(store_root) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() || is_skipped(&entry.file_name().to_string_lossy()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(store_root) else {
            continue;
        };
        let target = dest.join(relative);
        if needs_copy(entry.path(), &target)? {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            report.copied += 1;
        } else {
            report.unchanged += 1;
        }
    }

    let index = store_root.join(INDEX_FILE);
    if index.exists() {
        snapshot_index(&index, &dest.join(INDEX_FILE))?;
        report.index_snapshot = true;
    }

    info!(
        copied = report.copied,
        unchanged = report.unchanged,
        "Mirrored content store"
    );
    Ok(report)
}

/// Write a consistent copy of the SQLite database at `source` to `target`.
///
/// The snapshot is switched to rollback journaling so the repository never
/// carries `-wal`/`-shm` side files.
///
/// # Errors
///
/// Returns `Error::Database` if the backup fails.
pub fn snapshot_index(source: &Path, target: &Path) -> Result<()> {
    let temp = temp_path_for(target);
    if temp.exists() {
        fs::remove_file(&temp)?;
    }

    {
        let conn = Connection::open(source)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.backup(DatabaseName::Main, &temp, None)?;
    }
    {
        let snapshot = Connection::open(&temp)?;
        let _: String = snapshot.query_row("PRAGMA journal_mode = DELETE", [], |row| row.get(0))?;
    }

    fs::rename(&temp, target)?;
    debug!(target = %target.display(), "Snapshotted index");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ContentStore;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_mirror_copies_files_and_snapshots_index() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::open_standalone(&dir.path().join("store")).unwrap();
        let hash = store.store_content("pantry", json!({})).unwrap().hash;
        store.store_result(&hash, "r", "job").unwrap();

        let dest = dir.path().join("repo/content_store");
        let report = mirror_store(store.root(), &dest).unwrap();
        assert_eq!(report.copied, 2);
        assert!(report.index_snapshot);
        assert!(!dest.join(format!("{INDEX_FILE}-wal")).exists());

        let conn = Connection::open(dest.join(INDEX_FILE)).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM content_index", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0)).unwrap();
        assert_eq!(mode, "delete");
    }

    #[test]
    fn test_second_pass_skips_unchanged() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::open_standalone(&dir.path().join("store")).unwrap();
        store.store_content("a", json!({})).unwrap();

        let dest = dir.path().join("mirror");
        mirror_store(store.root(), &dest).unwrap();
        store.store_content("b", json!({})).unwrap();

        let report = mirror_store(store.root(), &dest).unwrap();
        assert_eq!(report.copied, 1);
        assert_eq!(report.unchanged, 1);
    }
}
