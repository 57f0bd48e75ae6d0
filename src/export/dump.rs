//! Compressed SQL dumps of the external database.
//!
//! Layout of the dump directory:
//!
//! ```text
//! sql_dumps/
//!   dump_20261018_120000.sql.gz
//!   dump_20261018_150000.sql.gz
//!   latest.sql.gz -> dump_20261018_150000.sql.gz
//!   ratchet.json
//! ```
//!
//! Dump age comes from the timestamp in the file name, which survives
//! clones and copies where mtimes do not.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use flate2::{write::GzEncoder, Compression};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::ratchet::{check_export_allowed, raised, RecordCountRatchet, RATCHET_FILE};
use crate::collab::Database;
use crate::config::ExportConfig;
use crate::error::Result;
use crate::sync::file::temp_path_for;

pub const DUMP_PREFIX: &str = "dump_";
pub const DUMP_SUFFIX: &str = ".sql.gz";
pub const LATEST_DUMP: &str = "latest.sql.gz";
pub const DUMP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const GZIP_LEVEL: Compression = Compression::best();

/// Result of one successful dump.
#[derive(Debug, Clone, Serialize)]
pub struct DumpReport {
    pub path: PathBuf,
    pub record_count: u64,
    pub ratchet_raised: bool,
    pub rotated: Vec<PathBuf>,
}

/// File name for a dump taken at `at`.
#[must_use]
pub fn dump_file_name(at: DateTime<Utc>) -> String {
    format!("{DUMP_PREFIX}{}{DUMP_SUFFIX}", at.format(DUMP_TIMESTAMP_FORMAT))
}

/// Timestamp embedded in a dump file name.
#[must_use]
pub fn dump_timestamp(file_name: &str) -> Option<NaiveDateTime> {
    let stamp = file_name
        .strip_prefix(DUMP_PREFIX)?
        .strip_suffix(DUMP_SUFFIX)?;
    NaiveDateTime::parse_from_str(stamp, DUMP_TIMESTAMP_FORMAT).ok()
}

/// Dumps in `dir`, newest first.
#[must_use]
pub fn list_dumps(dir: &Path) -> Vec<(PathBuf, NaiveDateTime)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dumps: Vec<_> = entries
        .filter_map(std::result::Result::ok)
        .filter_map(|e| {
            let stamp = dump_timestamp(e.file_name().to_str()?)?;
            Some((e.path(), stamp))
        })
        .collect();
    dumps.sort_by(|a, b| b.1.cmp(&a.1));
    dumps
}

/// Gzip `source` into `dest` atomically.
fn compress(source: &Path, dest: &Path) -> Result<()> {
    let temp = temp_path_for(dest);
    {
        let mut reader = BufReader::new(File::open(source)?);
        let mut encoder = GzEncoder::new(BufWriter::new(File::create(&temp)?), GZIP_LEVEL);
        io::copy(&mut reader, &mut encoder)?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&temp, dest)?;
    Ok(())
}

/// Point `latest.sql.gz` at `file_name` in `dir`.
///
/// A relative symlink on unix so the link stays valid inside clones; a
/// plain copy elsewhere.
///
/// # Errors
///
/// Returns an error if the old link cannot be removed or the new one
/// cannot be created.
pub fn update_latest(dir: &Path, file_name: &str) -> Result<()> {
    let latest = dir.join(LATEST_DUMP);
    if latest.symlink_metadata().is_ok() {
        fs::remove_file(&latest)?;
    }
    #[cfg(unix)]
    std::os::unix::fs::symlink(file_name, &latest)?;
    #[cfg(not(unix))]
    fs::copy(dir.join(file_name), &latest)?;
    Ok(())
}

/// Delete dumps older than `retention_hours`, always keeping the newest.
///
/// # Errors
///
/// Returns an error if a file cannot be removed.
pub fn rotate_dumps(dir: &Path, retention_hours: i64, now: DateTime<Utc>) -> Result<Vec<PathBuf>> {
    let cutoff = now.naive_utc() - Duration::hours(retention_hours);
    let mut removed = Vec::new();
    for (path, stamp) in list_dumps(dir).into_iter().skip(1) {
        if stamp < cutoff {
            fs::remove_file(&path)?;
            debug!(path = %path.display(), "Rotated old dump");
            removed.push(path);
        }
    }
    Ok(removed)
}

/// Dump the database into `dir`, gated by the record count ratchet.
///
/// # Errors
///
/// Returns `Error::UnsafeExport` when the ratchet refuses the dump (no file
/// is written), or the underlying error if counting, dumping or
/// compressing fails.
pub fn export_sql_dump(
    db: &dyn Database,
    dir: &Path,
    policy: &ExportConfig,
    now: DateTime<Utc>,
    actor: &str,
) -> Result<DumpReport> {
    fs::create_dir_all(dir)?;
    let ratchet_path = dir.join(RATCHET_FILE);

    let count = db.record_count()?;
    let ratchet = RecordCountRatchet::load(&ratchet_path)?;
    let prior_dump_exists = !list_dumps(dir).is_empty();
    check_export_allowed(count, ratchet.as_ref(), prior_dump_exists, policy)?;

    let file_name = dump_file_name(now);
    let final_path = dir.join(&file_name);
    let sql_path = dir.join(format!(
        "{DUMP_PREFIX}{}.sql.tmp",
        now.format(DUMP_TIMESTAMP_FORMAT)
    ));

    let dumped = db
        .dump_to(&sql_path)
        .and_then(|()| compress(&sql_path, &final_path));
    if sql_path.exists() {
        if let Err(e) = fs::remove_file(&sql_path) {
            warn!(path = %sql_path.display(), error = %e, "Could not remove uncompressed dump");
        }
    }
    dumped?;

    update_latest(dir, &file_name)?;
    let rotated = rotate_dumps(dir, policy.retention_hours, now)?;

    let next = raised(ratchet.as_ref(), count, actor);
    if let Some(next) = &next {
        next.save(&ratchet_path)?;
    }

    info!(
        path = %final_path.display(),
        records = count,
        rotated = rotated.len(),
        "SQL dump written"
    );
    Ok(DumpReport {
        path: final_path,
        record_count: count,
        ratchet_raised: next.is_some(),
        rotated,
    })
}
