//! Discovery of new scraper output files.
//!
//! Scrapers write into two trees under the output directory:
//! `daily/<YYYY-MM-DD>/...` for dated snapshots and `latest/...` for the
//! current view of each source. Only daily directories inside the sync
//! window are scanned.

use std::path::{Component, Path};

use chrono::{Duration, NaiveDate};
use walkdir::WalkDir;

use super::state::PublisherState;

pub const DAILY_DIR: &str = "daily";
pub const LATEST_DIR: &str = "latest";

/// Date format of daily directory names.
pub const DAILY_FORMAT: &str = "%Y-%m-%d";

/// Output-relative path with `/` separators.
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

fn is_candidate(entry: &walkdir::DirEntry) -> bool {
    if entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    !name.starts_with('.') && !name.ends_with(".tmp")
}

fn collect(output_dir: &Path, tree: &Path, found: &mut Vec<String>) {
    for entry in WalkDir::new(tree)
        .follow_links(false)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(is_candidate)
    {
        if let Some(key) = relative_key(output_dir, entry.path()) {
            found.push(key);
        }
    }
}

/// Daily directory names within `window_days` of `today`, inclusive.
#[must_use]
pub fn daily_dirs_in_window(output_dir: &Path, today: NaiveDate, window_days: i64) -> Vec<String> {
    let earliest = today - Duration::days(window_days.max(1) - 1);
    let Ok(entries) = std::fs::read_dir(output_dir.join(DAILY_DIR)) else {
        return Vec::new();
    };

    let mut dirs: Vec<String> = entries
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|e| e.file_name().to_str().map(String::from))
        .filter(|name| {
            NaiveDate::parse_from_str(name, DAILY_FORMAT)
                .is_ok_and(|date| date >= earliest && date <= today)
        })
        .collect();
    dirs.sort();
    dirs
}

/// Output files not yet recorded in `state`, sorted.
///
/// Symlinks are returned too; containment is checked at copy time.
#[must_use]
pub fn discover_new_files(
    output_dir: &Path,
    today: NaiveDate,
    window_days: i64,
    state: &PublisherState,
) -> Vec<String> {
    let mut found = Vec::new();

    for day in daily_dirs_in_window(output_dir, today, window_days) {
        collect(output_dir, &output_dir.join(DAILY_DIR).join(day), &mut found);
    }
    collect(output_dir, &output_dir.join(LATEST_DIR), &mut found);

    found.retain(|key| !state.is_processed(key));
    found.sort();
    found.dedup();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"[]").unwrap();
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    #[test]
    fn test_window_filters_old_days() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "daily/2026-10-18/a.json");
        touch(dir.path(), "daily/2026-10-12/b.json");
        touch(dir.path(), "daily/2026-10-11/c.json");
        touch(dir.path(), "daily/not-a-date/d.json");

        let files = discover_new_files(dir.path(), today(), 7, &PublisherState::default());
        assert_eq!(
            files,
            vec!["daily/2026-10-12/b.json", "daily/2026-10-18/a.json"]
        );
    }

    #[test]
    fn test_latest_and_processed_exclusion() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "latest/site_a/orgs.json");
        touch(dir.path(), "latest/site_b/orgs.json");
        touch(dir.path(), "latest/site_b/.partial");
        touch(dir.path(), "latest/site_b/orgs.json.tmp");

        let mut state = PublisherState::default();
        state.mark_processed("latest/site_a/orgs.json");

        let files = discover_new_files(dir.path(), today(), 7, &state);
        assert_eq!(files, vec!["latest/site_b/orgs.json"]);
    }

    #[test]
    fn test_missing_trees() {
        let dir = TempDir::new().unwrap();
        assert!(discover_new_files(dir.path(), today(), 7, &PublisherState::default()).is_empty());
    }
}
