//! Repository metadata.
//!
//! Statistics about the published data are written in two forms: generated
//! sections inside the human-maintained `README.md` and `DATA.md`, and a
//! machine-readable `metadata.json`. Generated sections are delimited by
//! HTML comment markers; everything outside them is left untouched.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use walkdir::WalkDir;

use crate::collab::ConfidenceSummary;
use crate::error::Result;
use crate::store::IndexCounts;
use crate::sync::discover::{DAILY_DIR, DAILY_FORMAT, LATEST_DIR};
use crate::sync::file::{atomic_write, write_json_atomic};

pub const README_FILE: &str = "README.md";
pub const DATA_FILE: &str = "DATA.md";
pub const METADATA_FILE: &str = "metadata.json";

/// Section names used in the two markdown files.
pub const STATISTICS_SECTION: &str = "statistics";
pub const SOURCES_SECTION: &str = "sources";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Everything reported about the repository contents.
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryMetadata {
    pub generated_at: String,
    /// Records in `latest/`, counting a JSON array by its length and any
    /// other file as one.
    pub total_records: u64,
    pub files: u64,
    /// Records per source directory under `latest/`.
    pub sources: BTreeMap<String, u64>,
    pub date_range: Option<DateRange>,
    pub daily_snapshots: usize,
    pub database_records: Option<u64>,
    pub confidence: Option<ConfidenceSummary>,
    pub content_store: Option<IndexCounts>,
}

fn records_in(path: &Path) -> u64 {
    let Ok(bytes) = fs::read(path) else {
        return 0;
    };
    match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(serde_json::Value::Array(items)) => items.len() as u64,
        _ => 1,
    }
}

/// Scan `latest/` and `daily/` in `repo`.
#[must_use]
pub fn collect_metadata(
    repo: &Path,
    now: DateTime<Utc>,
    database_records: Option<u64>,
    confidence: Option<ConfidenceSummary>,
    content_store: Option<IndexCounts>,
) -> RepositoryMetadata {
    let latest = repo.join(LATEST_DIR);
    let mut sources: BTreeMap<String, u64> = BTreeMap::new();
    let mut files = 0;

    for entry in WalkDir::new(&latest)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let Ok(relative) = entry.path().strip_prefix(&latest) else {
            continue;
        };
        // Files directly under latest/ have no source directory.
        let source = if relative.components().count() > 1 {
            relative
                .components()
                .next()
                .map_or_else(String::new, |c| c.as_os_str().to_string_lossy().into_owned())
        } else {
            "(unsorted)".to_string()
        };
        *sources.entry(source).or_default() += records_in(entry.path());
        files += 1;
    }

    let mut days: Vec<NaiveDate> = fs::read_dir(repo.join(DAILY_DIR))
        .map(|entries| {
            entries
                .filter_map(std::result::Result::ok)
                .filter_map(|e| {
                    NaiveDate::parse_from_str(e.file_name().to_str()?, DAILY_FORMAT).ok()
                })
                .collect()
        })
        .unwrap_or_default();
    days.sort();

    RepositoryMetadata {
        generated_at: now.to_rfc3339(),
        total_records: sources.values().sum(),
        files,
        date_range: days.first().zip(days.last()).map(|(start, end)| DateRange {
            start: *start,
            end: *end,
        }),
        daily_snapshots: days.len(),
        sources,
        database_records,
        confidence,
        content_store,
    }
}

fn markers(name: &str) -> (String, String) {
    (
        format!("<!-- BEGIN GENERATED: {name} -->"),
        format!("<!-- END GENERATED: {name} -->"),
    )
}

/// Replace the generated section `name` in `text` with `body`.
///
/// Without an existing section the block is inserted once: after a leading
/// `# ` title line if there is one, otherwise at the top. A BEGIN marker
/// with no END marker is treated as a section running to the end of the
/// text.
#[must_use]
pub fn replace_generated_section(text: &str, name: &str, body: &str) -> String {
    let (begin, end) = markers(name);
    let body = body.trim_end_matches('\n');
    let block = format!("{begin}\n{body}\n{end}\n");

    if let Some(start) = text.find(&begin) {
        return match text[start..].find(&end) {
            Some(offset) => {
                let stop = start + offset;
                format!("{}{begin}\n{body}\n{}", &text[..start], &text[stop..])
            }
            None => format!("{}{block}", &text[..start]),
        };
    }

    if text.starts_with("# ") {
        let (title, rest) = text.split_once('\n').unwrap_or((text, ""));
        let separator = if rest.is_empty() || rest.starts_with('\n') { "" } else { "\n" };
        return format!("{title}\n\n{block}{separator}{rest}");
    }
    if text.is_empty() {
        return block;
    }
    format!("{block}\n{text}")
}

/// Markdown for the `README.md` statistics section.
#[must_use]
pub fn render_statistics(meta: &RepositoryMetadata) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Statistics\n");
    let _ = writeln!(out, "| Metric | Value |");
    let _ = writeln!(out, "|---|---|");
    let _ = writeln!(out, "| Records (latest) | {} |", meta.total_records);
    let _ = writeln!(out, "| Sources | {} |", meta.sources.len());
    let _ = writeln!(out, "| Files | {} |", meta.files);
    if let Some(count) = meta.database_records {
        let _ = writeln!(out, "| Records (database) | {count} |");
    }
    if let Some(range) = &meta.date_range {
        let _ = writeln!(
            out,
            "| Daily snapshots | {} ({} to {}) |",
            meta.daily_snapshots, range.start, range.end
        );
    }
    if let Some(c) = &meta.confidence {
        let _ = writeln!(
            out,
            "| Confidence | avg {:.2}, min {:.2}, max {:.2} over {} records |",
            c.average, c.min, c.max, c.scored_records
        );
    }
    if let Some(store) = &meta.content_store {
        let _ = writeln!(
            out,
            "| Content store | {} hashes, {} processed |",
            store.total, store.completed
        );
    }
    let _ = write!(out, "\n_Last updated {}_", meta.generated_at);
    out
}

/// Markdown for the `DATA.md` per-source section.
#[must_use]
pub fn render_sources(meta: &RepositoryMetadata) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Sources\n");
    if meta.sources.is_empty() {
        let _ = write!(out, "No published sources yet.");
        return out;
    }
    let _ = writeln!(out, "| Source | Records |");
    let _ = writeln!(out, "|---|---|");
    for (source, records) in &meta.sources {
        let _ = writeln!(out, "| {source} | {records} |");
    }
    out
}

fn update_markdown(path: &Path, section: &str, body: &str) -> Result<()> {
    let current = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    let updated = replace_generated_section(&current, section, body);
    if updated != current {
        atomic_write(path, updated.as_bytes())?;
    }
    Ok(())
}

/// Write both generated sections and `metadata.json` into `repo`.
///
/// # Errors
///
/// Returns an error if any file cannot be written.
pub fn write_metadata(repo: &Path, meta: &RepositoryMetadata) -> Result<()> {
    update_markdown(&repo.join(README_FILE), STATISTICS_SECTION, &render_statistics(meta))?;
    update_markdown(&repo.join(DATA_FILE), SOURCES_SECTION, &render_sources(meta))?;
    write_json_atomic(&repo.join(METADATA_FILE), meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-18T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_replace_existing_section_preserves_surroundings() {
        let text = "# Data\n\nIntro.\n\n<!-- BEGIN GENERATED: statistics -->\nold\n<!-- END GENERATED: statistics -->\n\nFooter.\n";
        let updated = replace_generated_section(text, "statistics", "new");
        assert_eq!(
            updated,
            "# Data\n\nIntro.\n\n<!-- BEGIN GENERATED: statistics -->\nnew\n<!-- END GENERATED: statistics -->\n\nFooter.\n"
        );
        assert_eq!(replace_generated_section(&updated, "statistics", "new"), updated);
    }

    #[test]
    fn test_insert_after_title() {
        let updated = replace_generated_section("# Food Resources\n\nBody text.\n", "statistics", "s");
        assert_eq!(
            updated,
            "# Food Resources\n\n<!-- BEGIN GENERATED: statistics -->\ns\n<!-- END GENERATED: statistics -->\n\nBody text.\n"
        );
        // Inserted once: the second pass replaces.
        let again = replace_generated_section(&updated, "statistics", "t");
        assert_eq!(again.matches("BEGIN GENERATED").count(), 1);
        assert!(again.ends_with("\nBody text.\n"));
    }

    #[test]
    fn test_insert_at_top_without_title() {
        let updated = replace_generated_section("Plain notes.\n", "sources", "s");
        assert!(updated.starts_with("<!-- BEGIN GENERATED: sources -->\ns\n"));
        assert!(updated.ends_with("\nPlain notes.\n"));
    }

    #[test]
    fn test_unterminated_section_runs_to_end() {
        let text = "# Data\n\nIntro.\n\n<!-- BEGIN GENERATED: statistics -->\nstale\ntruncated";
        let updated = replace_generated_section(text, "statistics", "fresh");
        assert_eq!(
            updated,
            "# Data\n\nIntro.\n\n<!-- BEGIN GENERATED: statistics -->\nfresh\n<!-- END GENERATED: statistics -->\n"
        );
        assert_eq!(updated.matches("BEGIN GENERATED").count(), 1);
        assert_eq!(replace_generated_section(&updated, "statistics", "fresh"), updated);
    }

    #[test]
    fn test_sections_are_independent() {
        let text = replace_generated_section("", "a", "one");
        let text = replace_generated_section(&text, "b", "two");
        let text = replace_generated_section(&text, "a", "uno");
        assert!(text.contains("uno"));
        assert!(text.contains("two"));
        assert!(!text.contains("one"));
    }

    #[test]
    fn test_collect_and_write_metadata() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path();
        fs::create_dir_all(repo.join("latest/site_a")).unwrap();
        fs::create_dir_all(repo.join("latest/site_b")).unwrap();
        fs::create_dir_all(repo.join("daily/2026-10-01")).unwrap();
        fs::create_dir_all(repo.join("daily/2026-10-17")).unwrap();
        fs::write(repo.join("latest/site_a/orgs.json"), b"[{},{},{}]").unwrap();
        fs::write(repo.join("latest/site_b/one.json"), b"{}").unwrap();
        fs::write(repo.join(README_FILE), "# Food Data\n\nHand-written intro.\n").unwrap();

        let meta = collect_metadata(repo, now(), Some(1200), None, None);
        assert_eq!(meta.total_records, 4);
        assert_eq!(meta.files, 2);
        assert_eq!(meta.sources.get("site_a"), Some(&3));
        assert_eq!(
            meta.date_range,
            Some(DateRange {
                start: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
            })
        );

        write_metadata(repo, &meta).unwrap();
        let readme = fs::read_to_string(repo.join(README_FILE)).unwrap();
        assert!(readme.starts_with("# Food Data\n\n<!-- BEGIN GENERATED: statistics -->"));
        assert!(readme.contains("| Records (database) | 1200 |"));
        assert!(readme.ends_with("Hand-written intro.\n"));
        let data = fs::read_to_string(repo.join(DATA_FILE)).unwrap();
        assert!(data.contains("| site_b | 1 |"));

        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(repo.join(METADATA_FILE)).unwrap()).unwrap();
        assert_eq!(json["total_records"], 4);
    }
}
