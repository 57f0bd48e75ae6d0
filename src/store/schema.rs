//! Hash index schema.

use rusqlite::{Connection, Result};

/// The SQL schema for the content index.
///
/// Timestamps are stored as RFC 3339 text so the file stays readable with
/// the stock `sqlite3` shell.
pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS content_index (
    hash TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    content_path TEXT NOT NULL,
    result_path TEXT,
    job_id TEXT,
    created_at TIMESTAMP NOT NULL,
    processed_at TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_content_index_status ON content_index(status);
CREATE INDEX IF NOT EXISTS idx_content_index_job ON content_index(job_id);
";

/// Apply the schema and connection-level pragmas.
///
/// WAL journaling lets the publisher read while scrapers and workers write.
/// The journal mode is persistent, so setting it on every open is cheap.
///
/// # Errors
///
/// Returns an error if a pragma or DDL statement fails.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(mode, "SQLite refused WAL journal mode");
    }
    conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
