//! External database boundary.
//!
//! The system of record is a PostgreSQL database owned by the scraper side.
//! The publisher only counts records, dumps the whole database and reads a
//! few aggregates, all through the stock client binaries.

use std::path::Path;
use std::process::{Command, Output};

use serde::Serialize;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};

/// Aggregate confidence scores reported in repository metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceSummary {
    pub scored_records: u64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

/// Operations the publisher needs from the external database.
pub trait Database {
    /// Live count of the ratcheted record type.
    ///
    /// # Errors
    ///
    /// Returns `Error::TransientCollaborator` if the query cannot run.
    fn record_count(&self) -> Result<u64>;

    /// Write an uncompressed logical dump to `path`.
    ///
    /// # Errors
    ///
    /// Returns `Error::TransientCollaborator` if the dump command fails.
    fn dump_to(&self, path: &Path) -> Result<()>;

    /// Optional confidence aggregates; `None` when not configured.
    ///
    /// # Errors
    ///
    /// Returns `Error::TransientCollaborator` if the query cannot run.
    fn confidence_summary(&self) -> Result<Option<ConfidenceSummary>>;
}

/// PostgreSQL access through `psql` and `pg_dump`.
#[derive(Debug, Clone)]
pub struct PostgresCli {
    config: DatabaseConfig,
}

impl PostgresCli {
    #[must_use]
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    /// Build a client command with connection parameters applied.
    ///
    /// The password only ever travels in `PGPASSWORD`, never on argv.
    fn command(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        if let Some(host) = &self.config.host {
            cmd.args(["-h", host]);
        }
        if let Some(port) = self.config.port {
            cmd.args(["-p", &port.to_string()]);
        }
        if let Some(user) = &self.config.user {
            cmd.args(["-U", user]);
        }
        if let Some(password) = &self.config.password {
            cmd.env("PGPASSWORD", password);
        }
        cmd
    }

    fn run(mut cmd: Command, what: &str) -> Result<Output> {
        let output = cmd
            .output()
            .map_err(|e| Error::TransientCollaborator(format!("{what}: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::TransientCollaborator(format!(
                "{what} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(output)
    }

    fn query(&self, sql: &str) -> Result<String> {
        let mut cmd = self.command("psql");
        cmd.args(["-X", "-t", "-A", "-v", "ON_ERROR_STOP=1"]);
        if let Some(dbname) = &self.config.dbname {
            cmd.args(["-d", dbname]);
        }
        cmd.args(["-c", sql]);
        let output = Self::run(cmd, "psql")?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Database for PostgresCli {
    fn record_count(&self) -> Result<u64> {
        let raw = self.query(&self.config.count_query)?;
        raw.lines()
            .next()
            .unwrap_or_default()
            .trim()
            .parse()
            .map_err(|_| Error::TransientCollaborator(format!("unexpected count output: {raw:?}")))
    }

    fn dump_to(&self, path: &Path) -> Result<()> {
        let mut cmd = self.command("pg_dump");
        cmd.args(["--no-owner", "--no-privileges", "-f"]);
        cmd.arg(path);
        if let Some(dbname) = &self.config.dbname {
            cmd.arg(dbname);
        }
        Self::run(cmd, "pg_dump")?;
        Ok(())
    }

    fn confidence_summary(&self) -> Result<Option<ConfidenceSummary>> {
        let Some(sql) = &self.config.confidence_query else {
            return Ok(None);
        };
        let raw = self.query(sql)?;
        Ok(parse_confidence_row(&raw))
    }
}

/// Parse a `count|avg|min|max` row as printed by `psql -tA`.
///
/// Empty aggregates (no scored rows) come back as blank fields.
#[must_use]
pub fn parse_confidence_row(raw: &str) -> Option<ConfidenceSummary> {
    let line = raw.lines().next()?;
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    if fields.len() != 4 {
        return None;
    }
    let scored_records = fields[0].parse().ok()?;
    if scored_records == 0 {
        return None;
    }
    Some(ConfidenceSummary {
        scored_records,
        average: fields[1].parse().ok()?,
        min: fields[2].parse().ok()?,
        max: fields[3].parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_confidence_row() {
        let summary = parse_confidence_row("120|0.82|0.1|1\n").unwrap();
        assert_eq!(summary.scored_records, 120);
        assert!((summary.average - 0.82).abs() < f64::EPSILON);
        assert!((summary.max - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_confidence_row_without_scores() {
        assert!(parse_confidence_row("0|||").is_none());
        assert!(parse_confidence_row("").is_none());
        assert!(parse_confidence_row("garbage").is_none());
    }

    #[test]
    fn test_password_not_on_argv() {
        let db = PostgresCli::new(DatabaseConfig {
            password: Some("s3cret".into()),
            host: Some("db".into()),
            ..DatabaseConfig::default()
        });
        let cmd = db.command("psql");
        assert!(cmd.get_args().all(|a| a != "s3cret"));
        assert!(cmd
            .get_envs()
            .any(|(k, v)| k == "PGPASSWORD" && v.is_some_and(|v| v == "s3cret")));
    }
}
