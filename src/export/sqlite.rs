//! SQLite export.
//!
//! The SQLite rendition of the database is produced by an external tool;
//! this module only runs it inside the repository.

use std::path::Path;
use std::process::Command;

use tracing::info;

use crate::error::{Error, Result};

/// Run the configured export command with `repo` as working directory.
///
/// # Errors
///
/// Returns `Error::Config` for an empty command and
/// `Error::TransientCollaborator` when the command cannot start or exits
/// non-zero.
pub fn run_sqlite_export(command: &[String], repo: &Path) -> Result<()> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| Error::Config("export.sqlite_command is empty".into()))?;

    let output = Command::new(program)
        .args(args)
        .current_dir(repo)
        .output()
        .map_err(|e| Error::TransientCollaborator(format!("{program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::TransientCollaborator(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    info!(program, "SQLite export finished");
    Ok(())
}
