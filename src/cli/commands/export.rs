//! Export command implementations.

use crate::cli::ExportCommands;
use crate::collab::PostgresCli;
use crate::error::Result;
use crate::export::export_sql_dump;
use chrono::Utc;
use std::path::PathBuf;

/// Recorded as `updated_by` when a manual dump raises the ratchet.
const MANUAL_ACTOR: &str = "larder export";

/// Execute export commands.
pub fn execute(command: &ExportCommands, config_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let mut config = super::config(config_path)?;

    match command {
        ExportCommands::Dump { force, dir } => {
            if *force {
                config.export.allow_override = true;
            }
            let dir = dir
                .clone()
                .unwrap_or_else(|| config.repo.path.join(&config.export.dump_dir));
            let database = PostgresCli::new(config.database.clone());

            let report = export_sql_dump(&database, &dir, &config.export, Utc::now(), MANUAL_ACTOR)?;

            if json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                println!(
                    "Wrote {} ({} records)",
                    report.path.display(),
                    report.record_count
                );
                if report.ratchet_raised {
                    println!("Ratchet raised to {}", report.record_count);
                }
                for removed in &report.rotated {
                    println!("Rotated {}", removed.display());
                }
            }
            Ok(())
        }
    }
}
