//! Status command implementation.

use crate::config::LarderConfig;
use crate::error::Result;
use crate::export::{list_dumps, RecordCountRatchet, RATCHET_FILE};
use crate::publish::{MaintenanceState, MAINTENANCE_FILE};
use crate::store::StoreStatistics;
use crate::sync::{PublisherState, STATE_FILE};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use tracing::warn;

/// Output for status command.
#[derive(Serialize)]
struct StatusOutput {
    store_root: PathBuf,
    store: StoreStatistics,
    repo_path: PathBuf,
    repo_present: bool,
    processed_files: usize,
    state_updated_at: Option<String>,
    ratchet: Option<RecordCountRatchet>,
    latest_dump: Option<String>,
    dump_count: usize,
    maintenance: MaintenanceState,
    push_enabled: bool,
}

fn gather(config: &LarderConfig) -> Result<StatusOutput> {
    let store = super::open_store(config)?;
    let state = PublisherState::load(&config.output_dir.join(STATE_FILE));
    let dump_dir = config.repo.path.join(&config.export.dump_dir);

    // Reporting only: an unreadable ratchet shows as absent.
    let ratchet = RecordCountRatchet::load(&dump_dir.join(RATCHET_FILE))
        .map_err(|e| warn!(error = %e, "Could not read ratchet"))
        .ok()
        .flatten();
    let dumps = list_dumps(&dump_dir);

    Ok(StatusOutput {
        store_root: config.store.root.clone(),
        store: store.get_statistics(),
        repo_path: config.repo.path.clone(),
        repo_present: config.repo.path.join(".git").exists(),
        processed_files: state.len(),
        state_updated_at: state.last_updated.clone(),
        ratchet,
        latest_dump: dumps
            .first()
            .and_then(|(path, _)| path.file_name())
            .map(|name| name.to_string_lossy().into_owned()),
        dump_count: dumps.len(),
        maintenance: MaintenanceState::load(&config.output_dir.join(MAINTENANCE_FILE)),
        push_enabled: config.publish.push_enabled,
    })
}

/// Execute status command.
pub fn execute(config_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let config = super::config(config_path)?;
    let status = gather(&config)?;

    if json {
        println!("{}", serde_json::to_string(&status)?);
        return Ok(());
    }

    println!("Larder Status");
    println!("=============");
    println!();

    println!("{}", "Content store".bold());
    println!("  Root:      {}", status.store_root.display());
    println!(
        "  Items:     {} ({} completed, {} pending)",
        status.store.total(),
        status.store.completed(),
        status.store.pending()
    );
    println!("  Size:      {}", super::store::format_bytes(status.store.size_bytes()));
    println!();

    println!("{}", "Publisher".bold());
    println!(
        "  Repo:      {} {}",
        status.repo_path.display(),
        if status.repo_present {
            "(cloned)".green()
        } else {
            "(not cloned)".yellow()
        }
    );
    println!("  Processed: {} files", status.processed_files);
    if let Some(at) = &status.state_updated_at {
        println!("  Updated:   {at}");
    }
    println!(
        "  Push:      {}",
        if status.push_enabled {
            "enabled".green()
        } else {
            "disabled".yellow()
        }
    );
    if let Some(at) = status.maintenance.last_weekly {
        println!("  Weekly:    {}", at.to_rfc3339());
    }
    if let Some(at) = status.maintenance.last_monthly {
        println!("  Monthly:   {}", at.to_rfc3339());
    }
    println!();

    println!("{}", "Exports".bold());
    match &status.ratchet {
        Some(r) => println!(
            "  Ratchet:   {} records (by {} at {})",
            r.max_record_count, r.updated_by, r.updated_at
        ),
        None => println!("  Ratchet:   {}", "none".dimmed()),
    }
    match &status.latest_dump {
        Some(name) => println!("  Latest:    {name} ({} kept)", status.dump_count),
        None => println!("  Latest:    {}", "no dumps".dimmed()),
    }

    Ok(())
}
