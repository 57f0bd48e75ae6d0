//! Content store command implementations.

use crate::cli::StoreCommands;
use crate::error::{Error, Result};
use crate::store::{ContentRecord, ContentStatus, ContentStore};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Output for store get.
#[derive(Serialize)]
struct GetOutput {
    hash: String,
    found: bool,
    result: Option<String>,
    record: Option<ContentRecord>,
}

/// Execute store commands.
pub fn execute(command: &StoreCommands, config_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let config = super::config(config_path)?;
    let store = super::open_store(&config)?;

    match command {
        StoreCommands::Put { file, metadata } => put(&store, file, metadata.as_deref(), json),
        StoreCommands::Result { hash, job_id, file } => result(&store, hash, job_id, file, json),
        StoreCommands::Get { hash } => get(&store, hash, json),
        StoreCommands::Link { hash, job_id } => link(&store, hash, job_id, json),
        StoreCommands::Unlink { hash } => unlink(&store, hash, json),
        StoreCommands::Stats => stats(&store, json),
    }
}

fn parse_metadata(raw: Option<&str>) -> Result<serde_json::Value> {
    let Some(raw) = raw else {
        return Ok(serde_json::json!({}));
    };
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| Error::InvalidArgument(format!("--metadata is not valid JSON: {e}")))?;
    if !value.is_object() {
        return Err(Error::InvalidArgument(
            "--metadata must be a JSON object".to_string(),
        ));
    }
    Ok(value)
}

fn put(store: &ContentStore, file: &Path, metadata: Option<&str>, json: bool) -> Result<()> {
    let metadata = parse_metadata(metadata)?;
    let content = super::read_input(file)?;
    let outcome = store.store_content(&content, metadata)?;

    if json {
        println!("{}", serde_json::to_string(&outcome)?);
        return Ok(());
    }

    match outcome.status {
        ContentStatus::Completed => {
            println!("{} {}", "cached".green(), outcome.hash);
            if let Some(result) = &outcome.result {
                println!("{result}");
            }
        }
        ContentStatus::Pending => println!("{} {}", "pending".yellow(), outcome.hash),
    }
    Ok(())
}

fn result(store: &ContentStore, hash: &str, job_id: &str, file: &Path, json: bool) -> Result<()> {
    let body = super::read_input(file)?;
    store.store_result(hash, &body, job_id)?;

    if json {
        let output = serde_json::json!({
            "hash": hash,
            "job_id": job_id,
            "status": ContentStatus::Completed,
        });
        println!("{output}");
    } else {
        println!("Stored result for {hash} (job {job_id})");
    }
    Ok(())
}

fn get(store: &ContentStore, hash: &str, json: bool) -> Result<()> {
    let result = store.get_result(hash)?;
    let record = store.get_record(hash)?;

    if json {
        let output = GetOutput {
            hash: hash.to_string(),
            found: result.is_some() || record.is_some(),
            result,
            record,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    match (&record, &result) {
        (None, None) => println!("No entry for {hash}"),
        _ => {
            let status = record
                .as_ref()
                .map_or(ContentStatus::Completed, |r| r.status);
            println!("{} [{}]", hash.bold(), status.as_str());
            if let Some(job_id) = record.as_ref().and_then(|r| r.job_id.as_deref()) {
                println!("  {} {job_id}", "job:".dimmed());
            }
            if let Some(r) = &record {
                println!("  {} {}", "created:".dimmed(), r.created_at);
                if let Some(at) = &r.processed_at {
                    println!("  {} {at}", "processed:".dimmed());
                }
            }
            if let Some(result) = &result {
                println!();
                println!("{result}");
            }
        }
    }
    Ok(())
}

fn link(store: &ContentStore, hash: &str, job_id: &str, json: bool) -> Result<()> {
    store.link_job(hash, job_id)?;

    if json {
        let output = serde_json::json!({ "hash": hash, "job_id": job_id });
        println!("{output}");
    } else {
        println!("Linked {hash} to job {job_id}");
    }
    Ok(())
}

fn unlink(store: &ContentStore, hash: &str, json: bool) -> Result<()> {
    store.clear_job_id(hash)?;

    if json {
        let output = serde_json::json!({ "hash": hash, "job_id": null });
        println!("{output}");
    } else {
        println!("Cleared job link for {hash}");
    }
    Ok(())
}

fn stats(store: &ContentStore, json: bool) -> Result<()> {
    let stats = store.get_statistics();

    if json {
        println!("{}", serde_json::to_string(&stats)?);
        return Ok(());
    }

    println!("{}", "Content Store".bold());
    println!("  Root:      {}", store.root().display());
    match stats.counts {
        Some(counts) => {
            println!("  Total:     {}", counts.total);
            println!("  Completed: {}", counts.completed.to_string().green());
            println!("  Pending:   {}", counts.pending.to_string().yellow());
        }
        None => println!("  Counts:    {}", "unavailable".red()),
    }
    match stats.store_size_bytes {
        Some(bytes) => println!("  Size:      {}", format_bytes(bytes)),
        None => println!("  Size:      {}", "unavailable".red()),
    }
    Ok(())
}

/// Human-readable byte count.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metadata() {
        assert_eq!(parse_metadata(None).unwrap(), serde_json::json!({}));
        assert_eq!(
            parse_metadata(Some(r#"{"source":"site_a"}"#)).unwrap()["source"],
            "site_a"
        );
        assert!(matches!(
            parse_metadata(Some("[1,2]")),
            Err(Error::InvalidArgument(_))
        ));
        assert!(parse_metadata(Some("{not json")).is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(75 * 1024 * 1024 * 1024), "75.0 GiB");
    }
}
