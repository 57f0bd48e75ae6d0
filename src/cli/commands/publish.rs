//! Publish command implementations.

use crate::cli::PublishCommands;
use crate::collab::PostgresCli;
use crate::config::LarderConfig;
use crate::error::Result;
use crate::publish::{CycleReport, Publisher, Shutdown};
use crate::repo::{GitCli, RepositoryManager};
use colored::Colorize;
use std::path::PathBuf;

/// Wire the publisher to the real git and PostgreSQL clients.
pub(crate) fn build_publisher(config: LarderConfig) -> Result<Publisher<GitCli>> {
    let store = super::open_store(&config)?;
    let git = config.repo.git_config.iter().fold(
        GitCli::new(
            &config.repo.path,
            config.repo.url.clone(),
            config.repo.token.clone(),
        )
        .with_committer(&config.repo.committer_name, &config.repo.committer_email),
        |git, (key, value)| git.with_config(key, value),
    );
    let repo = RepositoryManager::new(git, config.repo.clone());
    let database = Box::new(PostgresCli::new(config.database.clone()));
    Ok(Publisher::new(config, repo, store, database))
}

/// Execute publish commands.
pub fn execute(command: &PublishCommands, config_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let mut config = super::config(config_path)?;

    match command {
        PublishCommands::Once => {
            let publisher = build_publisher(config)?;
            let report = publisher.process_once()?;
            print_report(&report, json)
        }
        PublishCommands::Run { interval } => {
            if let Some(secs) = interval {
                config.publish.interval_secs = *secs;
            }
            let shutdown = Shutdown::new();
            shutdown.register_signals()?;
            let publisher = build_publisher(config)?;
            publisher.run(&shutdown)?;

            if json {
                println!("{}", serde_json::json!({ "stopped": true }));
            } else {
                println!("Publisher stopped");
            }
            Ok(())
        }
    }
}

fn print_report(report: &CycleReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }

    println!("{} {}", "Published via".bold(), report.branch);
    println!(
        "  Files:       {} copied of {} new{}",
        report.files_copied,
        report.new_files,
        if report.files_rejected > 0 {
            format!(", {} rejected", report.files_rejected).red().to_string()
        } else {
            String::new()
        }
    );
    println!("  Store files: {}", report.store_files_copied);
    match &report.dump {
        Some(dump) => println!(
            "  SQL dump:    {} ({} records)",
            dump.path.display(),
            dump.record_count
        ),
        None => println!("  SQL dump:    {}", "skipped".yellow()),
    }
    let outcome = match (report.committed, report.pushed) {
        (false, _) => "nothing to commit".dimmed(),
        (true, false) => "merged locally".yellow(),
        (true, true) => "pushed".green(),
    };
    println!("  Result:      {outcome}");
    Ok(())
}
