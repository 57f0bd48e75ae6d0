//! Publish orchestrator.
//!
//! One publish cycle moves everything new into the data repository and
//! lands it on main as a single merge:
//!
//! 1. periodic maintenance when due
//! 2. repository ready on an up-to-date main
//! 3. discover new output files
//! 4. per-run branch `data-update-<date>`
//! 5. copy new files, mirror the content store
//! 6. regenerate metadata and exports
//! 7. commit, merge to main with `--no-ff`, delete the branch, push
//! 8. persist publisher state
//!
//! A failure after the branch exists returns the repository to main,
//! deletes the partial branch and forgets the files it copied, so the next
//! cycle starts clean and copies them again.
//!
//! [`Publisher::run`] repeats cycles until a shutdown signal arrives.

pub mod branch;
pub mod maintenance;
pub mod shutdown;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::collab::Database;
use crate::config::LarderConfig;
use crate::error::{Error, Result};
use crate::export::{
    collect_metadata, export_sql_dump, run_sqlite_export, write_metadata, DumpReport,
};
use crate::repo::{Git, RepositoryManager};
use crate::store::ContentStore;
use crate::sync::{discover_new_files, mirror_store, sync_files, PublisherState, STATE_FILE};

pub use branch::{branch_name, prepare_branch, validate_branch_name};
pub use maintenance::{MaintenanceState, MAINTENANCE_FILE};
pub use shutdown::Shutdown;

/// Recorded as `updated_by` when the publisher raises the ratchet.
const PUBLISHER_ACTOR: &str = "larder publisher";

/// What one cycle did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub branch: String,
    pub new_files: usize,
    pub files_copied: usize,
    pub files_rejected: usize,
    pub store_files_copied: usize,
    pub dump: Option<DumpReport>,
    pub committed: bool,
    pub pushed: bool,
}

/// Drives publish cycles against one repository.
pub struct Publisher<G: Git> {
    config: LarderConfig,
    repo: RepositoryManager<G>,
    store: ContentStore,
    database: Box<dyn Database>,
}

impl<G: Git> Publisher<G> {
    pub fn new(
        config: LarderConfig,
        repo: RepositoryManager<G>,
        store: ContentStore,
        database: Box<dyn Database>,
    ) -> Self {
        Self {
            config,
            repo,
            store,
            database,
        }
    }

    pub fn repository(&self) -> &RepositoryManager<G> {
        &self.repo
    }

    fn git(&self) -> &G {
        self.repo.git()
    }

    fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    fn state_path(&self) -> PathBuf {
        self.output_dir().join(STATE_FILE)
    }

    fn maintenance_path(&self) -> PathBuf {
        self.output_dir().join(MAINTENANCE_FILE)
    }

    /// Weekly branch pruning and deep cleanup, monthly fresh-clone check.
    ///
    /// # Errors
    ///
    /// Returns an error if a due fresh clone fails.
    pub fn run_maintenance(&self, now: DateTime<Utc>) -> Result<()> {
        if !self.git().is_repo() {
            return Ok(());
        }
        let path = self.maintenance_path();
        let mut state = MaintenanceState::load(&path);

        if state.weekly_due(now) {
            info!("Running weekly maintenance");
            self.repo
                .prune_branches(&self.config.publish.branch_prefix, self.config.publish.push_enabled);
            self.repo.cleanup_if_oversized();
            state.last_weekly = Some(now);
            state.save(&path)?;
        }

        if state.monthly_due(now) {
            info!("Running monthly maintenance");
            self.repo.fresh_clone_if_oversized()?;
            state.last_monthly = Some(now);
            state.save(&path)?;
        }
        Ok(())
    }

    /// Run one publish cycle.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error: repository operations, integrity
    /// violations, an unsafe export, or a failed copy or state write.
    pub fn process_once(&self) -> Result<CycleReport> {
        let now = Utc::now();
        self.run_maintenance(now)?;
        self.repo.ensure_ready()?;

        let mut state = PublisherState::load(&self.state_path());
        let new_files = discover_new_files(
            self.output_dir(),
            now.date_naive(),
            self.config.publish.sync_window_days,
            &state,
        );
        if new_files.is_empty() {
            info!("No new output files, publishing database exports only");
        } else {
            info!(count = new_files.len(), "Found new output files");
        }

        let name = branch_name(&self.config.publish.branch_prefix, now.date_naive());
        let branch = prepare_branch(self.git(), &name, self.config.publish.push_enabled)?;
        info!(branch, "Publishing on branch");

        match self.publish_on_branch(&branch, &new_files, &mut state, now) {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(branch, error = %e, "Publish cycle failed, abandoning branch");
                self.abandon_branch(&branch);
                self.roll_back_copies(&new_files, &mut state);
                Err(e)
            }
        }
    }

    /// Un-record and delete the files a failed cycle copied, so the next
    /// cycle discovers and copies them again.
    ///
    /// Every discovered file was unrecorded when the cycle started, so the
    /// recorded ones are exactly this cycle's copies. Best effort.
    fn roll_back_copies(&self, new_files: &[String], state: &mut PublisherState) {
        let copied: Vec<&String> = new_files
            .iter()
            .filter(|relative| state.is_processed(relative))
            .collect();
        if copied.is_empty() {
            return;
        }

        for relative in &copied {
            state.forget(relative);
            let target = self.repo.path().join(relative.as_str());
            match fs::remove_file(&target) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %target.display(), error = %e, "Could not remove abandoned copy"),
            }
        }

        match state.save(&self.state_path()) {
            Ok(()) => info!(count = copied.len(), "Rolled back copies from failed cycle"),
            Err(e) => error!(error = %e, "Could not persist rolled-back publisher state"),
        }
    }

    fn publish_on_branch(
        &self,
        branch: &str,
        new_files: &[String],
        state: &mut PublisherState,
        now: DateTime<Utc>,
    ) -> Result<CycleReport> {
        let repo_path = self.repo.path().to_path_buf();
        let main = self.repo.main_branch();
        let mut report = CycleReport {
            branch: branch.to_string(),
            new_files: new_files.len(),
            ..CycleReport::default()
        };

        let copied = sync_files(
            self.output_dir(),
            &repo_path,
            new_files,
            state,
            &self.state_path(),
        )?;
        report.files_copied = copied.copied;
        report.files_rejected = copied.rejected;

        report.store_files_copied = mirror_store(self.store.root(), &self.repo.store_dir())?.copied;

        if let Err(e) = self.write_repository_metadata(now) {
            warn!(error = %e, "Could not regenerate repository metadata");
        }
        report.dump = self.run_exports(now)?;

        self.git().add(&["-A"])?;
        if self.git().has_staged_changes()? {
            let message = format!("Data update {}", now.format("%Y-%m-%d %H:%M:%S UTC"));
            self.git().commit(&message)?;
            report.committed = true;
        }

        self.git().checkout(main)?;
        if report.committed {
            self.git()
                .merge_no_ff(branch, &format!("Merge branch '{branch}'"))?;
        }
        self.git().delete_branch(branch)?;

        if !report.committed {
            info!("Nothing to commit");
        } else if self.config.publish.push_enabled {
            self.git().push(main)?;
            report.pushed = true;
            if let Err(e) = self.git().gc(false) {
                warn!(error = %e, "Post-push gc failed");
            }
        } else {
            info!("Push disabled, changes merged locally only");
        }

        state.save(&self.state_path())?;
        info!(
            files = report.files_copied,
            store_files = report.store_files_copied,
            committed = report.committed,
            pushed = report.pushed,
            "Publish cycle complete"
        );
        Ok(report)
    }

    /// Return to main and delete `branch`. Best effort.
    fn abandon_branch(&self, branch: &str) {
        if let Err(e) = self.git().checkout(self.repo.main_branch()) {
            warn!(error = %e, "Could not return to main");
            return;
        }
        match self.git().branch_exists_local(branch) {
            Ok(true) => {
                if let Err(e) = self.git().delete_branch(branch) {
                    warn!(branch, error = %e, "Could not delete abandoned branch");
                }
            }
            Ok(false) => {}
            Err(e) => warn!(branch, error = %e, "Could not check abandoned branch"),
        }
    }

    /// SQL dump and optional SQLite export.
    ///
    /// # Errors
    ///
    /// Only `Error::UnsafeExport` is returned; every other export failure is
    /// logged and the cycle continues without that export.
    pub fn run_exports(&self, now: DateTime<Utc>) -> Result<Option<DumpReport>> {
        let dump_dir = self.repo.path().join(&self.config.export.dump_dir);
        let dump = match export_sql_dump(
            self.database.as_ref(),
            &dump_dir,
            &self.config.export,
            now,
            PUBLISHER_ACTOR,
        ) {
            Ok(report) => Some(report),
            Err(e @ Error::UnsafeExport(_)) => {
                error!(error = %e, "Refusing to publish SQL dump");
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "SQL dump failed");
                None
            }
        };

        if let Some(command) = &self.config.export.sqlite_command {
            if let Err(e) = run_sqlite_export(command, self.repo.path()) {
                warn!(error = %e, "SQLite export failed");
            }
        }
        Ok(dump)
    }

    /// Regenerate README/DATA sections and `metadata.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be written.
    pub fn write_repository_metadata(&self, now: DateTime<Utc>) -> Result<()> {
        let database_records = self
            .database
            .record_count()
            .map_err(|e| warn!(error = %e, "Could not count database records"))
            .ok();
        let confidence = self
            .database
            .confidence_summary()
            .map_err(|e| warn!(error = %e, "Could not read confidence scores"))
            .ok()
            .flatten();
        let meta = collect_metadata(
            self.repo.path(),
            now,
            database_records,
            confidence,
            self.store.get_statistics().counts,
        );
        write_metadata(self.repo.path(), &meta)
    }

    /// One last export on shutdown. Best effort.
    pub fn final_export(&self) {
        if !self.git().is_repo() {
            return;
        }
        match self.run_exports(Utc::now()) {
            Ok(Some(report)) => info!(path = %report.path.display(), "Final export written"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Final export skipped"),
        }
    }

    /// Run cycles until `shutdown` is requested.
    ///
    /// The first cycle runs immediately and its error is returned. Later
    /// failures are logged and retried after the shorter error delay.
    ///
    /// # Errors
    ///
    /// Returns the startup cycle's error.
    pub fn run(&self, shutdown: &Shutdown) -> Result<()> {
        let interval = Duration::from_secs(self.config.publish.interval_secs);
        let retry = Duration::from_secs(self.config.publish.error_retry_secs);

        self.process_once()?;
        info!(interval_secs = interval.as_secs(), "Publisher started");

        let mut delay = interval;
        while !shutdown.wait(delay) {
            delay = match self.process_once() {
                Ok(_) => interval,
                Err(e) => {
                    error!(error = %e, retry_secs = retry.as_secs(), "Publish cycle failed");
                    retry
                }
            };
        }

        info!("Shutdown requested, running final export");
        self.final_export();
        Ok(())
    }
}
