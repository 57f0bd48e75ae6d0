//! Repository manager.
//!
//! Owns the local shallow clone of the data repository and keeps it usable
//! across publish cycles:
//!
//! - clone on first use (or when the path is not a repository)
//! - return to main, protect the content store, stash stray changes
//! - shallow fetch and pull
//! - bound `.git` growth with deep cleanup or a fresh clone
//! - prune old per-run branches
//!
//! The content store mirror inside the repository is the one thing that
//! must survive every git operation. Item counts are compared around each
//! update and a drop beyond the configured threshold is fatal.

pub mod git;

#[cfg(test)]
pub(crate) mod fake;
#[cfg(test)]
pub(crate) mod fixture;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::RepoConfig;
use crate::error::{Error, Result};
use crate::store::count_items;
use crate::sync::file::{copy_tree, dir_size, dir_size_excluding, move_tree};

pub use git::{authenticated_url, redact, Git, GitCli};

/// Commit message for the store-protection commit.
pub const PROTECT_MESSAGE: &str = "Protect content store before update";

/// Measured repository size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepoSize {
    /// Bytes under `.git`.
    pub git_bytes: u64,
    /// Bytes of the working tree, excluding `.git`.
    pub data_bytes: u64,
}

/// Fail when `after` dropped below `threshold_percent` of `before`.
///
/// An empty starting point always passes.
///
/// # Errors
///
/// Returns `Error::IntegrityViolation` on a drop past the threshold.
pub fn verify_integrity(before: u64, after: u64, threshold_percent: u64) -> Result<()> {
    if before == 0 {
        return Ok(());
    }
    if u128::from(after) * 100 < u128::from(before) * u128::from(threshold_percent) {
        error!(before, after, "Content store items lost during git operation");
        return Err(Error::IntegrityViolation { before, after });
    }
    Ok(())
}

/// Manages one local clone through a [`Git`] implementation.
#[derive(Debug)]
pub struct RepositoryManager<G: Git> {
    git: G,
    config: RepoConfig,
}

impl<G: Git> RepositoryManager<G> {
    pub fn new(git: G, config: RepoConfig) -> Self {
        Self { git, config }
    }

    pub fn git(&self) -> &G {
        &self.git
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        self.git.repo_path()
    }

    pub fn main_branch(&self) -> &str {
        &self.config.main_branch
    }

    /// Content store mirror inside the working tree.
    pub fn store_dir(&self) -> PathBuf {
        self.path().join(&self.config.store_subdir)
    }

    /// Store backup location used while the working tree is replaced. A
    /// sibling of the repository, so removing the tree cannot touch it.
    pub fn backup_dir(&self) -> PathBuf {
        let name = self
            .path()
            .file_name()
            .map_or_else(|| "repo".to_string(), |n| n.to_string_lossy().into_owned());
        self.path()
            .with_file_name(format!("{name}.store-backup"))
    }

    /// Bring the repository to an up-to-date main branch.
    ///
    /// # Errors
    ///
    /// Returns `Error::RepositoryOperation` when clone, checkout, fetch or
    /// pull fail, and `Error::IntegrityViolation` when store items were
    /// lost along the way.
    pub fn ensure_ready(&self) -> Result<()> {
        if !self.git.is_repo() {
            info!(path = %self.path().display(), "No repository found, cloning");
            return self.reclone();
        }

        let before = count_items(&self.store_dir());
        let main = self.main_branch();

        self.git.checkout(main)?;
        self.protect_then_stash();
        self.git.fetch_shallow(main)?;
        self.cleanup_if_oversized();

        let behind = self.git.commits_behind(main).unwrap_or_else(|e| {
            warn!(error = %e, "Could not count commits behind, assuming none");
            0
        });
        if behind > 0 {
            info!(behind, "Pulling upstream changes");
            self.git.pull_shallow(main)?;
        }

        let after = count_items(&self.store_dir());
        verify_integrity(before, after, self.config.integrity_threshold_percent)?;
        debug!(before, after, "Repository ready");
        Ok(())
    }

    /// Commit the store subtree, then stash everything else.
    ///
    /// Committing first means a later stash, checkout or pull can never
    /// take store files with it. Both steps are best effort.
    pub fn protect_then_stash(&self) {
        let subdir = self.config.store_subdir.as_str();

        match self.git.has_changes(Some(subdir)) {
            Ok(true) => {
                let protected = self
                    .git
                    .add(&[subdir])
                    .and_then(|()| self.git.has_staged_changes())
                    .and_then(|staged| {
                        if staged {
                            self.git.commit(PROTECT_MESSAGE).map(|()| true)
                        } else {
                            Ok(false)
                        }
                    });
                match protected {
                    Ok(true) => info!("Committed content store before update"),
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "Could not commit content store"),
                }
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Could not check content store for changes"),
        }

        match self.git.has_changes(None) {
            Ok(true) => match self.git.stash_excluding(&[subdir]) {
                Ok(()) => info!("Stashed local changes"),
                Err(e) => warn!(error = %e, "Stash failed, continuing"),
            },
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Could not check working tree for changes"),
        }
    }

    /// Current `.git` and data sizes. Unreadable parts count as zero.
    pub fn measure_size(&self) -> RepoSize {
        let git_bytes = dir_size(&self.path().join(".git")).unwrap_or_else(|e| {
            warn!(error = %e, "Could not measure .git size");
            0
        });
        RepoSize {
            git_bytes,
            data_bytes: dir_size_excluding(self.path(), ".git"),
        }
    }

    /// Expire reflogs, aggressive gc and full repack. Best effort.
    pub fn deep_cleanup(&self) {
        info!("Running deep git cleanup");
        if let Err(e) = self.git.expire_reflog() {
            warn!(error = %e, "Reflog expire failed");
        }
        if let Err(e) = self.git.gc(true) {
            warn!(error = %e, "Aggressive gc failed");
        }
        if let Err(e) = self.git.repack_aggressive() {
            warn!(error = %e, "Repack failed");
        }
    }

    /// Run [`Self::deep_cleanup`] when `.git` exceeds the threshold.
    pub fn cleanup_if_oversized(&self) -> bool {
        let size = self.measure_size();
        debug!(git_bytes = size.git_bytes, data_bytes = size.data_bytes, "Repository size");
        if size.git_bytes > self.config.deep_cleanup_threshold_bytes {
            warn!(
                git_bytes = size.git_bytes,
                threshold = self.config.deep_cleanup_threshold_bytes,
                "Repository history over threshold"
            );
            self.deep_cleanup();
            return true;
        }
        false
    }

    /// Replace the clone with a fresh shallow one when `.git` exceeds the
    /// fresh-clone threshold. Returns whether a re-clone happened.
    ///
    /// # Errors
    ///
    /// Returns an error if the re-clone fails or loses store items.
    pub fn fresh_clone_if_oversized(&self) -> Result<bool> {
        if !self.git.is_repo() {
            return Ok(false);
        }
        let size = self.measure_size();
        if size.git_bytes <= self.config.fresh_clone_threshold_bytes {
            return Ok(false);
        }
        warn!(git_bytes = size.git_bytes, "Replacing repository with a fresh clone");
        self.reclone()?;
        Ok(true)
    }

    /// Back up the store, replace the working tree with a shallow clone and
    /// restore the store.
    ///
    /// A backup left by an earlier failed attempt is merged, never
    /// overwritten, so a crash between steps cannot lose the store.
    fn reclone(&self) -> Result<()> {
        let store = self.store_dir();
        let backup = self.backup_dir();

        if store.exists() {
            if backup.exists() {
                copy_tree(&store, &backup)?;
                fs::remove_dir_all(&store)?;
            } else {
                move_tree(&store, &backup)?;
            }
        }
        let before = count_items(&backup);
        if before > 0 {
            info!(items = before, backup = %backup.display(), "Backed up content store");
        }

        if self.path().exists() {
            fs::remove_dir_all(self.path())?;
        }
        self.git.clone_shallow(self.main_branch())?;

        if backup.exists() {
            copy_tree(&backup, &store)?;
            let after = count_items(&store);
            verify_integrity(before, after, self.config.integrity_threshold_percent)?;
            fs::remove_dir_all(&backup)?;
            info!(items = after, "Restored content store");
        }
        Ok(())
    }

    /// Delete per-run branches matching `<prefix>-*`, locally and, when
    /// `include_remote`, on the remote. Returns the number removed.
    pub fn prune_branches(&self, prefix: &str, include_remote: bool) -> usize {
        let pattern = format!("{prefix}-");
        let current = self.git.current_branch().unwrap_or_default();
        let mut removed = 0;

        match self.git.list_local_branches() {
            Ok(branches) => {
                for branch in branches
                    .iter()
                    .filter(|b| b.starts_with(&pattern) && **b != current)
                {
                    match self.git.delete_branch(branch) {
                        Ok(()) => removed += 1,
                        Err(e) => warn!(branch, error = %e, "Could not delete local branch"),
                    }
                }
            }
            Err(e) => warn!(error = %e, "Could not list local branches"),
        }

        if include_remote {
            match self.git.list_remote_branches(&format!("{pattern}*")) {
                Ok(branches) => {
                    for branch in &branches {
                        match self.git.delete_remote_branch(branch) {
                            Ok(()) => removed += 1,
                            Err(e) => warn!(branch, error = %e, "Could not delete remote branch"),
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Could not list remote branches"),
            }
        }

        if removed > 0 {
            info!(removed, "Pruned publish branches");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeGit;
    use super::fixture::{git, Remote};
    use super::*;
    use tempfile::TempDir;

    fn config() -> RepoConfig {
        RepoConfig::default()
    }

    fn seed_store(repo: &Path, files: usize) {
        for i in 0..files {
            let path = repo.join(format!("content_store/content/ab/{i:064}.json"));
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"{}").unwrap();
        }
    }

    #[test]
    fn test_integrity_threshold() {
        assert!(matches!(
            verify_integrity(100, 90, 95),
            Err(Error::IntegrityViolation { before: 100, after: 90 })
        ));
        assert!(verify_integrity(100, 96, 95).is_ok());
        assert!(verify_integrity(100, 95, 95).is_ok());
        assert!(verify_integrity(0, 0, 95).is_ok());
        assert!(verify_integrity(100, 150, 95).is_ok());
    }

    #[test]
    fn test_ensure_ready_sequence() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        let manager = RepositoryManager::new(FakeGit::existing(&repo), config());
        manager.git().state.borrow_mut().behind = 2;

        manager.ensure_ready().unwrap();

        let calls = manager.git().calls();
        assert_eq!(calls.first().map(String::as_str), Some("checkout main"));
        let fetch = manager.git().position("fetch").unwrap();
        let pull = manager.git().position("pull").unwrap();
        assert!(fetch < pull);
    }

    #[test]
    fn test_up_to_date_repo_does_not_pull() {
        let dir = TempDir::new().unwrap();
        let manager = RepositoryManager::new(FakeGit::existing(&dir.path().join("repo")), config());
        manager.ensure_ready().unwrap();
        assert!(manager.git().position("pull").is_none());
    }

    #[test]
    fn test_protect_commits_store_before_stash() {
        let dir = TempDir::new().unwrap();
        let manager = RepositoryManager::new(FakeGit::existing(&dir.path().join("repo")), config());
        {
            let mut state = manager.git().state.borrow_mut();
            state.dirty.insert("content_store".into());
            state.dirty.insert("README.md".into());
        }

        manager.protect_then_stash();

        let git = manager.git();
        let add = git.position("add content_store").unwrap();
        let commit = git.position(&format!("commit {PROTECT_MESSAGE}")).unwrap();
        let stash = git.position("stash content_store").unwrap();
        assert!(add < commit && commit < stash);
        assert!(git.state.borrow().dirty.is_empty());
    }

    #[test]
    fn test_store_survives_stash_with_real_git() {
        let remote = Remote::seeded();
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        let manager = RepositoryManager::new(remote.client(&repo), config());
        manager.ensure_ready().unwrap();

        seed_store(&repo, 3);
        fs::write(repo.join("scratch.txt"), b"stray").unwrap();
        manager.protect_then_stash();

        assert_eq!(count_items(&manager.store_dir()), 3);
        assert!(!repo.join("scratch.txt").exists());
        assert_eq!(git(&repo, &["log", "-1", "--format=%s"]), PROTECT_MESSAGE);
        assert!(git(&repo, &["status", "--porcelain"]).is_empty());

        manager.ensure_ready().unwrap();
        assert_eq!(count_items(&manager.store_dir()), 3);
    }

    #[test]
    fn test_stash_failure_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let manager = RepositoryManager::new(FakeGit::existing(&dir.path().join("repo")), config());
        manager.git().state.borrow_mut().dirty.insert("README.md".into());
        manager.git().fail_on("stash");

        manager.ensure_ready().unwrap();
    }

    #[test]
    fn test_fetch_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let manager = RepositoryManager::new(FakeGit::existing(&dir.path().join("repo")), config());
        manager.git().fail_on("fetch");

        let err = manager.ensure_ready().unwrap_err();
        assert!(matches!(err, Error::RepositoryOperation { .. }));
    }

    #[test]
    fn test_pull_losing_store_items_raises() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        let manager = RepositoryManager::new(FakeGit::existing(&repo), config());
        seed_store(&repo, 10);
        {
            let mut state = manager.git().state.borrow_mut();
            state.behind = 1;
            state.pull_removes = vec![PathBuf::from(format!("content_store/content/ab/{:064}.json", 0))];
        }

        let err = manager.ensure_ready().unwrap_err();
        assert!(matches!(err, Error::IntegrityViolation { before: 10, after: 9 }));
    }

    #[test]
    fn test_missing_repo_is_cloned_and_store_restored() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        // A directory that is not a repository but holds store data.
        seed_store(&repo, 3);
        fs::write(repo.join("stray.txt"), b"x").unwrap();

        let manager = RepositoryManager::new(FakeGit::absent(&repo), config());
        manager.ensure_ready().unwrap();

        assert_eq!(manager.git().calls(), vec!["clone main"]);
        assert_eq!(count_items(&manager.store_dir()), 3);
        assert!(!repo.join("stray.txt").exists());
        assert!(!manager.backup_dir().exists());
    }

    #[test]
    fn test_leftover_backup_is_merged() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        seed_store(&repo, 2);
        let manager = RepositoryManager::new(FakeGit::absent(&repo), config());
        let stale = manager.backup_dir().join("results/cd");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join(format!("{:064}.json", 9)), b"{}").unwrap();

        manager.ensure_ready().unwrap();
        assert_eq!(count_items(&manager.store_dir()), 3);
    }

    #[test]
    fn test_clone_failure_keeps_backup() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        seed_store(&repo, 2);
        let manager = RepositoryManager::new(FakeGit::absent(&repo), config());
        manager.git().fail_on("clone");

        assert!(manager.ensure_ready().is_err());
        assert_eq!(count_items(&manager.backup_dir()), 2);
    }

    #[test]
    fn test_deep_cleanup_over_threshold() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        let mut cfg = config();
        cfg.deep_cleanup_threshold_bytes = 4;
        let manager = RepositoryManager::new(FakeGit::existing(&repo), cfg);
        fs::write(repo.join(".git/pack"), b"0123456789").unwrap();

        assert!(manager.cleanup_if_oversized());
        let git = manager.git();
        assert!(git.position("reflog_expire").unwrap() < git.position("gc --aggressive").unwrap());
        assert!(git.position("repack").is_some());
    }

    #[test]
    fn test_deep_cleanup_failures_are_not_fatal() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        let mut cfg = config();
        cfg.deep_cleanup_threshold_bytes = 0;
        let manager = RepositoryManager::new(FakeGit::existing(&repo), cfg);
        fs::write(repo.join(".git/pack"), b"01").unwrap();
        manager.git().fail_on("gc");

        manager.ensure_ready().unwrap();
        assert!(manager.git().position("repack").is_some());
    }

    #[test]
    fn test_fresh_clone_only_over_threshold() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        let manager = RepositoryManager::new(FakeGit::existing(&repo), config());
        assert!(!manager.fresh_clone_if_oversized().unwrap());

        let mut cfg = config();
        cfg.fresh_clone_threshold_bytes = 4;
        let manager = RepositoryManager::new(FakeGit::existing(&repo), cfg);
        seed_store(&repo, 4);
        fs::write(repo.join(".git/pack"), b"0123456789").unwrap();

        assert!(manager.fresh_clone_if_oversized().unwrap());
        assert_eq!(count_items(&manager.store_dir()), 4);
        assert!(!repo.join(".git/pack").exists());
    }

    #[test]
    fn test_prune_branches() {
        let dir = TempDir::new().unwrap();
        let manager = RepositoryManager::new(FakeGit::existing(&dir.path().join("repo")), config());
        {
            let mut state = manager.git().state.borrow_mut();
            state.local_branches.insert("data-update-2026-10-01".into());
            state.local_branches.insert("data-update-2026-10-02".into());
            state.local_branches.insert("feature".into());
            state.remote_branches.insert("data-update-2026-09-30".into());
            state.remote_branches.insert("main".into());
        }

        assert_eq!(manager.prune_branches("data-update", false), 2);
        assert_eq!(manager.prune_branches("data-update", true), 1);

        let state = manager.git().state.borrow();
        assert_eq!(
            state.local_branches.iter().cloned().collect::<Vec<_>>(),
            vec!["feature", "main"]
        );
        assert_eq!(state.remote_branches.len(), 1);
    }
}
