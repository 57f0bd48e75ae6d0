//! Copying output files into the repository.
//!
//! A file is only copied when its fully resolved location lies inside the
//! output directory, so neither `..` segments nor symlinks can pull
//! arbitrary files into a published repository.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, error, warn};

use super::state::PublisherState;
use crate::error::{Error, Result};

/// Outcome of copying a batch of output files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub copied: usize,
    pub rejected: usize,
}

fn outside(path: &Path, root: &Path) -> Error {
    Error::PathOutsideRoot {
        path: path.to_path_buf(),
        root: root.to_path_buf(),
    }
}

/// Resolve `relative` under `root`, rejecting anything that escapes it.
///
/// # Errors
///
/// Returns `Error::PathOutsideRoot` for non-normal components or a resolved
/// path outside `root`, or `Error::Io` if resolution fails.
pub fn contained_source(root: &Path, relative: &str) -> Result<PathBuf> {
    let rel = Path::new(relative);
    if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
        return Err(outside(rel, root));
    }

    let canonical_root = root.canonicalize()?;
    let resolved = root.join(rel).canonicalize()?;
    if !resolved.starts_with(&canonical_root) {
        return Err(outside(&resolved, &canonical_root));
    }
    Ok(resolved)
}

/// Copy one output file to the same relative path inside `repo`.
///
/// # Errors
///
/// Returns `Error::PathOutsideRoot` if the source escapes `output_dir`, or
/// an I/O error if the source cannot be resolved or the copy fails.
pub fn copy_into_repo(output_dir: &Path, repo: &Path, relative: &str) -> Result<PathBuf> {
    let source = contained_source(output_dir, relative)?;
    copy_resolved(&source, repo, relative)
}

fn copy_resolved(source: &Path, repo: &Path, relative: &str) -> Result<PathBuf> {
    let target = repo.join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, &target)?;
    Ok(target)
}

/// Copy `files` and record each in `state`, persisting after every copy.
///
/// Sources that escape the output directory or no longer resolve (dangling
/// symlinks, files removed since discovery) are logged, skipped and left
/// unrecorded. A failed copy or state write stops the batch with everything
/// copied so far already recorded.
///
/// # Errors
///
/// Returns an error if a copy or the state write fails.
pub fn sync_files(
    output_dir: &Path,
    repo: &Path,
    files: &[String],
    state: &mut PublisherState,
    state_path: &Path,
) -> Result<CopyReport> {
    let mut report = CopyReport::default();

    for relative in files {
        let source = match contained_source(output_dir, relative) {
            Ok(source) => source,
            Err(e @ Error::PathOutsideRoot { .. }) => {
                error!(file = %relative, error = %e, "Refusing to copy file outside output directory");
                report.rejected += 1;
                continue;
            }
            Err(e) => {
                warn!(file = %relative, error = %e, "Skipping unresolvable output file");
                report.rejected += 1;
                continue;
            }
        };

        copy_resolved(&source, repo, relative)?;
        state.mark_processed(relative);
        state.save(state_path)?;
        report.copied += 1;
        debug!(file = %relative, "Copied output file");
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::state::STATE_FILE;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("output");
        let repo = dir.path().join("repo");
        fs::create_dir_all(output.join("latest/site_a")).unwrap();
        fs::create_dir_all(&repo).unwrap();
        fs::write(output.join("latest/site_a/orgs.json"), b"[1,2]").unwrap();
        (dir, output, repo)
    }

    #[test]
    fn test_copy_preserves_relative_path() {
        let (_dir, output, repo) = setup();
        let target = copy_into_repo(&output, &repo, "latest/site_a/orgs.json").unwrap();
        assert_eq!(target, repo.join("latest/site_a/orgs.json"));
        assert_eq!(fs::read(target).unwrap(), b"[1,2]");
    }

    #[test]
    fn test_parent_segments_rejected() {
        let (dir, output, repo) = setup();
        fs::write(dir.path().join("secret.txt"), b"x").unwrap();
        let err = copy_into_repo(&output, &repo, "../secret.txt").unwrap_err();
        assert!(matches!(err, Error::PathOutsideRoot { .. }));
        assert!(!repo.join("secret.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_skipped_and_not_recorded() {
        let (dir, output, repo) = setup();
        fs::write(dir.path().join("secret.txt"), b"x").unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("secret.txt"),
            output.join("latest/site_a/link.json"),
        )
        .unwrap();

        let state_path = output.join(STATE_FILE);
        let mut state = PublisherState::default();
        let files = vec![
            "latest/site_a/link.json".to_string(),
            "latest/site_a/orgs.json".to_string(),
        ];
        let report = sync_files(&output, &repo, &files, &mut state, &state_path).unwrap();

        assert_eq!(report, CopyReport { copied: 1, rejected: 1 });
        assert!(!repo.join("latest/site_a/link.json").exists());
        assert!(!state.is_processed("latest/site_a/link.json"));

        let persisted = PublisherState::load(&state_path);
        assert!(persisted.is_processed("latest/site_a/orgs.json"));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_does_not_stop_the_batch() {
        let (_dir, output, repo) = setup();
        std::os::unix::fs::symlink(
            "/nonexistent/larder-target",
            output.join("latest/site_a/0link.json"),
        )
        .unwrap();

        let state_path = output.join(STATE_FILE);
        let mut state = PublisherState::default();
        let files = vec![
            "latest/site_a/0link.json".to_string(),
            "latest/site_a/gone.json".to_string(),
            "latest/site_a/orgs.json".to_string(),
        ];
        let report = sync_files(&output, &repo, &files, &mut state, &state_path).unwrap();

        assert_eq!(report, CopyReport { copied: 1, rejected: 2 });
        assert!(repo.join("latest/site_a/orgs.json").exists());
        assert!(!state.is_processed("latest/site_a/0link.json"));
        assert!(!state.is_processed("latest/site_a/gone.json"));
        assert!(state.is_processed("latest/site_a/orgs.json"));
    }
}
