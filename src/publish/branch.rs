//! Per-run branch naming.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::repo::Git;

static BRANCH_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_/\-]+$").unwrap());

/// Reject names that could be read as git options or revision syntax.
///
/// # Errors
///
/// Returns `Error::InvalidBranchName` if `name` has characters outside
/// `[a-zA-Z0-9_/-]` or starts with `-`.
pub fn validate_branch_name(name: &str) -> Result<()> {
    if !BRANCH_NAME.is_match(name) || name.starts_with('-') {
        return Err(Error::InvalidBranchName(name.to_string()));
    }
    Ok(())
}

/// `<prefix>-<YYYY-MM-DD>`.
#[must_use]
pub fn branch_name(prefix: &str, date: NaiveDate) -> String {
    format!("{prefix}-{}", date.format("%Y-%m-%d"))
}

/// Eight random hex characters.
#[must_use]
pub fn random_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Validate, clear a stale local branch of the same name, avoid remote
/// collisions, then create and switch to the branch. Returns the name used.
///
/// # Errors
///
/// Returns `Error::InvalidBranchName` before any git command runs, or
/// `Error::RepositoryOperation` if the branch cannot be created.
pub fn prepare_branch<G: Git>(git: &G, name: &str, check_remote: bool) -> Result<String> {
    validate_branch_name(name)?;

    if git.branch_exists_local(name)? {
        info!(branch = name, "Deleting leftover local branch");
        git.delete_branch(name)?;
    }

    let mut chosen = name.to_string();
    if check_remote {
        match git.branch_exists_remote(name) {
            Ok(true) => {
                chosen = format!("{name}-{}", random_suffix());
                validate_branch_name(&chosen)?;
                info!(branch = %chosen, "Remote branch exists, using suffixed name");
            }
            Ok(false) => {}
            Err(e) => warn!(branch = name, error = %e, "Could not check remote branch"),
        }
    }

    git.create_branch(&chosen)?;
    Ok(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::fake::FakeGit;
    use tempfile::TempDir;

    #[test]
    fn test_validate_branch_name() {
        assert!(validate_branch_name("data-update-2026-10-18").is_ok());
        assert!(validate_branch_name("feature/x_y").is_ok());
        for bad in ["bad@name", "", "a b", "x;rm", "--force", "a..b", "ref~1"] {
            assert!(
                matches!(validate_branch_name(bad), Err(Error::InvalidBranchName(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_branch_name_format() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 8).unwrap();
        assert_eq!(branch_name("data-update", date), "data-update-2026-10-08");
    }

    #[test]
    fn test_random_suffix() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_invalid_name_runs_no_git() {
        let dir = TempDir::new().unwrap();
        let git = FakeGit::existing(dir.path());
        assert!(prepare_branch(&git, "bad@name", true).is_err());
        assert!(git.calls().is_empty());
    }

    #[test]
    fn test_local_leftover_is_deleted() {
        let dir = TempDir::new().unwrap();
        let git = FakeGit::existing(dir.path());
        git.state.borrow_mut().local_branches.insert("data-update-2026-10-18".into());

        let name = prepare_branch(&git, "data-update-2026-10-18", false).unwrap();
        assert_eq!(name, "data-update-2026-10-18");
        assert!(git.position("delete_branch data-update-2026-10-18").unwrap()
            < git.position("create_branch data-update-2026-10-18").unwrap());
    }

    #[test]
    fn test_remote_collision_gets_suffix() {
        let dir = TempDir::new().unwrap();
        let git = FakeGit::existing(dir.path());
        git.state.borrow_mut().remote_branches.insert("data-update-2026-10-18".into());

        let name = prepare_branch(&git, "data-update-2026-10-18", true).unwrap();
        assert!(name.starts_with("data-update-2026-10-18-"));
        assert_eq!(name.len(), "data-update-2026-10-18-".len() + 8);
        assert_eq!(git.current_branch().unwrap(), name);
    }
}
