//! In-memory [`Git`] used by repository and publisher tests.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::git::Git;
use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct FakeState {
    pub calls: Vec<String>,
    pub is_repo: bool,
    pub current: String,
    pub local_branches: BTreeSet<String>,
    pub remote_branches: BTreeSet<String>,
    /// Paths with uncommitted changes; `add -A` stages everything.
    pub dirty: BTreeSet<String>,
    pub staged: bool,
    pub behind: u64,
    /// Operation names that fail, e.g. `"fetch"`.
    pub fail: BTreeSet<&'static str>,
    /// Repository-relative files deleted by a pull.
    pub pull_removes: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct FakeGit {
    path: PathBuf,
    pub state: RefCell<FakeState>,
}

impl FakeGit {
    /// A fake whose working tree already exists on `main`.
    pub fn existing(path: &Path) -> Self {
        std::fs::create_dir_all(path.join(".git")).unwrap();
        let fake = Self::absent(path);
        {
            let mut state = fake.state.borrow_mut();
            state.is_repo = true;
            state.current = "main".into();
            state.local_branches.insert("main".into());
        }
        fake
    }

    /// A fake with no clone yet.
    pub fn absent(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            state: RefCell::new(FakeState::default()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    /// Index of the first call starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.state.borrow().calls.iter().position(|c| c.starts_with(prefix))
    }

    pub fn fail_on(&self, op: &'static str) {
        self.state.borrow_mut().fail.insert(op);
    }

    fn record(&self, op: &'static str, detail: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let call = if detail.is_empty() {
            op.to_string()
        } else {
            format!("{op} {detail}")
        };
        state.calls.push(call.clone());
        if state.fail.contains(op) {
            return Err(Error::repository(call, "simulated failure"));
        }
        Ok(())
    }
}

impl Git for FakeGit {
    fn repo_path(&self) -> &Path {
        &self.path
    }

    fn is_repo(&self) -> bool {
        self.state.borrow().is_repo
    }

    fn clone_shallow(&self, branch: &str) -> Result<()> {
        self.record("clone", branch)?;
        std::fs::create_dir_all(self.path.join(".git"))?;
        let mut state = self.state.borrow_mut();
        state.is_repo = true;
        state.current = branch.to_string();
        state.local_branches = BTreeSet::from([branch.to_string()]);
        state.dirty.clear();
        Ok(())
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        self.record("checkout", branch)?;
        let mut state = self.state.borrow_mut();
        if !state.local_branches.contains(branch) {
            return Err(Error::repository("checkout", format!("no branch {branch}")));
        }
        state.current = branch.to_string();
        Ok(())
    }

    fn create_branch(&self, branch: &str) -> Result<()> {
        self.record("create_branch", branch)?;
        let mut state = self.state.borrow_mut();
        if !state.local_branches.insert(branch.to_string()) {
            return Err(Error::repository("create_branch", "branch exists"));
        }
        state.current = branch.to_string();
        Ok(())
    }

    fn delete_branch(&self, branch: &str) -> Result<()> {
        self.record("delete_branch", branch)?;
        let mut state = self.state.borrow_mut();
        if state.current == branch {
            return Err(Error::repository("delete_branch", "branch is checked out"));
        }
        state.local_branches.remove(branch);
        Ok(())
    }

    fn branch_exists_local(&self, branch: &str) -> Result<bool> {
        Ok(self.state.borrow().local_branches.contains(branch))
    }

    fn branch_exists_remote(&self, branch: &str) -> Result<bool> {
        self.record("ls_remote", branch)?;
        Ok(self.state.borrow().remote_branches.contains(branch))
    }

    fn list_local_branches(&self) -> Result<Vec<String>> {
        Ok(self.state.borrow().local_branches.iter().cloned().collect())
    }

    fn list_remote_branches(&self, pattern: &str) -> Result<Vec<String>> {
        self.record("ls_remote", pattern)?;
        let prefix = pattern.trim_end_matches('*');
        Ok(self
            .state
            .borrow()
            .remote_branches
            .iter()
            .filter(|b| b.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn delete_remote_branch(&self, branch: &str) -> Result<()> {
        self.record("delete_remote_branch", branch)?;
        self.state.borrow_mut().remote_branches.remove(branch);
        Ok(())
    }

    fn add(&self, pathspecs: &[&str]) -> Result<()> {
        self.record("add", &pathspecs.join(" "))?;
        let mut state = self.state.borrow_mut();
        if pathspecs == ["-A"] {
            state.dirty.clear();
            state.staged = true;
        } else {
            for path in pathspecs {
                if state.dirty.remove(*path) {
                    state.staged = true;
                }
            }
        }
        Ok(())
    }

    fn has_staged_changes(&self) -> Result<bool> {
        Ok(self.state.borrow().staged)
    }

    fn has_changes(&self, pathspec: Option<&str>) -> Result<bool> {
        let state = self.state.borrow();
        Ok(match pathspec {
            Some(path) => state.dirty.contains(path),
            None => !state.dirty.is_empty(),
        })
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.record("commit", message)?;
        let mut state = self.state.borrow_mut();
        if !state.staged {
            return Err(Error::repository("commit", "nothing to commit"));
        }
        state.staged = false;
        Ok(())
    }

    fn stash_excluding(&self, excluded: &[&str]) -> Result<()> {
        self.record("stash", &excluded.join(" "))?;
        self.state
            .borrow_mut()
            .dirty
            .retain(|p| excluded.contains(&p.as_str()));
        Ok(())
    }

    fn fetch_shallow(&self, branch: &str) -> Result<()> {
        self.record("fetch", branch)
    }

    fn commits_behind(&self, branch: &str) -> Result<u64> {
        self.record("rev_list", branch)?;
        Ok(self.state.borrow().behind)
    }

    fn pull_shallow(&self, branch: &str) -> Result<()> {
        self.record("pull", branch)?;
        let mut state = self.state.borrow_mut();
        for relative in state.pull_removes.drain(..) {
            let _ = std::fs::remove_file(self.path.join(relative));
        }
        state.behind = 0;
        Ok(())
    }

    fn merge_no_ff(&self, branch: &str, _message: &str) -> Result<()> {
        self.record("merge", branch)
    }

    fn push(&self, branch: &str) -> Result<()> {
        self.record("push", branch)
    }

    fn gc(&self, aggressive: bool) -> Result<()> {
        self.record("gc", if aggressive { "--aggressive" } else { "" })
    }

    fn repack_aggressive(&self) -> Result<()> {
        self.record("repack", "")
    }

    fn expire_reflog(&self) -> Result<()> {
        self.record("reflog_expire", "")
    }

    fn current_branch(&self) -> Result<String> {
        Ok(self.state.borrow().current.clone())
    }
}
