//! Bare `file://` remotes for tests that run the real `git` binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use super::git::GitCli;

/// Run git in `dir` with a fixed identity and no signing, returning stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args(["-c", "user.name=Fixture", "-c", "user.email=fixture@localhost"])
        .args(["-c", "commit.gpgsign=false"])
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A bare repository whose `main` starts with one commit holding `README.md`.
pub struct Remote {
    dir: TempDir,
    pub bare: PathBuf,
}

impl Remote {
    pub fn seeded() -> Self {
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "--bare", "remote.git"]);
        let bare = dir.path().join("remote.git");
        git(&bare, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        let remote = Self { dir, bare };
        remote.push_commit("README.md", "# Data\n", "Initial commit");
        remote
    }

    pub fn url(&self) -> String {
        format!("file://{}", self.bare.display())
    }

    /// Commit `contents` as `file` on main from a scratch clone and push.
    pub fn push_commit(&self, file: &str, contents: &str, message: &str) {
        let work = TempDir::new_in(self.dir.path()).unwrap();
        git(work.path(), &["clone", "--quiet", &self.url(), "."]);
        git(work.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
        let path = work.path().join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
        git(work.path(), &["add", "-A"]);
        git(work.path(), &["commit", "--quiet", "-m", message]);
        git(work.path(), &["push", "--quiet", "origin", "main"]);
    }

    /// Subject of the newest commit on the remote's main.
    pub fn head_subject(&self) -> String {
        git(&self.bare, &["log", "-1", "--format=%s", "main"])
    }

    /// A client for a clone at `repo` that talks to this remote.
    pub fn client(&self, repo: &Path) -> GitCli {
        GitCli::new(repo, Some(self.url()), None).with_config("commit.gpgsign", "false")
    }
}
