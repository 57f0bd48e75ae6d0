//! Git operations.
//!
//! [`Git`] is the narrow surface the repository manager and publisher need.
//! [`GitCli`] implements it by running the `git` binary against one working
//! tree.
//!
//! # Credentials
//!
//! The access token is only ever placed in an in-memory URL passed as the
//! explicit remote of clone/fetch/pull/push/ls-remote. The stored `origin`
//! URL stays plain, and every command line or stderr that reaches a log or
//! an error is passed through [`redact`].

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};

/// Operations on one local clone.
pub trait Git {
    /// Working tree this instance operates on.
    fn repo_path(&self) -> &Path;

    /// Whether the working tree exists and is a git repository.
    fn is_repo(&self) -> bool;

    /// Shallow clone (`--depth 1`) of `branch` into the working tree path.
    ///
    /// # Errors
    ///
    /// Returns `Error::RepositoryOperation` if the clone fails.
    fn clone_shallow(&self, branch: &str) -> Result<()>;

    fn checkout(&self, branch: &str) -> Result<()>;

    /// Create `branch` at HEAD and switch to it.
    fn create_branch(&self, branch: &str) -> Result<()>;

    /// Force-delete a local branch.
    fn delete_branch(&self, branch: &str) -> Result<()>;

    fn branch_exists_local(&self, branch: &str) -> Result<bool>;

    fn branch_exists_remote(&self, branch: &str) -> Result<bool>;

    fn list_local_branches(&self) -> Result<Vec<String>>;

    /// Remote branch names matching a glob such as `data-update-*`.
    fn list_remote_branches(&self, pattern: &str) -> Result<Vec<String>>;

    fn delete_remote_branch(&self, branch: &str) -> Result<()>;

    /// Stage `pathspecs`; `["-A"]` stages everything.
    fn add(&self, pathspecs: &[&str]) -> Result<()>;

    fn has_staged_changes(&self) -> Result<bool>;

    /// Whether the working tree (optionally limited to `pathspec`) has
    /// modified or untracked files.
    fn has_changes(&self, pathspec: Option<&str>) -> Result<bool>;

    fn commit(&self, message: &str) -> Result<()>;

    /// Stash all changes including untracked files, except `excluded` paths.
    fn stash_excluding(&self, excluded: &[&str]) -> Result<()>;

    /// Shallow fetch of `branch` into `origin/<branch>`.
    fn fetch_shallow(&self, branch: &str) -> Result<()>;

    /// Commits on `origin/<branch>` not in HEAD. Unparseable output is 0.
    fn commits_behind(&self, branch: &str) -> Result<u64>;

    fn pull_shallow(&self, branch: &str) -> Result<()>;

    fn merge_no_ff(&self, branch: &str, message: &str) -> Result<()>;

    fn push(&self, branch: &str) -> Result<()>;

    fn gc(&self, aggressive: bool) -> Result<()>;

    fn repack_aggressive(&self) -> Result<()>;

    fn expire_reflog(&self) -> Result<()>;

    fn current_branch(&self) -> Result<String>;
}

static CREDENTIAL_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(https?://)[^/@\s]+@").unwrap());

/// Remove credentials from text bound for logs or errors.
#[must_use]
pub fn redact(text: &str, token: Option<&str>) -> String {
    let mut out = CREDENTIAL_URL.replace_all(text, "${1}***@").into_owned();
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        out = out.replace(token, "***");
    }
    out
}

/// Embed `token` into an HTTPS URL. Non-HTTPS URLs are returned unchanged.
#[must_use]
pub fn authenticated_url(url: &str, token: Option<&str>) -> String {
    match (url.strip_prefix("https://"), token.filter(|t| !t.is_empty())) {
        (Some(rest), Some(token)) => {
            let rest = rest.split_once('@').map_or(rest, |(_, host)| host);
            format!("https://{token}@{rest}")
        }
        _ => url.to_string(),
    }
}

/// `git` subprocess implementation of [`Git`].
#[derive(Clone)]
pub struct GitCli {
    repo: PathBuf,
    url: Option<String>,
    token: Option<String>,
    committer: (String, String),
    /// Per-invocation `-c key=value` settings.
    config: Vec<(String, String)>,
}

impl std::fmt::Debug for GitCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitCli")
            .field("repo", &self.repo)
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

impl GitCli {
    #[must_use]
    pub fn new(repo: &Path, url: Option<String>, token: Option<String>) -> Self {
        Self {
            repo: repo.to_path_buf(),
            url,
            token,
            committer: ("larder publisher".to_string(), "larder@localhost".to_string()),
            config: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_committer(mut self, name: &str, email: &str) -> Self {
        self.committer = (name.to_string(), email.to_string());
        self
    }

    /// Pass `key=value` to every git command with `-c`. Never written to
    /// `.git/config`.
    #[must_use]
    pub fn with_config(mut self, key: &str, value: &str) -> Self {
        self.config.push((key.to_string(), value.to_string()));
        self
    }

    /// Remote argument for network commands: the credentialed URL when one
    /// is configured, otherwise `origin`.
    fn remote(&self) -> String {
        self.url.as_deref().map_or_else(
            || "origin".to_string(),
            |url| authenticated_url(url, self.token.as_deref()),
        )
    }

    fn redact(&self, text: &str) -> String {
        redact(text, self.token.as_deref())
    }

    fn describe(&self, args: &[&str]) -> String {
        self.redact(&format!("git {}", args.join(" ")))
    }

    /// Run git with `args` in `dir`, returning the raw output.
    fn output_in(&self, dir: &Path, args: &[&str]) -> Result<Output> {
        debug!(command = %self.describe(args), "Running git");
        let mut command = Command::new("git");
        for (key, value) in &self.config {
            command.arg("-c").arg(format!("{key}={value}"));
        }
        command
            .current_dir(dir)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| Error::repository(self.describe(args), e.to_string()))
    }

    /// Run git and fail on non-zero exit, returning trimmed stdout.
    fn run(&self, args: &[&str]) -> Result<String> {
        self.run_in(&self.repo, args)
    }

    fn run_in(&self, dir: &Path, args: &[&str]) -> Result<String> {
        let output = self.output_in(dir, args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::repository(
                self.describe(args),
                self.redact(stderr.trim()),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run a commit-producing command with the publisher identity.
    fn run_as_committer(&self, args: &[&str]) -> Result<String> {
        let name = format!("user.name={}", self.committer.0);
        let email = format!("user.email={}", self.committer.1);
        let mut full = vec!["-c", name.as_str(), "-c", email.as_str()];
        full.extend_from_slice(args);
        self.run(&full)
    }
}

/// Parse `git ls-remote --heads` output into branch names.
fn parse_ls_remote(raw: &str) -> Vec<String> {
    raw.lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter_map(|r| r.strip_prefix("refs/heads/"))
        .map(String::from)
        .collect()
}

impl Git for GitCli {
    fn repo_path(&self) -> &Path {
        &self.repo
    }

    fn is_repo(&self) -> bool {
        self.repo.join(".git").exists()
            && self
                .output_in(&self.repo, &["rev-parse", "--git-dir"])
                .is_ok_and(|o| o.status.success())
    }

    fn clone_shallow(&self, branch: &str) -> Result<()> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| Error::Config("repo.url is required to clone".into()))?;
        let parent = self
            .repo
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let target = self
            .repo
            .file_name()
            .map(|n| n.to_string_lossy())
            .ok_or_else(|| Error::Config(format!("invalid repo path {}", self.repo.display())))?;
        let remote = self.remote();
        self.run_in(
            parent,
            &["clone", "--depth", "1", "--branch", branch, &remote, &target],
        )?;
        // Keep the token out of .git/config.
        self.run(&["remote", "set-url", "origin", url])?;
        Ok(())
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        self.run(&["checkout", branch]).map(drop)
    }

    fn create_branch(&self, branch: &str) -> Result<()> {
        self.run(&["checkout", "-b", branch]).map(drop)
    }

    fn delete_branch(&self, branch: &str) -> Result<()> {
        self.run(&["branch", "-D", branch]).map(drop)
    }

    fn branch_exists_local(&self, branch: &str) -> Result<bool> {
        let reference = format!("refs/heads/{branch}");
        let output = self.output_in(&self.repo, &["show-ref", "--verify", "--quiet", &reference])?;
        Ok(output.status.success())
    }

    fn branch_exists_remote(&self, branch: &str) -> Result<bool> {
        Ok(self
            .list_remote_branches(branch)?
            .iter()
            .any(|b| b == branch))
    }

    fn list_local_branches(&self) -> Result<Vec<String>> {
        let raw = self.run(&["for-each-ref", "--format=%(refname:short)", "refs/heads/"])?;
        Ok(raw.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect())
    }

    fn list_remote_branches(&self, pattern: &str) -> Result<Vec<String>> {
        let remote = self.remote();
        let reference = format!("refs/heads/{pattern}");
        let raw = self.run(&["ls-remote", "--heads", &remote, &reference])?;
        Ok(parse_ls_remote(&raw))
    }

    fn delete_remote_branch(&self, branch: &str) -> Result<()> {
        let remote = self.remote();
        self.run(&["push", &remote, "--delete", branch]).map(drop)
    }

    fn add(&self, pathspecs: &[&str]) -> Result<()> {
        let mut args = vec!["add"];
        if pathspecs != ["-A"] {
            args.push("--");
        }
        args.extend_from_slice(pathspecs);
        self.run(&args).map(drop)
    }

    fn has_staged_changes(&self) -> Result<bool> {
        let args = ["diff", "--cached", "--quiet"];
        let output = self.output_in(&self.repo, &args)?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(Error::repository(
                self.describe(&args),
                self.redact(String::from_utf8_lossy(&output.stderr).trim()),
            )),
        }
    }

    fn has_changes(&self, pathspec: Option<&str>) -> Result<bool> {
        let mut args = vec!["status", "--porcelain"];
        if let Some(path) = pathspec {
            args.extend(["--", path]);
        }
        Ok(!self.run(&args)?.is_empty())
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.run_as_committer(&["commit", "-m", message]).map(drop)
    }

    fn stash_excluding(&self, excluded: &[&str]) -> Result<()> {
        let exclusions: Vec<String> = excluded.iter().map(|p| format!(":(exclude){p}")).collect();
        let mut args = vec!["stash", "push", "-u", "-m", "larder: stash before update", "--", "."];
        args.extend(exclusions.iter().map(String::as_str));
        self.run_as_committer(&args).map(drop)
    }

    fn fetch_shallow(&self, branch: &str) -> Result<()> {
        let remote = self.remote();
        let refspec = format!("+refs/heads/{branch}:refs/remotes/origin/{branch}");
        self.run(&["fetch", "--depth=1", &remote, &refspec]).map(drop)
    }

    fn commits_behind(&self, branch: &str) -> Result<u64> {
        let range = format!("HEAD..origin/{branch}");
        let raw = self.run(&["rev-list", "--count", &range])?;
        Ok(raw.trim().parse().unwrap_or(0))
    }

    fn pull_shallow(&self, branch: &str) -> Result<()> {
        let remote = self.remote();
        self.run_as_committer(&["pull", "--depth", "1", "--no-rebase", "--no-edit", &remote, branch])
            .map(drop)
    }

    fn merge_no_ff(&self, branch: &str, message: &str) -> Result<()> {
        self.run_as_committer(&["merge", "--no-ff", "-m", message, branch]).map(drop)
    }

    fn push(&self, branch: &str) -> Result<()> {
        let remote = self.remote();
        let refspec = format!("{branch}:{branch}");
        self.run(&["push", &remote, &refspec]).map(drop)
    }

    fn gc(&self, aggressive: bool) -> Result<()> {
        let mut args = vec!["gc", "--prune=now"];
        if aggressive {
            args.push("--aggressive");
        }
        self.run(&args).map(drop)
    }

    fn repack_aggressive(&self) -> Result<()> {
        self.run(&["repack", "-a", "-d", "-f", "--depth=250", "--window=250"]).map(drop)
    }

    fn expire_reflog(&self) -> Result<()> {
        self.run(&["reflog", "expire", "--expire=now", "--all"]).map(drop)
    }

    fn current_branch(&self) -> Result<String> {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"])
    }
}
