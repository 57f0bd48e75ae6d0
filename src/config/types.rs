//! Configuration file structure.
//!
//! Every section defaults independently, so a config file only needs the
//! keys it wants to change.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const GIB: u64 = 1024 * 1024 * 1024;

/// Root configuration, stored as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LarderConfig {
    pub store: StoreConfig,
    /// Scraper output directory holding `daily/` and `latest/`.
    pub output_dir: PathBuf,
    pub repo: RepoConfig,
    pub publish: PublishConfig,
    pub export: ExportConfig,
    pub database: DatabaseConfig,
    pub jobs: JobsConfig,
}

impl Default for LarderConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            output_dir: PathBuf::from("output"),
            repo: RepoConfig::default(),
            publish: PublishConfig::default(),
            export: ExportConfig::default(),
            database: DatabaseConfig::default(),
            jobs: JobsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("content_store"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Local clone of the data repository.
    pub path: PathBuf,
    /// Plain HTTPS remote URL, without credentials.
    pub url: Option<String>,
    /// Access token; never written back to disk or logged.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub main_branch: String,
    /// Repository-relative directory the content store is mirrored into.
    pub store_subdir: String,
    pub deep_cleanup_threshold_bytes: u64,
    pub fresh_clone_threshold_bytes: u64,
    pub integrity_threshold_percent: u64,
    /// Identity used for publisher commits and merges.
    pub committer_name: String,
    pub committer_email: String,
    /// Extra `git -c key=value` settings applied to every git command.
    pub git_config: BTreeMap<String, String>,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data-repo"),
            url: None,
            token: None,
            main_branch: "main".to_string(),
            store_subdir: "content_store".to_string(),
            deep_cleanup_threshold_bytes: 75 * GIB,
            fresh_clone_threshold_bytes: 60 * GIB,
            integrity_threshold_percent: 95,
            committer_name: "larder publisher".to_string(),
            committer_email: "larder@localhost".to_string(),
            git_config: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub interval_secs: u64,
    pub error_retry_secs: u64,
    /// How many days of `daily/` directories are scanned each cycle.
    pub sync_window_days: i64,
    pub push_enabled: bool,
    pub branch_prefix: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            error_retry_secs: 60,
            sync_window_days: 7,
            push_enabled: false,
            branch_prefix: "data-update".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Repository-relative dump directory.
    pub dump_dir: String,
    pub ratchet_percent: u64,
    pub minimum_records: u64,
    pub retention_hours: i64,
    pub allow_override: bool,
    /// Optional external command that writes the SQLite export into the
    /// repository. Runs with the repository as working directory.
    pub sqlite_command: Option<Vec<String>>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dump_dir: "sql_dumps".to_string(),
            ratchet_percent: 90,
            minimum_records: 100,
            retention_hours: 3,
            allow_override: false,
            sqlite_command: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub dbname: Option<String>,
    /// Query returning the single count the ratchet tracks.
    pub count_query: String,
    /// Optional query returning `count|avg|min|max` confidence aggregates.
    pub confidence_query: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            user: None,
            password: None,
            dbname: None,
            count_query: "SELECT COUNT(*) FROM organizations".to_string(),
            confidence_query: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Base URL of the worker API; unset means no queue is consulted.
    pub status_url: Option<String>,
}
