//! Configuration management.
//!
//! Configuration is a single JSON document. Resolution priority:
//! 1. Explicit `--config` path
//! 2. `LARDER_CONFIG` environment variable
//! 3. `~/.larder/config.json`
//! 4. Built-in defaults
//!
//! After the file is read, a fixed set of environment variables override
//! individual keys. Secrets (git token, database password) are expected to
//! arrive this way rather than from the file.

mod types;

pub use types::{
    DatabaseConfig, ExportConfig, JobsConfig, LarderConfig, PublishConfig, RepoConfig,
    StoreConfig,
};

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Global larder directory: `~/.larder/`.
#[must_use]
pub fn global_larder_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".larder"))
}

/// Resolve which config file to read, if any.
#[must_use]
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var("LARDER_CONFIG") {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    global_larder_dir()
        .map(|dir| dir.join("config.json"))
        .filter(|p| p.exists())
}

/// Parse a config document.
///
/// # Errors
///
/// Returns `Error::Config` if the JSON is malformed.
pub fn parse_config(content: &str) -> Result<LarderConfig> {
    serde_json::from_str(content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}

/// Load configuration and apply environment overrides.
///
/// An explicitly requested file that does not exist is an error; a missing
/// default file just means defaults.
///
/// # Errors
///
/// Returns `Error::Config` if the file cannot be read or parsed, or an
/// override has an invalid value.
pub fn load_config(explicit_path: Option<&Path>) -> Result<LarderConfig> {
    let mut config = match resolve_config_path(explicit_path) {
        Some(path) => {
            debug!(path = %path.display(), "Loading config");
            let content = fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!("Failed to read config file {}: {e}", path.display()))
            })?;
            parse_config(&content)?
        }
        None => LarderConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Apply environment overrides using `lookup` to read variables.
///
/// Empty values are ignored.
///
/// # Errors
///
/// Returns `Error::Config` for values that do not parse.
pub fn apply_env_overrides<F>(config: &mut LarderConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(token) = get("LARDER_GIT_TOKEN") {
        config.repo.token = Some(token);
    }
    if let Some(url) = get("LARDER_REPO_URL") {
        config.repo.url = Some(url);
    }
    if let Some(flag) = get("LARDER_PUSH_ENABLED") {
        config.publish.push_enabled = parse_bool("LARDER_PUSH_ENABLED", &flag)?;
    }
    if let Some(flag) = get("LARDER_ALLOW_RATCHET_OVERRIDE") {
        config.export.allow_override = parse_bool("LARDER_ALLOW_RATCHET_OVERRIDE", &flag)?;
    }
    if let Some(dir) = get("LARDER_STORE_DIR") {
        config.store.root = PathBuf::from(dir);
    }
    if let Some(dir) = get("LARDER_OUTPUT_DIR") {
        config.output_dir = PathBuf::from(dir);
    }
    if let Some(dir) = get("LARDER_REPO_PATH") {
        config.repo.path = PathBuf::from(dir);
    }
    if let Some(url) = get("LARDER_JOB_STATUS_URL") {
        config.jobs.status_url = Some(url);
    }

    // Standard libpq variables.
    if let Some(host) = get("PGHOST") {
        config.database.host = Some(host);
    }
    if let Some(port) = get("PGPORT") {
        config.database.port = Some(
            port.parse()
                .map_err(|_| Error::Config(format!("PGPORT is not a port number: {port}")))?,
        );
    }
    if let Some(user) = get("PGUSER") {
        config.database.user = Some(user);
    }
    if let Some(password) = get("PGPASSWORD") {
        config.database.password = Some(password);
    }
    if let Some(dbname) = get("PGDATABASE") {
        config.database.dbname = Some(dbname);
    }

    Ok(())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{key} must be a boolean, got {other:?}"))),
    }
}
