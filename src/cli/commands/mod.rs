//! Command implementations.

pub mod completions;
pub mod export;
pub mod publish;
pub mod status;
pub mod store;
pub mod version;

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::collab::{HttpJobStatus, JobStatusLookup, NoJobQueue};
use crate::config::{load_config, LarderConfig};
use crate::error::Result;
use crate::store::ContentStore;

/// Load configuration for a command.
pub(crate) fn config(path: Option<&PathBuf>) -> Result<LarderConfig> {
    load_config(path.map(PathBuf::as_path))
}

/// Open the content store, wired to the job queue when one is configured.
pub(crate) fn open_store(config: &LarderConfig) -> Result<ContentStore> {
    let jobs: Arc<dyn JobStatusLookup> = match &config.jobs.status_url {
        Some(url) => Arc::new(HttpJobStatus::new(url)?),
        None => Arc::new(NoJobQueue),
    };
    ContentStore::open(&config.store.root, jobs)
}

/// Read a file argument, with `-` meaning stdin.
pub(crate) fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    Ok(fs::read_to_string(path)?)
}
