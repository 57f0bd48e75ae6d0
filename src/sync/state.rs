//! Publisher state: which output files have already been copied.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::file::{read_json, write_json_atomic};
use crate::error::Result;

/// File name inside the output directory.
pub const STATE_FILE: &str = ".publisher_state.json";

/// Set of output-relative paths already published.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherState {
    pub processed_files: BTreeSet<String>,
    pub last_updated: Option<String>,
}

impl PublisherState {
    /// Load state from `path`.
    ///
    /// A missing file is a fresh start. An unreadable file is logged and
    /// also treated as a fresh start; the cost is re-copying files that are
    /// already in the repository.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        match read_json(path) {
            Ok(Some(state)) => state,
            Ok(None) => Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable publisher state");
                Self::default()
            }
        }
    }

    /// Persist atomically, stamping `last_updated`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.last_updated = Some(Utc::now().to_rfc3339());
        write_json_atomic(path, self)
    }

    #[must_use]
    pub fn is_processed(&self, relative: &str) -> bool {
        self.processed_files.contains(relative)
    }

    /// Record a file; returns `false` if it was already recorded.
    pub fn mark_processed(&mut self, relative: &str) -> bool {
        self.processed_files.insert(relative.to_string())
    }

    /// Drop a recorded file so discovery offers it again; returns whether
    /// it was recorded.
    pub fn forget(&mut self, relative: &str) -> bool {
        self.processed_files.remove(relative)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.processed_files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processed_files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::file::temp_path_for;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_and_set_semantics() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(STATE_FILE);

        let mut state = PublisherState::load(&path);
        assert!(state.is_empty());
        assert!(state.mark_processed("latest/site_a/1.json"));
        assert!(!state.mark_processed("latest/site_a/1.json"));
        state.save(&path).unwrap();

        let mut loaded = PublisherState::load(&path);
        assert_eq!(loaded.len(), 1);
        assert!(loaded.is_processed("latest/site_a/1.json"));
        assert!(loaded.last_updated.is_some());

        assert!(loaded.forget("latest/site_a/1.json"));
        assert!(!loaded.forget("latest/site_a/1.json"));
        assert!(!loaded.is_processed("latest/site_a/1.json"));
    }

    #[test]
    fn test_interrupted_write_keeps_previous_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(STATE_FILE);

        let mut state = PublisherState::default();
        state.mark_processed("daily/2026-10-01/a.json");
        state.save(&path).unwrap();

        std::fs::write(temp_path_for(&path), b"{\"processed_files\": [\"daily/").unwrap();

        let loaded = PublisherState::load(&path);
        assert!(loaded.is_processed("daily/2026-10-01/a.json"));
    }

    #[test]
    fn test_corrupt_state_is_fresh_start() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(STATE_FILE);
        std::fs::write(&path, b"garbage").unwrap();
        assert!(PublisherState::load(&path).is_empty());
    }
}
