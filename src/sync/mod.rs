//! File movement between the scraper output, the content store and the
//! data repository.
//!
//! - **Discovery**: new files under `daily/` and `latest/`
//! - **Copy**: path-contained copies into the repository, recorded in
//!   [`PublisherState`] one file at a time
//! - **Mirror**: incremental store copy plus a consistent index snapshot
//! - **File**: atomic writes and directory measurements shared by the
//!   rest of the crate
//!
//! # Crash safety
//!
//! State is persisted after each successful copy, so after a crash the
//! recorded set matches what actually reached the repository. Every
//! persisted document goes through [`file::atomic_write`].

pub mod copy;
pub mod discover;
pub mod file;
pub mod mirror;
pub mod state;

pub use copy::{contained_source, copy_into_repo, sync_files, CopyReport};
pub use discover::{daily_dirs_in_window, discover_new_files, DAILY_DIR, LATEST_DIR};
pub use file::{atomic_write, dir_size, dir_size_excluding, read_json, write_json_atomic};
pub use mirror::{mirror_store, snapshot_index, MirrorReport};
pub use state::{PublisherState, STATE_FILE};
