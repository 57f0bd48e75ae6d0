//! Derived exports written into the data repository.
//!
//! - [`dump`] - gzipped SQL dumps with rotation, gated by the [`ratchet`]
//! - [`sqlite`] - external SQLite export command
//! - [`metadata`] - generated README/DATA sections and `metadata.json`

pub mod dump;
pub mod metadata;
pub mod ratchet;
pub mod sqlite;

pub use dump::{export_sql_dump, list_dumps, rotate_dumps, DumpReport, LATEST_DUMP};
pub use metadata::{
    collect_metadata, replace_generated_section, write_metadata, RepositoryMetadata,
};
pub use ratchet::{check_export_allowed, RecordCountRatchet, RATCHET_FILE};
pub use sqlite::run_sqlite_export;
