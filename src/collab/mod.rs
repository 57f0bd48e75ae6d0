//! Boundaries to external collaborators.
//!
//! - [`jobs`] - status of jobs in the LLM worker queue
//! - [`database`] - the PostgreSQL system of record (counts, dumps, aggregates)

pub mod database;
pub mod jobs;

pub use database::{ConfidenceSummary, Database, PostgresCli};
pub use jobs::{HttpJobStatus, JobStatus, JobStatusLookup, MemoryJobStatus, NoJobQueue};
