//! Job queue status lookups.
//!
//! The LLM worker and its queue live outside this crate. The content store
//! only needs to know whether a job id it recorded still refers to live
//! work, which is what this boundary answers.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Status of an external job as reported by the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Started,
    Deferred,
    Scheduled,
    Finished,
    Failed,
    Stopped,
    Canceled,
    Expired,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Whether the job may still produce a result.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Queued | Self::Started | Self::Deferred | Self::Scheduled
        )
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Started => "started",
            Self::Deferred => "deferred",
            Self::Scheduled => "scheduled",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
            Self::Canceled => "canceled",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
            .map_err(|e| format!("Unknown job status {s}: {e}"))
    }
}

/// Lookup of job status by id.
pub trait JobStatusLookup: Send + Sync {
    /// Current status of `job_id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::TransientCollaborator` when the queue cannot be
    /// reached. Callers treat that as "not active".
    fn status(&self, job_id: &str) -> Result<JobStatus>;

    /// Convenience wrapper that folds lookup failures into `false`.
    fn is_active(&self, job_id: &str) -> bool {
        match self.status(job_id) {
            Ok(status) => status.is_active(),
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Job status lookup failed, treating job as inactive");
                false
            }
        }
    }
}

/// No queue configured: every job is unknown, hence inactive.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoJobQueue;

impl JobStatusLookup for NoJobQueue {
    fn status(&self, _job_id: &str) -> Result<JobStatus> {
        Ok(JobStatus::Unknown)
    }
}

/// In-memory status table.
#[derive(Debug, Default)]
pub struct MemoryJobStatus {
    jobs: Mutex<HashMap<String, JobStatus>>,
}

impl MemoryJobStatus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the status of a job.
    pub fn set(&self, job_id: &str, status: JobStatus) {
        self.jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(job_id.to_string(), status);
    }
}

impl JobStatusLookup for MemoryJobStatus {
    fn status(&self, job_id: &str) -> Result<JobStatus> {
        Ok(self
            .jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(job_id)
            .copied()
            .unwrap_or(JobStatus::Unknown))
    }
}

/// Worker API response for `GET /jobs/<id>`.
#[derive(Debug, Deserialize)]
struct JobStatusResponse {
    status: JobStatus,
}

/// Job status over the worker's HTTP API.
///
/// The store's call sites are synchronous, so requests run to completion on
/// a private current-thread runtime.
pub struct HttpJobStatus {
    client: reqwest::Client,
    base_url: String,
    runtime: tokio::runtime::Runtime,
}

impl HttpJobStatus {
    /// Create a lookup against `base_url` (for example `http://worker:8000`).
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime or HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::TransientCollaborator(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            runtime,
        })
    }

    async fn fetch(&self, job_id: &str) -> Result<JobStatus> {
        let url = format!("{}/jobs/{job_id}", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::TransientCollaborator(format!("GET {url}: {e}")))?;

        // The queue forgets jobs after their result TTL.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(JobStatus::Unknown);
        }

        if !response.status().is_success() {
            return Err(Error::TransientCollaborator(format!(
                "GET {url}: HTTP {}",
                response.status()
            )));
        }

        let body: JobStatusResponse = response
            .json()
            .await
            .map_err(|e| Error::TransientCollaborator(format!("GET {url}: {e}")))?;
        Ok(body.status)
    }
}

impl JobStatusLookup for HttpJobStatus {
    fn status(&self, job_id: &str) -> Result<JobStatus> {
        self.runtime.block_on(self.fetch(job_id))
    }
}
