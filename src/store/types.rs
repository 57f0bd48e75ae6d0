//! Content store record and file types.

use serde::{Deserialize, Serialize};

/// Lifecycle of a content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    /// Content seen, no result stored yet.
    Pending,
    /// A result has been attached.
    Completed,
}

impl ContentStatus {
    /// String stored in the `status` column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Unknown content status: {s}")),
        }
    }
}

/// One row of the hash index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub hash: String,
    pub status: ContentStatus,
    /// Store-relative path; the file may be missing for rows created by a
    /// result that arrived without its content.
    pub content_path: String,
    pub result_path: Option<String>,
    pub job_id: Option<String>,
    pub created_at: String,
    pub processed_at: Option<String>,
}

/// On-disk content file: `content/<p>/<hash>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentFile {
    pub content: String,
    pub metadata: serde_json::Value,
    /// RFC 3339 time of first write.
    pub timestamp: String,
}

/// On-disk result file: `results/<p>/<hash>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultFile {
    pub result: String,
    pub job_id: String,
    pub timestamp: String,
}

/// What `store_content` tells the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreOutcome {
    pub hash: String,
    pub status: ContentStatus,
    /// Cached result, only for `Completed`.
    pub result: Option<String>,
    /// Job that produced the cached result, only for `Completed`.
    pub job_id: Option<String>,
}

impl StoreOutcome {
    /// True when the caller should enqueue processing work.
    #[must_use]
    pub fn needs_processing(&self) -> bool {
        self.status == ContentStatus::Pending
    }
}

/// Row counts from the hash index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCounts {
    pub total: u64,
    pub completed: u64,
    pub pending: u64,
}

/// Best-effort store statistics.
///
/// Each part is `None` when it could not be measured, so "zero because
/// empty" and "zero because the scan failed" stay distinguishable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStatistics {
    pub counts: Option<IndexCounts>,
    pub store_size_bytes: Option<u64>,
}

impl StoreStatistics {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.map_or(0, |c| c.total)
    }

    #[must_use]
    pub fn completed(&self) -> u64 {
        self.counts.map_or(0, |c| c.completed)
    }

    #[must_use]
    pub fn pending(&self) -> u64 {
        self.counts.map_or(0, |c| c.pending)
    }

    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.store_size_bytes.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_column_text() {
        for status in [ContentStatus::Pending, ContentStatus::Completed] {
            assert_eq!(status.as_str().parse::<ContentStatus>().unwrap(), status);
        }
        assert!("done".parse::<ContentStatus>().is_err());
    }

    #[test]
    fn test_unmeasured_statistics_read_as_zero() {
        let stats = StoreStatistics::default();
        assert_eq!(stats.total(), 0);
        assert_eq!(stats.size_bytes(), 0);
        assert!(stats.counts.is_none());
    }
}
