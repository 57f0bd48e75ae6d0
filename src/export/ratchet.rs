//! Record count ratchet.
//!
//! A persisted high-water mark of the published record count. A dump whose
//! live count falls too far below it looks like mass data loss upstream
//! and is refused rather than published.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ExportConfig;
use crate::error::{Error, Result};
use crate::sync::file::{read_json, write_json_atomic};

/// File name inside the dump directory.
pub const RATCHET_FILE: &str = "ratchet.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCountRatchet {
    pub max_record_count: u64,
    pub updated_at: String,
    pub updated_by: String,
}

impl RecordCountRatchet {
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        read_json(path)
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    /// Minimum count accepted against this ratchet.
    #[must_use]
    pub fn floor(&self, ratchet_percent: u64) -> u64 {
        self.max_record_count.saturating_mul(ratchet_percent) / 100
    }
}

/// Decide whether a dump of `count` records may be published.
///
/// With a ratchet, the count must reach `ratchet_percent` of the high-water
/// mark unless `allow_override` is set. Without one, only a count below
/// `minimum_records` is refused, and only when an earlier dump exists: the
/// very first dump is always allowed.
///
/// # Errors
///
/// Returns `Error::UnsafeExport` when the dump is refused.
pub fn check_export_allowed(
    count: u64,
    ratchet: Option<&RecordCountRatchet>,
    prior_dump_exists: bool,
    policy: &ExportConfig,
) -> Result<()> {
    match ratchet {
        Some(ratchet) => {
            let max = ratchet.max_record_count;
            if u128::from(count) * 100 < u128::from(max) * u128::from(policy.ratchet_percent) {
                if policy.allow_override {
                    warn!(count, max, "Record count below ratchet, override enabled");
                    return Ok(());
                }
                return Err(Error::UnsafeExport(format!(
                    "record count {count} is below {}% of high-water mark {max} (floor {})",
                    policy.ratchet_percent,
                    ratchet.floor(policy.ratchet_percent)
                )));
            }
        }
        None => {
            if count < policy.minimum_records && prior_dump_exists {
                return Err(Error::UnsafeExport(format!(
                    "record count {count} is below minimum {} and a previous dump exists",
                    policy.minimum_records
                )));
            }
        }
    }
    Ok(())
}

/// Ratchet after a successful dump of `count` records, if it moved.
#[must_use]
pub fn raised(
    current: Option<&RecordCountRatchet>,
    count: u64,
    updated_by: &str,
) -> Option<RecordCountRatchet> {
    if current.is_some_and(|r| count <= r.max_record_count) {
        return None;
    }
    info!(
        previous = current.map(|r| r.max_record_count),
        count, "Raising record count ratchet"
    );
    Some(RecordCountRatchet {
        max_record_count: count,
        updated_at: Utc::now().to_rfc3339(),
        updated_by: updated_by.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratchet(max: u64) -> RecordCountRatchet {
        RecordCountRatchet {
            max_record_count: max,
            updated_at: "2026-10-01T00:00:00Z".into(),
            updated_by: "test".into(),
        }
    }

    #[test]
    fn test_ratchet_gating() {
        let policy = ExportConfig::default();
        let r = ratchet(1000);

        assert!(matches!(
            check_export_allowed(850, Some(&r), true, &policy),
            Err(Error::UnsafeExport(_))
        ));
        assert!(check_export_allowed(900, Some(&r), true, &policy).is_ok());
        assert!(check_export_allowed(950, Some(&r), true, &policy).is_ok());
        assert!(check_export_allowed(1200, Some(&r), true, &policy).is_ok());
    }

    #[test]
    fn test_override_allows_drop() {
        let policy = ExportConfig {
            allow_override: true,
            ..ExportConfig::default()
        };
        assert!(check_export_allowed(10, Some(&ratchet(1000)), true, &policy).is_ok());
    }

    #[test]
    fn test_minimum_without_ratchet() {
        let policy = ExportConfig::default();
        assert!(check_export_allowed(5, None, false, &policy).is_ok());
        assert!(matches!(
            check_export_allowed(5, None, true, &policy),
            Err(Error::UnsafeExport(_))
        ));
        assert!(check_export_allowed(100, None, true, &policy).is_ok());
    }

    #[test]
    fn test_raise_only_upward() {
        let r = ratchet(1000);
        assert!(raised(Some(&r), 950, "t").is_none());
        assert!(raised(Some(&r), 1000, "t").is_none());
        assert_eq!(raised(Some(&r), 1200, "t").unwrap().max_record_count, 1200);
        assert_eq!(raised(None, 7, "t").unwrap().max_record_count, 7);
    }

    #[test]
    fn test_floor() {
        assert_eq!(ratchet(1000).floor(90), 900);
    }
}
