//! Schedule for periodic repository maintenance.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::sync::file::{read_json, write_json_atomic};

/// File name inside the output directory.
pub const MAINTENANCE_FILE: &str = ".maintenance_state.json";

const WEEKLY_DAYS: i64 = 7;
const MONTHLY_DAYS: i64 = 30;

/// When weekly and monthly maintenance last ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceState {
    pub last_weekly: Option<DateTime<Utc>>,
    pub last_monthly: Option<DateTime<Utc>>,
}

fn due(last: Option<DateTime<Utc>>, now: DateTime<Utc>, days: i64) -> bool {
    last.is_none_or(|at| now - at >= Duration::days(days))
}

impl MaintenanceState {
    /// Missing or unreadable state means everything is due.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        read_json(path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable maintenance state");
            None
        })
        .unwrap_or_default()
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    #[must_use]
    pub fn weekly_due(&self, now: DateTime<Utc>) -> bool {
        due(self.last_weekly, now, WEEKLY_DAYS)
    }

    #[must_use]
    pub fn monthly_due(&self, now: DateTime<Utc>) -> bool {
        due(self.last_monthly, now, MONTHLY_DAYS)
    }
}
