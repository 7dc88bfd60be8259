use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::project::Lifecycle;

/// Per-project daily metrics frozen for trend history. Scores are always
/// recomputed from entity state on read; snapshots only exist so charts can
/// look backwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub snapshot_date: NaiveDate,
    pub project_id: i64,
    pub operator: Option<String>,
    pub network: Option<String>,
    pub status: Lifecycle,
    pub days_in_progress: i64,
    pub idle_days: i64,
    /// Class-weighted effort points while the project is WIP, else 0.
    pub wip_points: f64,
    pub monthly_value: f64,
    pub risk_total: f64,
}
