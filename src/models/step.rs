use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A process stage task belonging to one project (e.g. "TREINAMENTO").
///
/// Steps double as the historical training set for completion-time
/// prediction: closed steps with a positive `total_time_days` feed the
/// per-stage duration statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStep {
    pub id: i64,
    /// Task id in the external tracker. Unique.
    pub external_id: String,
    pub project_id: i64,
    /// Stage/group label, used to bucket duration statistics.
    pub stage: String,
    pub name: String,
    pub status_raw: String,

    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,

    /// Elapsed days between start and end, fractional.
    pub total_time_days: f64,
    pub idle_days: i64,
    pub reopen_count: i64,
}

impl TaskStep {
    pub fn is_closed(&self) -> bool {
        self.ended_at.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some() && self.ended_at.is_none()
    }
}
