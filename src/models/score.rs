use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PillarScore {
    pub raw_score: f64,
    pub weight: f64,
    pub contribution: f64,
    pub details: Vec<String>,
}

impl PillarScore {
    pub fn new(raw_score: f64, weight: f64) -> Self {
        Self {
            raw_score,
            weight,
            contribution: raw_score * weight,
            details: Vec::new(),
        }
    }

    pub fn with_detail(mut self, detail: String) -> Self {
        self.details.push(detail);
        self
    }
}

/// Risk classification bands. Ordered: escalation logic relies on
/// `Critical > AtRisk > Attention > Healthy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskBand {
    Healthy,
    Attention,
    AtRisk,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskBreakdown {
    pub schedule: PillarScore,
    pub idleness: PillarScore,
    pub financial: PillarScore,
    pub quality: PillarScore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScore {
    /// Weighted composite, 0-100, one decimal. Higher is worse.
    pub total: f64,
    pub band: RiskBand,
    /// Display tier after the lateness escalation rule. Never below `band`.
    pub display_tier: RiskBand,
    /// Escalation boost applied on top of `total` for display ordering.
    pub boost: f64,
    pub breakdown: RiskBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceBreakdown {
    pub volume: PillarScore,
    pub on_time_delivery: PillarScore,
    pub quality: PillarScore,
    pub efficiency: PillarScore,
}

/// One row of the operator ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceEntry {
    pub operator: String,
    /// Weighted composite, 0-100, one decimal. Higher is better.
    pub score: f64,
    pub completed: usize,
    pub wip: usize,
    pub on_time: usize,
    pub otd_pct: f64,
    pub avg_cycle_days: f64,
    pub rework_pct: f64,
    pub mrr_done: f64,
    /// Class-weighted delivered points.
    pub points: f64,
    /// Fewer completed deliveries than the ranking minimum.
    pub low_sample: bool,
    pub breakdown: PerformanceBreakdown,
}

/// Capacity utilization bands, exhaustive over [0, inf).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadBand {
    Low,
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityEntry {
    pub operator: String,
    /// Class-weighted load of in-flight projects.
    pub current_points: f64,
    pub finished_points_semester: f64,
    pub total_semester_points: f64,
    pub capacity_points: f64,
    pub store_count: usize,
    pub finished_count_semester: usize,
    pub utilization_pct: f64,
    pub band: LoadBand,
    /// Distinct networks touched by in-flight projects.
    pub active_networks: Vec<String>,
}

/// One month of the revenue forecast, keyed "YYYY-MM".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastMonth {
    pub month: String,
    pub realized: f64,
    pub projected: f64,
    pub is_future: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Todo,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEstimate {
    pub stage: String,
    pub status: StageStatus,
    pub remaining_p50: f64,
    pub remaining_p75: f64,
}

/// Aggregate dwell time for one process stage, for bottleneck spotting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageBottleneck {
    pub stage: String,
    pub total_days: f64,
    pub avg_days: f64,
    pub reopens: i64,
}

/// Completion-time prediction for a single project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionForecast {
    pub concluded: bool,
    pub predicted_date: DateTime<Utc>,
    pub predicted_date_p75: DateTime<Utc>,
    pub contract_due: DateTime<Utc>,
    pub remaining_days: f64,
    /// Predicted finish minus contract due, in days. Negative = early.
    pub days_late: f64,
    pub confidence: Confidence,
    pub breakdown: Vec<StageEstimate>,
}
