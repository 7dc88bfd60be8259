use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized lifecycle state. The external tracker reports free-text labels;
/// `scoring::status` maps them onto this closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Lifecycle {
    NotStarted,
    InProgress,
    Blocked,
    Done,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::NotStarted => "NOT_STARTED",
            Lifecycle::InProgress => "IN_PROGRESS",
            Lifecycle::Blocked => "BLOCKED",
            Lifecycle::Done => "DONE",
        }
    }

    /// Parse a stored canonical label. Unknown values fall back to
    /// IN_PROGRESS, matching the normalizer's default.
    pub fn parse(value: &str) -> Lifecycle {
        match value {
            "NOT_STARTED" => Lifecycle::NotStarted,
            "BLOCKED" => Lifecycle::Blocked,
            "DONE" => Lifecycle::Done,
            _ => Lifecycle::InProgress,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Lifecycle::Done)
    }
}

/// Weight class: a Matriz is the primary site of an account group, a Filial
/// a dependent site. Matriz work counts for more volume points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreClass {
    Matriz,
    Filial,
}

impl StoreClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreClass::Matriz => "Matriz",
            StoreClass::Filial => "Filial",
        }
    }

    pub fn parse(value: &str) -> StoreClass {
        if value.eq_ignore_ascii_case("matriz") {
            StoreClass::Matriz
        } else {
            StoreClass::Filial
        }
    }
}

/// A pause/freeze window. Open pauses (no end) run until "now" for duration
/// purposes. The persistence layer enforces at most one open pause per
/// project and end >= start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pause {
    pub id: i64,
    pub project_id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl Pause {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// A rollout project (one store, tracked end-to-end).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    /// Task id in the external tracker. Unique.
    pub external_id: String,
    pub name: String,
    /// Human-facing store code carried in a custom field (e.g. "F0H-533").
    pub external_store_id: Option<String>,

    pub status_raw: String,
    pub status: Lifecycle,

    /// Creation instant reported by the tracker.
    pub created_at: Option<DateTime<Utc>>,
    /// Start instant reported by the tracker.
    pub started_at: Option<DateTime<Utc>>,
    /// Completion event reported by the tracker.
    pub completed_at: Option<DateTime<Utc>>,
    /// Closure instant reported by the tracker.
    pub closed_at: Option<DateTime<Utc>>,
    /// Manual overrides. These always win over tracker-reported instants.
    pub manual_started_at: Option<DateTime<Utc>>,
    pub manual_finished_at: Option<DateTime<Utc>>,

    /// Contractual SLA in days. None falls back to the configured default.
    pub contract_days: Option<u32>,
    pub monthly_value: f64,
    pub setup_value: f64,
    /// Free-text financial standing label ("Em dia", "Devendo", ...).
    pub financial_status: Option<String>,

    pub had_rework: bool,
    pub delivered_with_quality: bool,
    /// Days since the tracker last recorded any update. Never negative.
    pub idle_days: i64,

    pub operator: Option<String>,
    pub class: StoreClass,
    pub network: Option<String>,
    pub parent_id: Option<i64>,

    pub erp: Option<String>,
    pub cnpj: Option<String>,
    pub crm: Option<String>,

    pub pauses: Vec<Pause>,
}

impl Project {
    /// Effective start: manual override > tracker start > creation.
    pub fn effective_started_at(&self) -> Option<DateTime<Utc>> {
        self.manual_started_at
            .or(self.started_at)
            .or(self.created_at)
    }

    /// Effective finish: manual override > tracker completion > closure.
    pub fn effective_finished_at(&self) -> Option<DateTime<Utc>> {
        self.manual_finished_at
            .or(self.completed_at)
            .or(self.closed_at)
    }

    /// A project counts as delivered once it is DONE or has a manual finish.
    pub fn is_completed(&self) -> bool {
        self.status == Lifecycle::Done || self.manual_finished_at.is_some()
    }

    /// Work in progress: actively running and not manually closed out.
    pub fn is_wip(&self) -> bool {
        self.status == Lifecycle::InProgress && self.manual_finished_at.is_none()
    }

    /// Pause-adjusted net days between effective start and effective finish
    /// (or `now` while still open).
    pub fn days_in_progress(&self, now: DateTime<Utc>) -> i64 {
        crate::scoring::duration::net_days_in_progress(
            self.effective_started_at(),
            self.effective_finished_at(),
            &self.pauses,
            now,
        )
    }
}
