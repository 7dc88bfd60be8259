use chrono::{DateTime, Utc};

use crate::config::ScoringConfig;
use crate::models::project::{Lifecycle, Project};
use crate::models::score::{PillarScore, RiskBand, RiskBreakdown, RiskScore};

// Schedule pillar: progress ratio upper bound -> score, ascending. A ratio
// past the last bound scores 100.
const SCHEDULE_THRESHOLDS: &[(f64, f64)] = &[
    (0.65, 10.0),
    (0.80, 30.0),
    (1.00, 60.0),
    (1.15, 85.0),
];

// Idleness pillar: days-without-update upper bound (inclusive) -> score.
const IDLE_THRESHOLDS: &[(i64, f64)] = &[(2, 0.0), (5, 25.0), (10, 60.0), (20, 85.0)];

const REWORK_SCORE: f64 = 60.0;

/// Financial-standing label classes. The synonym tables below are closed:
/// an unanticipated label classifies as Unknown and scores conservatively
/// at 0 rather than guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinancialStanding {
    OnTime,
    Pending,
    Owing,
    Unknown,
}

const OWING_LABELS: &[&str] = &["devendo", "inadimplente"];
const PENDING_LABELS: &[&str] = &["não paga", "nao paga", "pendente"];
const ON_TIME_LABELS: &[&str] = &["em dia", "pago", "paid"];

pub fn classify_financial(label: &str) -> FinancialStanding {
    let label = label.trim().to_lowercase();
    if label.is_empty() {
        return FinancialStanding::Unknown;
    }
    if OWING_LABELS.iter().any(|needle| label.contains(needle)) {
        return FinancialStanding::Owing;
    }
    if PENDING_LABELS.iter().any(|needle| label.contains(needle)) {
        return FinancialStanding::Pending;
    }
    if ON_TIME_LABELS.iter().any(|needle| label.contains(needle)) {
        return FinancialStanding::OnTime;
    }
    FinancialStanding::Unknown
}

/// Compute the 0-100 risk score for one project. Higher is worse.
///
/// `predicted_lateness_days` is the stage-level completion prediction from
/// `scoring::prediction`; when present it can only raise the schedule pillar
/// and the display tier, never lower them.
pub fn risk_score(
    project: &Project,
    predicted_lateness_days: Option<f64>,
    now: DateTime<Utc>,
    cfg: &ScoringConfig,
) -> RiskScore {
    let lateness = predicted_lateness_days.unwrap_or(0.0).max(0.0);

    let net_days = project.days_in_progress(now);
    let contract_days = match project.contract_days {
        Some(days) if days > 0 => days,
        _ => cfg.default_contract_days,
    };

    // A zero contract would make the ratio undefined; treat as severe.
    let ratio = if contract_days > 0 {
        net_days as f64 / contract_days as f64
    } else {
        1.5
    };

    let table_score = SCHEDULE_THRESHOLDS
        .iter()
        .find(|(bound, _)| ratio < *bound)
        .map(|(_, score)| *score)
        .unwrap_or(100.0);
    let lateness_override = if lateness > 30.0 {
        100.0
    } else if lateness > 15.0 {
        85.0
    } else if lateness > 7.0 {
        60.0
    } else {
        0.0
    };
    let schedule_raw = table_score.max(lateness_override);

    let idle_raw = IDLE_THRESHOLDS
        .iter()
        .find(|(bound, _)| project.idle_days <= *bound)
        .map(|(_, score)| *score)
        .unwrap_or(100.0);

    let standing = project
        .financial_status
        .as_deref()
        .map(classify_financial)
        .unwrap_or(FinancialStanding::Unknown);
    let financial_raw = match standing {
        FinancialStanding::OnTime | FinancialStanding::Unknown => 0.0,
        FinancialStanding::Pending => 20.0,
        // Still owing after delivery is the worst financial position.
        FinancialStanding::Owing if project.status == Lifecycle::Done => 90.0,
        FinancialStanding::Owing => 70.0,
    };

    let quality_raw = if project.delivered_with_quality {
        0.0
    } else if project.had_rework {
        REWORK_SCORE
    } else {
        0.0
    };

    let weights = &cfg.risk_weights;
    let breakdown = RiskBreakdown {
        schedule: PillarScore::new(schedule_raw, weights.schedule)
            .with_detail(format!("{net_days}d elapsed of {contract_days}d contract")),
        idleness: PillarScore::new(idle_raw, weights.idleness)
            .with_detail(format!("{}d idle", project.idle_days)),
        financial: PillarScore::new(financial_raw, weights.financial),
        quality: PillarScore::new(quality_raw, weights.quality),
    };

    let total = round1(
        breakdown.schedule.contribution
            + breakdown.idleness.contribution
            + breakdown.financial.contribution
            + breakdown.quality.contribution,
    );

    let band = classify_band(total);
    let boost = lateness * 2.0 + idle_raw * 0.5;
    let display_tier = escalate_tier(band, lateness);

    RiskScore {
        total,
        band,
        display_tier,
        boost: round1(boost),
        breakdown,
    }
}

/// Classification bands, inclusive and non-overlapping over 0-100.
pub fn classify_band(total: f64) -> RiskBand {
    if total >= 75.0 {
        RiskBand::Critical
    } else if total >= 50.0 {
        RiskBand::AtRisk
    } else if total >= 25.0 {
        RiskBand::Attention
    } else {
        RiskBand::Healthy
    }
}

// Escalate-only: predicted lateness can promote the display tier but never
// demote a band the numeric score already earned.
fn escalate_tier(band: RiskBand, lateness_days: f64) -> RiskBand {
    if lateness_days > 14.0 {
        band.max(RiskBand::Critical)
    } else if lateness_days > 7.0 {
        band.max(RiskBand::AtRisk)
    } else {
        band
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
