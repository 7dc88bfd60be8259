use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, Utc};

use crate::config::ScoringConfig;
use crate::models::project::Project;
use crate::models::score::ForecastMonth;

/// Trailing months of realized history shown alongside the projection.
const TRAILING_MONTHS: i32 = 3;

/// Monthly recurring-revenue forecast: realized revenue for finished
/// projects, projected revenue for in-flight ones allocated to their
/// estimated completion month.
///
/// The estimate is effective start + the average cycle time of the trailing
/// completion window. Estimates that land in the past are re-anchored to
/// now + a small buffer instead of backdating revenue that never happened.
pub fn financial_forecast(
    projects: &[Project],
    months_ahead: u32,
    now: DateTime<Utc>,
    cfg: &ScoringConfig,
) -> Vec<ForecastMonth> {
    let avg_cycle_days = trailing_avg_cycle_days(projects, now, cfg);

    let mut months: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    let current = (now.year(), now.month());
    for offset in -TRAILING_MONTHS..=(months_ahead as i32) {
        let (year, month) = shift_month(current.0, current.1, offset);
        months.insert(month_key(year, month), (0.0, 0.0));
    }

    for project in projects {
        if project.is_completed() {
            if let Some(finished) = project.effective_finished_at() {
                let key = month_key(finished.year(), finished.month());
                if let Some(slot) = months.get_mut(&key) {
                    slot.0 += project.monthly_value;
                }
            }
        } else if project.is_wip() {
            let start = project.effective_started_at().unwrap_or(now);
            let mut projected_end = start + Duration::days(avg_cycle_days);
            if projected_end < now {
                projected_end = now + Duration::days(cfg.reanchor_buffer_days);
            }
            let key = month_key(projected_end.year(), projected_end.month());
            if let Some(slot) = months.get_mut(&key) {
                slot.1 += project.monthly_value;
            }
        }
    }

    let current_key = month_key(current.0, current.1);
    months
        .into_iter()
        .map(|(month, (realized, projected))| ForecastMonth {
            is_future: month >= current_key,
            month,
            realized: round2(realized),
            projected: round2(projected),
        })
        .collect()
}

/// Average cycle time over completions in the trailing window, whole days.
/// An empty window falls back to the default contract length.
pub fn trailing_avg_cycle_days(
    projects: &[Project],
    now: DateTime<Utc>,
    cfg: &ScoringConfig,
) -> i64 {
    let cutoff = now - Duration::days(cfg.forecast_window_days);

    let mut total_days = 0i64;
    let mut count = 0i64;
    for project in projects {
        if !project.is_completed() {
            continue;
        }
        let (Some(start), Some(end)) =
            (project.effective_started_at(), project.effective_finished_at())
        else {
            continue;
        };
        if end < cutoff {
            continue;
        }
        total_days += end.signed_duration_since(start).num_days().max(0);
        count += 1;
    }

    if count > 0 {
        total_days / count
    } else {
        cfg.default_contract_days as i64
    }
}

fn month_key(year: i32, month: u32) -> String {
    format!("{year:04}-{month:02}")
}

fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let zero_based = year * 12 + month as i32 - 1 + delta;
    (zero_based.div_euclid(12), (zero_based.rem_euclid(12) + 1) as u32)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crate::models::project::{Lifecycle, StoreClass};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    fn project(status: Lifecycle, mrr: f64) -> Project {
        Project {
            id: 0,
            external_id: format!("{status:?}-{mrr}"),
            name: "Loja".to_string(),
            external_store_id: None,
            status_raw: String::new(),
            status,
            created_at: Some(now() - Duration::days(60)),
            started_at: None,
            completed_at: None,
            closed_at: None,
            manual_started_at: None,
            manual_finished_at: None,
            contract_days: Some(90),
            monthly_value: mrr,
            setup_value: 0.0,
            financial_status: None,
            had_rework: false,
            delivered_with_quality: true,
            idle_days: 0,
            operator: None,
            class: StoreClass::Filial,
            network: None,
            parent_id: None,
            erp: None,
            cnpj: None,
            crm: None,
            pauses: Vec::new(),
        }
    }

    #[test]
    fn month_range_covers_trailing_and_leading_months() {
        let cfg = ScoringConfig::default();
        let forecast = financial_forecast(&[], 6, now(), &cfg);
        assert_eq!(forecast.len(), 3 + 6 + 1);
        assert_eq!(forecast.first().unwrap().month, "2025-03");
        assert_eq!(forecast.last().unwrap().month, "2025-12");
        assert!(!forecast[0].is_future);
        assert!(forecast.iter().any(|m| m.month == "2025-06" && m.is_future));
    }

    #[test]
    fn realized_revenue_lands_in_the_completion_month() {
        let cfg = ScoringConfig::default();
        let mut done = project(Lifecycle::Done, 800.0);
        done.completed_at = Some(Utc.with_ymd_and_hms(2025, 4, 20, 10, 0, 0).unwrap());

        let forecast = financial_forecast(&[done], 3, now(), &cfg);
        let april = forecast.iter().find(|m| m.month == "2025-04").unwrap();
        assert_eq!(april.realized, 800.0);
        assert_eq!(april.projected, 0.0);
    }

    #[test]
    fn stale_wip_estimates_reanchor_to_the_near_future() {
        let cfg = ScoringConfig::default();
        // Started long ago with a short recent cycle history: raw estimate
        // falls in the past and must re-anchor to now + buffer.
        let mut reference = project(Lifecycle::Done, 0.0);
        reference.created_at = Some(now() - Duration::days(40));
        reference.completed_at = Some(now() - Duration::days(10));

        let mut wip = project(Lifecycle::InProgress, 600.0);
        wip.created_at = Some(now() - Duration::days(200));

        let forecast = financial_forecast(&[reference, wip], 3, now(), &cfg);
        let june = forecast.iter().find(|m| m.month == "2025-06").unwrap();
        assert_eq!(june.projected, 600.0);
    }

    #[test]
    fn empty_completion_window_falls_back_to_contract_days() {
        let cfg = ScoringConfig::default();
        assert_eq!(trailing_avg_cycle_days(&[], now(), &cfg), 90);
    }

    #[test]
    fn shift_month_handles_year_boundaries() {
        assert_eq!(shift_month(2025, 1, -3), (2024, 10));
        assert_eq!(shift_month(2025, 11, 3), (2026, 2));
        assert_eq!(shift_month(2025, 6, 0), (2025, 6));
    }
}
