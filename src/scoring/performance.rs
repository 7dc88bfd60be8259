use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::ScoringConfig;
use crate::models::project::Project;
use crate::models::score::{PerformanceBreakdown, PerformanceEntry, PillarScore};

#[derive(Debug, Default)]
struct OperatorAcc {
    wip: usize,
    completed: usize,
    total_days: i64,
    on_time: usize,
    rework_count: usize,
    mrr_done: f64,
    points: f64,
}

/// Rank operators by composite performance over a window of completed
/// projects. WIP counts are carried for display but never window-filtered.
///
/// Operators with zero completed deliveries score 0 across the board.
/// Ordering is a stable descending sort, so ties keep insertion order.
pub fn performance_ranking(
    projects: &[Project],
    window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    now: DateTime<Utc>,
    cfg: &ScoringConfig,
) -> Vec<PerformanceEntry> {
    // Vec + index map keeps first-seen operator order for stable ties.
    let mut order: Vec<String> = Vec::new();
    let mut accs: HashMap<String, OperatorAcc> = HashMap::new();

    for project in projects {
        let Some(operator) = project.operator.as_deref() else {
            continue;
        };
        if !accs.contains_key(operator) {
            order.push(operator.to_string());
        }
        let acc = accs.entry(operator.to_string()).or_default();

        if project.is_wip() {
            acc.wip += 1;
            continue;
        }
        if !project.is_completed() {
            continue;
        }

        if let Some((window_start, window_end)) = window {
            match project.effective_finished_at() {
                Some(finished) if finished >= window_start && finished <= window_end => {}
                _ => continue,
            }
        }

        let net_days = project.days_in_progress(now);
        let contract_days = match project.contract_days {
            Some(days) if days > 0 => days,
            _ => cfg.default_contract_days,
        };

        acc.completed += 1;
        acc.total_days += net_days;
        if net_days <= contract_days as i64 {
            acc.on_time += 1;
        }
        if project.had_rework {
            acc.rework_count += 1;
        }
        acc.mrr_done += project.monthly_value;
        acc.points += cfg.class_weight(project.class);
    }

    // Global average cycle time: mean of per-operator averages, so one
    // high-volume operator does not drown everyone else's baseline.
    let operator_averages: Vec<f64> = order
        .iter()
        .filter_map(|name| {
            let acc = &accs[name];
            (acc.completed > 0).then(|| acc.total_days as f64 / acc.completed as f64)
        })
        .collect();
    let global_avg = if operator_averages.is_empty() {
        0.0
    } else {
        operator_averages.iter().sum::<f64>() / operator_averages.len() as f64
    };

    let max_points = order
        .iter()
        .map(|name| accs[name].points)
        .fold(0.0_f64, f64::max);

    let weights = &cfg.performance_weights;
    let mut entries: Vec<PerformanceEntry> = order
        .iter()
        .map(|name| {
            let acc = &accs[name];
            let completed = acc.completed;

            if completed == 0 {
                return PerformanceEntry {
                    operator: name.clone(),
                    score: 0.0,
                    completed: 0,
                    wip: acc.wip,
                    on_time: 0,
                    otd_pct: 0.0,
                    avg_cycle_days: 0.0,
                    rework_pct: 0.0,
                    mrr_done: 0.0,
                    points: 0.0,
                    low_sample: true,
                    breakdown: PerformanceBreakdown {
                        volume: PillarScore::new(0.0, weights.volume),
                        on_time_delivery: PillarScore::new(0.0, weights.on_time_delivery),
                        quality: PillarScore::new(0.0, weights.quality),
                        efficiency: PillarScore::new(0.0, weights.efficiency),
                    },
                };
            }

            let otd_pct = round1(acc.on_time as f64 / completed as f64 * 100.0);
            let avg_cycle = round1(acc.total_days as f64 / completed as f64);
            let rework_pct = round1(acc.rework_count as f64 / completed as f64 * 100.0);
            let quality_pct = 100.0 - rework_pct;

            let volume_raw = if max_points > 0.0 {
                acc.points / max_points * 100.0
            } else {
                0.0
            };

            let efficiency_raw = if avg_cycle <= 0.0 || global_avg <= 0.0 {
                100.0
            } else if avg_cycle > global_avg * 1.2 {
                40.0
            } else if avg_cycle > global_avg {
                70.0
            } else {
                100.0
            };

            let breakdown = PerformanceBreakdown {
                volume: PillarScore::new(volume_raw, weights.volume)
                    .with_detail(format!("{:.1} weighted points", acc.points)),
                on_time_delivery: PillarScore::new(otd_pct, weights.on_time_delivery),
                quality: PillarScore::new(quality_pct, weights.quality),
                efficiency: PillarScore::new(efficiency_raw, weights.efficiency)
                    .with_detail(format!("{avg_cycle:.1}d avg vs {global_avg:.1}d global")),
            };

            let score = round1(
                breakdown.volume.contribution
                    + breakdown.on_time_delivery.contribution
                    + breakdown.quality.contribution
                    + breakdown.efficiency.contribution,
            );

            PerformanceEntry {
                operator: name.clone(),
                score,
                completed,
                wip: acc.wip,
                on_time: acc.on_time,
                otd_pct,
                avg_cycle_days: avg_cycle,
                rework_pct,
                mrr_done: acc.mrr_done,
                points: round1(acc.points),
                low_sample: completed < cfg.min_deliveries_for_ranking,
                breakdown,
            }
        })
        .collect();

    entries.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    entries
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use crate::models::project::{Lifecycle, StoreClass};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn completed_project(operator: &str, class: StoreClass, cycle_days: i64, rework: bool) -> Project {
        let start = now() - Duration::days(cycle_days + 30);
        Project {
            id: 0,
            external_id: format!("{operator}-{cycle_days}-{rework}"),
            name: "Loja".to_string(),
            external_store_id: None,
            status_raw: "concluído".to_string(),
            status: Lifecycle::Done,
            created_at: Some(start),
            started_at: Some(start),
            completed_at: Some(start + Duration::days(cycle_days)),
            closed_at: None,
            manual_started_at: None,
            manual_finished_at: None,
            contract_days: Some(90),
            monthly_value: 500.0,
            setup_value: 0.0,
            financial_status: Some("Em dia".to_string()),
            had_rework: rework,
            delivered_with_quality: !rework,
            idle_days: 0,
            operator: Some(operator.to_string()),
            class,
            network: None,
            parent_id: None,
            erp: None,
            cnpj: None,
            crm: None,
            pauses: Vec::new(),
        }
    }

    fn wip_project(operator: &str) -> Project {
        let mut p = completed_project(operator, StoreClass::Filial, 10, false);
        p.status = Lifecycle::InProgress;
        p.completed_at = None;
        p
    }

    #[test]
    fn top_weighted_volume_scores_exactly_one_hundred() {
        let cfg = ScoringConfig::default();
        let mut projects = Vec::new();
        for _ in 0..4 {
            projects.push(completed_project("ana", StoreClass::Matriz, 60, false));
        }
        projects.push(completed_project("bruno", StoreClass::Filial, 60, false));

        let ranking = performance_ranking(&projects, None, now(), &cfg);
        let ana = ranking.iter().find(|e| e.operator == "ana").unwrap();
        assert_eq!(ana.breakdown.volume.raw_score, 100.0);
        let bruno = ranking.iter().find(|e| e.operator == "bruno").unwrap();
        assert!(bruno.breakdown.volume.raw_score < 100.0);
    }

    #[test]
    fn strong_operator_outranks_late_rework_operator() {
        let cfg = ScoringConfig::default();
        let mut projects = Vec::new();
        for _ in 0..10 {
            projects.push(completed_project("ana", StoreClass::Matriz, 60, false));
        }
        projects.push(completed_project("bruno", StoreClass::Filial, 60, false));
        projects.push(completed_project("bruno", StoreClass::Filial, 120, true));

        let ranking = performance_ranking(&projects, None, now(), &cfg);
        assert_eq!(ranking[0].operator, "ana");
        let ana = &ranking[0];
        let bruno = ranking.iter().find(|e| e.operator == "bruno").unwrap();
        assert!(ana.score > bruno.score);
        assert_eq!(ana.otd_pct, 100.0);
        assert_eq!(bruno.rework_pct, 50.0);
    }

    #[test]
    fn zero_completed_scores_zero_but_keeps_wip_count() {
        let cfg = ScoringConfig::default();
        let projects = vec![wip_project("carla"), wip_project("carla")];

        let ranking = performance_ranking(&projects, None, now(), &cfg);
        assert_eq!(ranking.len(), 1);
        assert_eq!(ranking[0].score, 0.0);
        assert_eq!(ranking[0].wip, 2);
        assert!(ranking[0].low_sample);
    }

    #[test]
    fn window_filter_excludes_out_of_range_completions() {
        let cfg = ScoringConfig::default();
        let projects = vec![completed_project("ana", StoreClass::Matriz, 60, false)];
        let window_start = now() - Duration::days(5);
        let window_end = now();

        let ranking = performance_ranking(&projects, Some((window_start, window_end)), now(), &cfg);
        assert_eq!(ranking[0].completed, 0);
        assert_eq!(ranking[0].score, 0.0);
    }

    #[test]
    fn empty_input_produces_empty_ranking() {
        let cfg = ScoringConfig::default();
        assert!(performance_ranking(&[], None, now(), &cfg).is_empty());
    }
}
