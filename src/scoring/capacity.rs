use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Datelike, TimeZone, Utc};

use crate::config::ScoringConfig;
use crate::models::project::Project;
use crate::models::score::{CapacityEntry, LoadBand};

#[derive(Debug, Default)]
struct LoadAcc {
    points: f64,
    store_count: usize,
    networks: BTreeSet<String>,
    finished_points: f64,
    finished_count: usize,
}

/// Aggregate class-weighted load per operator against the capacity ceiling.
///
/// Current load counts in-flight projects only; semester-to-date finished
/// points are tracked alongside so long-running effort stays visible. The
/// output is sorted descending by current + semester points, most loaded
/// operator first.
pub fn team_capacity(
    projects: &[Project],
    now: DateTime<Utc>,
    cfg: &ScoringConfig,
) -> Vec<CapacityEntry> {
    let mut order: Vec<String> = Vec::new();
    let mut accs: HashMap<String, LoadAcc> = HashMap::new();
    let semester_start = semester_start(now);

    for project in projects {
        let Some(operator) = project.operator.as_deref() else {
            continue;
        };
        let weight = cfg.class_weight(project.class);

        if project.is_wip() {
            if !accs.contains_key(operator) {
                order.push(operator.to_string());
            }
            let acc = accs.entry(operator.to_string()).or_default();
            acc.points += weight;
            acc.store_count += 1;
            if let Some(network) = project.network.as_deref() {
                acc.networks.insert(network.to_string());
            }
        } else if project.is_completed() {
            let finished_in_semester = project
                .effective_finished_at()
                .map(|finished| finished >= semester_start)
                .unwrap_or(false);
            if finished_in_semester {
                if !accs.contains_key(operator) {
                    order.push(operator.to_string());
                }
                let acc = accs.entry(operator.to_string()).or_default();
                acc.finished_points += weight;
                acc.finished_count += 1;
            }
        }
    }

    let mut entries: Vec<CapacityEntry> = order
        .iter()
        .filter(|name| accs[name.as_str()].store_count > 0)
        .map(|name| {
            let acc = &accs[name.as_str()];
            let current = round1(acc.points);
            let finished = round1(acc.finished_points);
            let utilization = round1(current / cfg.capacity_points * 100.0);

            CapacityEntry {
                operator: name.clone(),
                current_points: current,
                finished_points_semester: finished,
                total_semester_points: round1(current + finished),
                capacity_points: cfg.capacity_points,
                store_count: acc.store_count,
                finished_count_semester: acc.finished_count,
                utilization_pct: utilization,
                band: classify_utilization(utilization, cfg),
                active_networks: acc.networks.iter().cloned().collect(),
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.total_semester_points
            .partial_cmp(&a.total_semester_points)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    entries
}

/// Utilization bands, exhaustive over all non-negative percentages:
/// `<40 LOW, <90 NORMAL, <high_split HIGH, >=high_split CRITICAL`.
pub fn classify_utilization(utilization_pct: f64, cfg: &ScoringConfig) -> LoadBand {
    if utilization_pct < 40.0 {
        LoadBand::Low
    } else if utilization_pct < 90.0 {
        LoadBand::Normal
    } else if utilization_pct < cfg.load_high_split {
        LoadBand::High
    } else {
        LoadBand::Critical
    }
}

fn semester_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let month = if now.month() <= 6 { 1 } else { 7 };
    Utc.with_ymd_and_hms(now.year(), month, 1, 0, 0, 0).unwrap()
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
