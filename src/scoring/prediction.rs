use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::config::ScoringConfig;
use crate::models::project::Project;
use crate::models::score::{
    CompletionForecast, Confidence, StageBottleneck, StageEstimate, StageStatus,
};
use crate::models::step::TaskStep;

// Safe estimates for stages with no usable history at all.
const FALLBACK_AVG_DAYS: f64 = 5.0;
const FALLBACK_P75_DAYS: f64 = 6.0;

// Idle penalty: half a day of estimate per idle day past this threshold.
const IDLE_PENALTY_THRESHOLD: i64 = 5;
const IDLE_PENALTY_PER_DAY: f64 = 0.5;

// An in-progress, not-yet-overdue stage always keeps a minimum remaining
// estimate so the projection cannot flag a completion that has not happened.
const MIN_REMAINING_P50: f64 = 1.0;
const MIN_REMAINING_P75: f64 = 2.5;

/// Historical duration statistics for one stage group.
#[derive(Debug, Clone)]
pub struct StageStats {
    pub avg: f64,
    pub std_dev: f64,
    pub p50: f64,
    pub p75: f64,
    pub count: usize,
}

/// Per-stage duration statistics trained from closed historical steps.
#[derive(Debug, Default)]
pub struct StagePredictor {
    stats: HashMap<String, StageStats>,
}

impl StagePredictor {
    /// Train from the full historical step dataset. Only closed steps with a
    /// positive recorded duration count. Stages with five or more samples
    /// get IQR outlier filtering before the mean/median/p75 are taken.
    pub fn train(steps: &[TaskStep]) -> Self {
        let mut grouped: HashMap<String, Vec<f64>> = HashMap::new();
        for step in steps {
            if step.stage.is_empty() || step.total_time_days <= 0.0 {
                continue;
            }
            grouped
                .entry(step.stage.clone())
                .or_default()
                .push(step.total_time_days);
        }

        let mut stats = HashMap::new();
        for (stage, mut values) in grouped {
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let count = values.len();

            let entry = if count < 5 {
                let avg = values.iter().sum::<f64>() / count as f64;
                StageStats {
                    avg,
                    std_dev: 0.0,
                    p50: avg,
                    p75: avg * 1.2,
                    count,
                }
            } else {
                let q1 = percentile(&values, 25.0);
                let q3 = percentile(&values, 75.0);
                let upper_bound = q3 + 1.5 * (q3 - q1);

                let mut clean: Vec<f64> =
                    values.iter().copied().filter(|v| *v <= upper_bound).collect();
                if clean.is_empty() {
                    clean = values.clone();
                }

                let avg = clean.iter().sum::<f64>() / clean.len() as f64;
                StageStats {
                    avg,
                    std_dev: sample_std_dev(&clean, avg),
                    p50: percentile(&clean, 50.0),
                    p75: percentile(&clean, 75.0),
                    count,
                }
            };
            stats.insert(stage, entry);
        }

        Self { stats }
    }

    pub fn stats(&self, stage: &str) -> Option<&StageStats> {
        self.stats.get(stage)
    }

    /// Predict completion timing for one project from its current stage
    /// steps. Completed projects short-circuit to their effective finish.
    pub fn predict(
        &self,
        project: &Project,
        project_steps: &[TaskStep],
        now: DateTime<Utc>,
        cfg: &ScoringConfig,
    ) -> CompletionForecast {
        let contract_days = match project.contract_days {
            Some(days) if days > 0 => days,
            _ => cfg.default_contract_days,
        };
        let start = project.effective_started_at().unwrap_or(now);
        let contract_due = start + Duration::days(contract_days as i64);

        if let Some(finished) = project.effective_finished_at() {
            return CompletionForecast {
                concluded: true,
                predicted_date: finished,
                predicted_date_p75: finished,
                contract_due,
                remaining_days: 0.0,
                days_late: 0.0,
                confidence: Confidence::High,
                breakdown: Vec::new(),
            };
        }

        // Latest step per stage wins when the tracker carries duplicates.
        let mut steps_by_stage: HashMap<&str, &TaskStep> = HashMap::new();
        for step in project_steps {
            steps_by_stage.insert(step.stage.as_str(), step);
        }

        let mut breakdown = Vec::with_capacity(cfg.required_stages.len());
        let mut low_data_stages = 0usize;

        for stage in &cfg.required_stages {
            let sample_count = self.stats(stage).map(|s| s.count).unwrap_or(0);
            if sample_count < cfg.min_stage_samples {
                low_data_stages += 1;
            }
            let (mut contribution_p50, mut contribution_p75) = match self.stats(stage) {
                Some(stats) => (stats.p50, stats.p75),
                None => (FALLBACK_AVG_DAYS, FALLBACK_P75_DAYS),
            };

            let current = steps_by_stage.get(stage.as_str()).copied();
            let status = match current {
                Some(step) if step.is_closed() => StageStatus::Done,
                Some(step) if step.started_at.is_some() => StageStatus::InProgress,
                _ => StageStatus::Todo,
            };

            let mut elapsed = 0.0;
            match current {
                Some(step) if step.is_closed() => {
                    contribution_p50 = 0.0;
                    contribution_p75 = 0.0;
                }
                Some(step) => {
                    if let Some(started) = step.started_at {
                        elapsed = now.signed_duration_since(started).num_days().max(0) as f64;
                    }
                }
                None => {}
            }

            let mut idle_penalty = 0.0;
            if contribution_p50 > 0.0 {
                if let Some(step) = current {
                    if step.idle_days > IDLE_PENALTY_THRESHOLD {
                        idle_penalty = step.idle_days as f64 * IDLE_PENALTY_PER_DAY;
                    }
                }
            }

            let mut remaining_p50 = (contribution_p50 - elapsed).max(0.0) + idle_penalty;
            let mut remaining_p75 = (contribution_p75 - elapsed).max(0.0) + idle_penalty;

            if contribution_p50 > 0.0 && remaining_p50 < MIN_REMAINING_P50 {
                remaining_p50 = MIN_REMAINING_P50;
            }
            if contribution_p75 > 0.0 && remaining_p75 < MIN_REMAINING_P75 {
                remaining_p75 = MIN_REMAINING_P75;
            }

            breakdown.push(StageEstimate {
                stage: stage.clone(),
                status,
                remaining_p50: round1(remaining_p50),
                remaining_p75: round1(remaining_p75),
            });
        }

        let total_p50: f64 = breakdown.iter().map(|d| d.remaining_p50).sum();
        let total_p75: f64 = breakdown.iter().map(|d| d.remaining_p75).sum();

        let predicted_date = now + days_duration(total_p50);
        let predicted_date_p75 = now + days_duration(total_p75);
        let days_late = predicted_date.signed_duration_since(contract_due).num_days() as f64;

        let confidence = if breakdown.is_empty() {
            Confidence::Low
        } else if low_data_stages * 2 > breakdown.len() {
            Confidence::Low
        } else if low_data_stages > 0 {
            Confidence::Medium
        } else {
            Confidence::High
        };

        CompletionForecast {
            concluded: false,
            predicted_date,
            predicted_date_p75,
            contract_due,
            remaining_days: round1(total_p50),
            days_late,
            confidence,
            breakdown,
        }
    }
}

/// Process-lifetime cache for the trained predictor. Training scans the
/// whole historical step table, so it runs once and is reused until an
/// explicit refresh.
#[derive(Debug, Default)]
pub struct PredictorCache {
    inner: Mutex<Option<Arc<StagePredictor>>>,
}

impl PredictorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached predictor, training it on first use.
    pub fn get_or_train<F>(&self, load_history: F) -> Arc<StagePredictor>
    where
        F: FnOnce() -> Vec<TaskStep>,
    {
        let mut guard = self.inner.lock().expect("predictor cache poisoned");
        if let Some(predictor) = guard.as_ref() {
            return Arc::clone(predictor);
        }
        let predictor = Arc::new(StagePredictor::train(&load_history()));
        *guard = Some(Arc::clone(&predictor));
        predictor
    }

    /// Retrain from fresh history and replace the cached predictor.
    pub fn refresh(&self, history: &[TaskStep]) -> Arc<StagePredictor> {
        let predictor = Arc::new(StagePredictor::train(history));
        let mut guard = self.inner.lock().expect("predictor cache poisoned");
        *guard = Some(Arc::clone(&predictor));
        predictor
    }
}

/// Rank stages by accumulated dwell time, worst first. Reopen counts ride
/// along so a fast stage that keeps bouncing back still surfaces.
pub fn stage_bottlenecks(steps: &[TaskStep], limit: usize) -> Vec<StageBottleneck> {
    let mut grouped: HashMap<String, (f64, usize, i64)> = HashMap::new();
    for step in steps {
        if step.stage.is_empty() || step.total_time_days <= 0.0 {
            continue;
        }
        let entry = grouped.entry(step.stage.clone()).or_insert((0.0, 0, 0));
        entry.0 += step.total_time_days;
        entry.1 += 1;
        entry.2 += step.reopen_count;
    }

    let mut bottlenecks: Vec<StageBottleneck> = grouped
        .into_iter()
        .map(|(stage, (total, count, reopens))| StageBottleneck {
            stage,
            total_days: round1(total),
            avg_days: round1(total / count as f64),
            reopens,
        })
        .collect();

    bottlenecks.sort_by(|a, b| {
        b.total_days
            .partial_cmp(&a.total_days)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    bottlenecks.truncate(limit);
    bottlenecks
}

/// Linear-interpolated percentile over an ascending-sorted slice.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let fraction = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * fraction
}

fn sample_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|v| (v - mean).powi(2))
        .sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}

fn days_duration(days: f64) -> Duration {
    Duration::seconds((days * 86_400.0) as i64)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
