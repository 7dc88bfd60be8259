use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Pillar weights for the project risk score. Must sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskWeights {
    pub schedule: f64,
    pub idleness: f64,
    pub financial: f64,
    pub quality: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            schedule: 0.45,
            idleness: 0.25,
            financial: 0.20,
            quality: 0.10,
        }
    }
}

/// Pillar weights for the operator performance score. Must sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PerformanceWeights {
    pub volume: f64,
    pub on_time_delivery: f64,
    pub quality: f64,
    pub efficiency: f64,
}

impl Default for PerformanceWeights {
    fn default() -> Self {
        Self {
            volume: 0.40,
            on_time_delivery: 0.30,
            quality: 0.20,
            efficiency: 0.10,
        }
    }
}

/// Tunable constants for the scoring core. Every field has a documented
/// default; overrides come from the `system_config` key-value store and are
/// clamped into sane ranges on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Volume weight of a Matriz (primary) store.
    pub weight_matriz: f64,
    /// Volume weight of a Filial (dependent) store.
    pub weight_filial: f64,

    pub risk_weights: RiskWeights,
    pub performance_weights: PerformanceWeights,

    /// Contract SLA assumed when a project carries none.
    pub default_contract_days: u32,
    /// Capacity ceiling in load points per operator.
    pub capacity_points: f64,
    /// Utilization percentage where HIGH tips into CRITICAL. Must stay
    /// above the fixed NORMAL/HIGH boundary at 90.
    pub load_high_split: f64,

    /// Minimum historical samples before a stage estimate counts as solid.
    pub min_stage_samples: usize,
    /// Completed deliveries below this get the low-sample ranking flag.
    pub min_deliveries_for_ranking: usize,

    /// Trailing window for the average-cycle-time estimate, in days.
    pub forecast_window_days: i64,
    /// Buffer applied when a projected completion lands in the past.
    pub reanchor_buffer_days: i64,

    /// Ordered process stages every rollout is expected to pass through.
    pub required_stages: Vec<String>,
}

/// Default stage sequence of the rollout process.
pub fn default_required_stages() -> Vec<String> {
    [
        "SUBIR_APPS",
        "INTEGRACAO",
        "CADASTRO_OMIE",
        "ONBOARDING",
        "CRIAR_LOJAS",
        "ATIVAR_RECORRENCIA",
        "TREINAMENTO",
        "CADASTRO_PRODUTOS",
        "QUALIDADE",
        "POS_IMPLANTACAO",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weight_matriz: 1.0,
            weight_filial: 0.7,
            risk_weights: RiskWeights::default(),
            performance_weights: PerformanceWeights::default(),
            default_contract_days: 90,
            capacity_points: 30.0,
            load_high_split: 110.0,
            min_stage_samples: 10,
            min_deliveries_for_ranking: 5,
            forecast_window_days: 90,
            reanchor_buffer_days: 15,
            required_stages: default_required_stages(),
        }
    }
}

impl ScoringConfig {
    /// Build a config from raw key-value overrides. Unknown keys are
    /// ignored; unparsable values keep the default. Out-of-range values are
    /// clamped, and weight groups that no longer sum to 1 are renormalized.
    pub fn from_kv(overrides: &HashMap<String, String>) -> Self {
        let mut cfg = Self::default();

        read_f64(overrides, "weight_matriz", &mut cfg.weight_matriz);
        read_f64(overrides, "weight_filial", &mut cfg.weight_filial);
        cfg.weight_matriz = cfg.weight_matriz.clamp(0.1, 5.0);
        cfg.weight_filial = cfg.weight_filial.clamp(0.1, 5.0);

        read_f64(overrides, "risk_weight_schedule", &mut cfg.risk_weights.schedule);
        read_f64(overrides, "risk_weight_idleness", &mut cfg.risk_weights.idleness);
        read_f64(overrides, "risk_weight_financial", &mut cfg.risk_weights.financial);
        read_f64(overrides, "risk_weight_quality", &mut cfg.risk_weights.quality);

        read_f64(overrides, "perf_weight_volume", &mut cfg.performance_weights.volume);
        read_f64(overrides, "perf_weight_otd", &mut cfg.performance_weights.on_time_delivery);
        read_f64(overrides, "perf_weight_quality", &mut cfg.performance_weights.quality);
        read_f64(overrides, "perf_weight_efficiency", &mut cfg.performance_weights.efficiency);

        read_u32(overrides, "default_contract_days", &mut cfg.default_contract_days);
        cfg.default_contract_days = cfg.default_contract_days.clamp(7, 365);

        read_f64(overrides, "capacity_points", &mut cfg.capacity_points);
        cfg.capacity_points = cfg.capacity_points.clamp(1.0, 500.0);

        read_f64(overrides, "load_high_split", &mut cfg.load_high_split);
        cfg.load_high_split = cfg.load_high_split.clamp(91.0, 1000.0);

        read_usize(overrides, "min_stage_samples", &mut cfg.min_stage_samples);
        cfg.min_stage_samples = cfg.min_stage_samples.clamp(1, 1000);

        read_usize(
            overrides,
            "min_deliveries_for_ranking",
            &mut cfg.min_deliveries_for_ranking,
        );

        read_i64(overrides, "forecast_window_days", &mut cfg.forecast_window_days);
        cfg.forecast_window_days = cfg.forecast_window_days.clamp(7, 365);

        read_i64(overrides, "reanchor_buffer_days", &mut cfg.reanchor_buffer_days);
        cfg.reanchor_buffer_days = cfg.reanchor_buffer_days.clamp(1, 90);

        if let Some(raw) = overrides.get("required_stages") {
            let stages: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !stages.is_empty() {
                cfg.required_stages = stages;
            }
        }

        normalize_risk_weights(&mut cfg.risk_weights);
        normalize_performance_weights(&mut cfg.performance_weights);

        cfg
    }

    pub fn class_weight(&self, class: crate::models::project::StoreClass) -> f64 {
        match class {
            crate::models::project::StoreClass::Matriz => self.weight_matriz,
            crate::models::project::StoreClass::Filial => self.weight_filial,
        }
    }
}

fn read_f64(map: &HashMap<String, String>, key: &str, target: &mut f64) {
    if let Some(value) = map.get(key).and_then(|v| v.trim().parse::<f64>().ok()) {
        if value.is_finite() {
            *target = value;
        }
    }
}

fn read_u32(map: &HashMap<String, String>, key: &str, target: &mut u32) {
    if let Some(value) = map.get(key).and_then(|v| v.trim().parse::<u32>().ok()) {
        *target = value;
    }
}

fn read_usize(map: &HashMap<String, String>, key: &str, target: &mut usize) {
    if let Some(value) = map.get(key).and_then(|v| v.trim().parse::<usize>().ok()) {
        *target = value;
    }
}

fn read_i64(map: &HashMap<String, String>, key: &str, target: &mut i64) {
    if let Some(value) = map.get(key).and_then(|v| v.trim().parse::<i64>().ok()) {
        *target = value;
    }
}

fn normalize_risk_weights(weights: &mut RiskWeights) {
    let clamped = [
        weights.schedule.clamp(0.0, 1.0),
        weights.idleness.clamp(0.0, 1.0),
        weights.financial.clamp(0.0, 1.0),
        weights.quality.clamp(0.0, 1.0),
    ];
    let sum: f64 = clamped.iter().sum();
    if sum > f64::EPSILON {
        weights.schedule = clamped[0] / sum;
        weights.idleness = clamped[1] / sum;
        weights.financial = clamped[2] / sum;
        weights.quality = clamped[3] / sum;
    } else {
        *weights = RiskWeights::default();
    }
}

fn normalize_performance_weights(weights: &mut PerformanceWeights) {
    let clamped = [
        weights.volume.clamp(0.0, 1.0),
        weights.on_time_delivery.clamp(0.0, 1.0),
        weights.quality.clamp(0.0, 1.0),
        weights.efficiency.clamp(0.0, 1.0),
    ];
    let sum: f64 = clamped.iter().sum();
    if sum > f64::EPSILON {
        weights.volume = clamped[0] / sum;
        weights.on_time_delivery = clamped[1] / sum;
        weights.quality = clamped[2] / sum;
        weights.efficiency = clamped[3] / sum;
    } else {
        *weights = PerformanceWeights::default();
    }
}
