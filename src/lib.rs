pub mod config;
pub mod db;
pub mod ingest;
pub mod models;
pub mod scoring;

pub use config::ScoringConfig;
pub use models::project::{Lifecycle, Pause, Project, StoreClass};
pub use models::score::{
    CapacityEntry, CompletionForecast, Confidence, ForecastMonth, LoadBand, PerformanceEntry,
    RiskBand, RiskScore,
};
pub use models::snapshot::DailySnapshot;
pub use models::step::TaskStep;
pub use scoring::capacity::team_capacity;
pub use scoring::duration::net_days_in_progress;
pub use scoring::forecast::financial_forecast;
pub use scoring::performance::performance_ranking;
pub use scoring::prediction::{stage_bottlenecks, PredictorCache, StagePredictor};
pub use scoring::risk_with_prediction;
pub use scoring::risk::risk_score;
pub use scoring::status::normalize;
