pub mod capacity;
pub mod duration;
pub mod forecast;
pub mod performance;
pub mod prediction;
pub mod risk;
pub mod status;

use chrono::{DateTime, Utc};

use crate::config::ScoringConfig;
use crate::models::project::Project;
use crate::models::score::{CompletionForecast, RiskScore};
use crate::models::step::TaskStep;
use self::prediction::StagePredictor;

/// Score a project with its completion prediction folded in: the predicted
/// lateness feeds the schedule-pillar override and the display-tier
/// escalation. Completed projects carry no lateness.
pub fn risk_with_prediction(
    project: &Project,
    project_steps: &[TaskStep],
    predictor: &StagePredictor,
    now: DateTime<Utc>,
    cfg: &ScoringConfig,
) -> (RiskScore, CompletionForecast) {
    let forecast = predictor.predict(project, project_steps, now, cfg);
    let lateness = if forecast.concluded {
        None
    } else {
        Some(forecast.days_late)
    };
    let score = risk::risk_score(project, lateness, now, cfg);
    (score, forecast)
}
