use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::client::{parse_epoch_ms, RawTask, TrackerClient};
use super::fields::map_custom_fields;
use super::SyncError;
use crate::db::{self, ProjectPatch, StepPatch};
use crate::scoring::status;

/// Stage whose completion closes out the whole rollout.
const COMPLETION_STAGE: &str = "TREINAMENTO";
const COMPLETION_STATUS_LABEL: &str = "Concluído (Treinamento)";

/// Single-flight gate for ingestion. Acquisition is a compare-and-swap, so
/// a second concurrent pass is rejected instead of silently overlapping.
#[derive(Debug, Default)]
pub struct SyncGate {
    running: AtomicBool,
}

impl SyncGate {
    pub fn try_acquire(&self) -> Option<SyncGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncGuard { gate: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

pub struct SyncGuard<'a> {
    gate: &'a SyncGate,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.gate.running.store(false, Ordering::Release);
    }
}

/// One stage list to pull step tasks from.
#[derive(Debug, Clone)]
pub struct StageList {
    pub stage: String,
    pub list_id: String,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Tracker list holding the store tasks.
    pub project_list_id: String,
    pub stage_lists: Vec<StageList>,
    /// Bounded fan-out width for the stage-list fetches.
    pub workers: usize,
    /// Incremental cutoff in tracker epoch milliseconds. None scans everything.
    pub updated_after_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncItemError {
    pub external_id: String,
    pub name: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: String,
    pub processed: usize,
    pub steps_updated: usize,
    pub errors: Vec<SyncItemError>,
}

/// Runs ingestion passes against the tracker. One pass at a time; scoring
/// always reads committed state, so a running pass never blocks reads.
pub struct SyncRunner {
    client: Arc<TrackerClient>,
    gate: SyncGate,
}

impl SyncRunner {
    pub fn new(client: TrackerClient) -> Self {
        Self {
            client: Arc::new(client),
            gate: SyncGate::default(),
        }
    }

    pub fn gate(&self) -> &SyncGate {
        &self.gate
    }

    /// Run one ingestion pass. Fetches store tasks and stage lists (bounded
    /// fan-out), then persists with per-item isolation: one bad record is
    /// logged and reported, siblings continue.
    pub async fn run(
        &self,
        conn: &Connection,
        options: &SyncOptions,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, SyncError> {
        let _guard = self.gate.try_acquire().ok_or(SyncError::AlreadyRunning)?;

        let run_id = Uuid::new_v4().to_string();
        db::record_sync_run_started(conn, &run_id, now)?;
        log::info!(
            "sync {run_id} started ({})",
            if options.updated_after_ms.is_some() {
                "incremental"
            } else {
                "full"
            }
        );

        let mut report = SyncReport {
            run_id: run_id.clone(),
            processed: 0,
            steps_updated: 0,
            errors: Vec::new(),
        };

        let result = self.run_inner(conn, options, now, &mut report).await;

        let status = match &result {
            Ok(()) if report.errors.is_empty() => "SUCCESS",
            Ok(()) => "PARTIAL",
            Err(_) => "ERROR",
        };
        let summary = if report.errors.is_empty() {
            None
        } else {
            Some(
                report
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.name, e.message))
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        };
        db::record_sync_run_finished(
            conn,
            &run_id,
            Utc::now(),
            status,
            report.processed,
            report.steps_updated,
            summary.as_deref(),
        )?;

        result?;
        log::info!(
            "sync {run_id} finished: {} stores, {} steps, {} errors",
            report.processed,
            report.steps_updated,
            report.errors.len()
        );
        Ok(report)
    }

    async fn run_inner(
        &self,
        conn: &Connection,
        options: &SyncOptions,
        now: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        // 1. Store tasks. A failure here aborts the pass: nothing to anchor
        // steps against.
        let store_tasks = self
            .client
            .fetch_list_tasks(&options.project_list_id, options.updated_after_ms, false)
            .await?;
        log::info!("fetched {} modified store tasks", store_tasks.len());

        // 2. Stage lists, fan-out bounded by the worker count, fan-in before
        // any persistence.
        let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
        let mut join_set = JoinSet::new();
        for stage_list in &options.stage_lists {
            let client = Arc::clone(&self.client);
            let semaphore = Arc::clone(&semaphore);
            let stage = stage_list.stage.clone();
            let list_id = stage_list.list_id.clone();
            let cutoff = options.updated_after_ms;

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let result = client.fetch_list_tasks(&list_id, cutoff, true).await;
                (stage, result)
            });
        }

        let mut step_tasks: Vec<(String, RawTask)> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((stage, Ok(tasks))) => {
                    log::debug!("stage {stage}: {} tasks", tasks.len());
                    step_tasks.extend(tasks.into_iter().map(|t| (stage.clone(), t)));
                }
                Ok((stage, Err(e))) => {
                    // One unreachable list must not sink the others.
                    log::error!("stage list {stage} failed: {e}");
                    report.errors.push(SyncItemError {
                        external_id: String::new(),
                        name: stage,
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    log::error!("stage fetch task panicked: {e}");
                    report.errors.push(SyncItemError {
                        external_id: String::new(),
                        name: "stage fetch".to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        // 3. Persist stores.
        for task in &store_tasks {
            let patch = project_patch_from_task(task, now);
            match db::upsert_synced_project(conn, &patch) {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    log::error!("failed to persist store {}: {e}", task.name);
                    report.errors.push(SyncItemError {
                        external_id: task.id.clone(),
                        name: task.name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        // 4. Persist steps, resolved to their store through the parent-ref
        // custom field, then re-apply the completion rule per touched store.
        let mut touched_projects: Vec<i64> = Vec::new();
        for (stage, task) in &step_tasks {
            let mapped = map_custom_fields(&task.custom_fields);
            let Some(parent_ref) = mapped.parent_ref.or(mapped.store_id) else {
                log::debug!("step {} carries no parent reference; skipped", task.name);
                continue;
            };

            let project_id = match db::find_project_by_store_id(conn, &parent_ref) {
                Ok(Some(id)) => id,
                Ok(None) => {
                    log::debug!("no store {parent_ref} for step {}; skipped", task.name);
                    continue;
                }
                Err(e) => {
                    report.errors.push(SyncItemError {
                        external_id: task.id.clone(),
                        name: task.name.clone(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            let patch = step_patch_from_task(task, project_id, stage, now);
            match db::upsert_synced_step(conn, &patch) {
                Ok(()) => {
                    report.steps_updated += 1;
                    if !touched_projects.contains(&project_id) {
                        touched_projects.push(project_id);
                    }
                }
                Err(e) => {
                    log::error!("failed to persist step {}: {e}", task.name);
                    report.errors.push(SyncItemError {
                        external_id: task.id.clone(),
                        name: task.name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        for project_id in touched_projects {
            if let Err(e) = apply_training_completion_rule(conn, project_id) {
                report.errors.push(SyncItemError {
                    external_id: project_id.to_string(),
                    name: format!("project {project_id}"),
                    message: e.to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Build the sync-owned project fields from a raw tracker task.
pub fn project_patch_from_task(task: &RawTask, now: DateTime<Utc>) -> ProjectPatch {
    let status_raw = task
        .status
        .as_ref()
        .map(|s| s.status.clone())
        .unwrap_or_default();
    let normalized = status::normalize(&status_raw);

    let created_at = parse_epoch_ms(task.date_created.as_deref());
    let started_at = parse_epoch_ms(task.date_started.as_deref()).or(created_at);
    let idle_days = parse_epoch_ms(task.date_updated.as_deref())
        .map(|updated| now.signed_duration_since(updated).num_days().max(0));

    let mapped = map_custom_fields(&task.custom_fields);
    let external_store_id = task
        .custom_id
        .clone()
        .filter(|id| id.len() > 2)
        .or(mapped.store_id);

    ProjectPatch {
        external_id: task.id.clone(),
        name: task.name.clone(),
        external_store_id,
        status_raw,
        status: normalized,
        created_at,
        started_at,
        completed_at: parse_epoch_ms(task.date_done.as_deref()),
        closed_at: parse_epoch_ms(task.date_closed.as_deref()),
        operator: task.assignees.first().map(|a| a.username.clone()),
        idle_days,
        monthly_value: mapped.monthly_value,
        setup_value: mapped.setup_value,
        erp: mapped.erp,
        cnpj: mapped.cnpj,
        crm: mapped.crm,
    }
}

/// Build the sync-owned step fields from a raw tracker task.
pub fn step_patch_from_task(
    task: &RawTask,
    project_id: i64,
    stage: &str,
    now: DateTime<Utc>,
) -> StepPatch {
    let created_at = parse_epoch_ms(task.date_created.as_deref());
    let started_at = parse_epoch_ms(task.date_started.as_deref()).or(created_at);
    let ended_at =
        parse_epoch_ms(task.date_done.as_deref()).or(parse_epoch_ms(task.date_closed.as_deref()));

    let total_time_days = match (started_at, ended_at) {
        (Some(start), Some(end)) => {
            let seconds = end.signed_duration_since(start).num_seconds().max(0);
            (seconds as f64 / 86_400.0 * 100.0).round() / 100.0
        }
        _ => 0.0,
    };

    let idle_days = parse_epoch_ms(task.date_updated.as_deref())
        .map(|updated| now.signed_duration_since(updated).num_days().max(0));

    StepPatch {
        external_id: task.id.clone(),
        project_id,
        stage: stage.to_string(),
        name: task.name.clone(),
        status_raw: task
            .status
            .as_ref()
            .map(|s| s.status.clone())
            .unwrap_or_default(),
        created_at,
        started_at,
        ended_at,
        total_time_days,
        idle_days,
    }
}

/// A finished TREINAMENTO stage means the rollout is effectively delivered:
/// close the project with the stage's end instant unless a finish is
/// already recorded.
pub fn apply_training_completion_rule(
    conn: &Connection,
    project_id: i64,
) -> Result<bool, SyncError> {
    let steps = db::load_steps_for_project(conn, project_id)?;
    let training_end = steps
        .iter()
        .find(|step| step.stage == COMPLETION_STAGE)
        .and_then(|step| step.ended_at);

    let Some(ended_at) = training_end else {
        return Ok(false);
    };

    db::mark_project_done(conn, project_id, COMPLETION_STATUS_LABEL, ended_at)?;
    Ok(true)
}
