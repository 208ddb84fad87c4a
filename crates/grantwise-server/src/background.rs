//! Background tasks for the grantwise server.
//!
//! Includes:
//! - The knowledge-base update job, run on the configured schedule, on
//!   startup when enabled, and on demand from the admin API.
//! - A weekly maintenance job.
//!
//! Every update run is recorded in the `update_runs` table.

use chrono::{DateTime, Utc};
use grantwise_db::DbPool;
use grantwise_updater::{DataUpdater, Notifier, UpdateSchedule, UpdateStats};
use rusqlite::OptionalExtension;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tokio::time::sleep;

const UPDATE_JOB_ID: &str = "knowledge_base_update";
const CLEANUP_JOB_ID: &str = "cleanup_old_entries";

/// What started an update run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateTrigger {
    Scheduled,
    Startup,
    Manual,
}

impl UpdateTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateTrigger::Scheduled => "scheduled",
            UpdateTrigger::Startup => "startup",
            UpdateTrigger::Manual => "manual",
        }
    }
}

/// A scheduled job as reported by the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub next_run_time: Option<String>,
    pub trigger: String,
}

/// One recorded update run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateRun {
    pub trigger: String,
    pub started_at: String,
    pub finished_at: String,
    pub new: usize,
    pub updated: usize,
    pub errors: usize,
    pub failure: Option<String>,
}

/// Held for the duration of one update run.
pub struct UpdateClaim {
    _guard: OwnedMutexGuard<()>,
}

#[derive(Default)]
struct NextRuns {
    update: Option<DateTime<Utc>>,
    cleanup: Option<DateTime<Utc>>,
}

/// Owns the updater and runs it on a schedule.
///
/// Only one update runs at a time; a run requested while another is in
/// progress is skipped.
pub struct UpdateScheduler {
    updater: DataUpdater,
    notifier: Notifier,
    schedule: UpdateSchedule,
    schedule_setting: String,
    cleanup_schedule: UpdateSchedule,
    pool: DbPool,
    running: AtomicBool,
    update_lock: Arc<tokio::sync::Mutex<()>>,
    next_runs: Mutex<NextRuns>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl UpdateScheduler {
    pub fn new(updater: DataUpdater, notifier: Notifier, schedule_setting: &str, pool: DbPool) -> Self {
        let schedule = UpdateSchedule::parse(schedule_setting);
        tracing::info!(trigger = %schedule, "scheduled knowledge base updates");
        Self {
            updater,
            notifier,
            schedule,
            schedule_setting: schedule_setting.to_string(),
            cleanup_schedule: UpdateSchedule::weekly_cleanup(),
            pool,
            running: AtomicBool::new(false),
            update_lock: Arc::new(tokio::sync::Mutex::new(())),
            next_runs: Mutex::new(NextRuns::default()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// The schedule string as configured.
    pub fn schedule_setting(&self) -> &str {
        &self.schedule_setting
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_updating(&self) -> bool {
        self.update_lock.try_lock().is_err()
    }

    /// Reserves the single update slot. `None` while another update holds it.
    pub fn claim_update(&self) -> Option<UpdateClaim> {
        self.update_lock.clone().try_lock_owned().ok().map(|guard| UpdateClaim { _guard: guard })
    }

    /// Spawns the scheduled jobs, plus an immediate update when
    /// `update_on_startup` is set.
    pub fn start(self: &Arc<Self>, update_on_startup: bool) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("update scheduler already running");
            return;
        }

        let mut tasks = self.lock_tasks();
        tasks.push(tokio::spawn(self.clone().update_loop()));
        tasks.push(tokio::spawn(self.clone().cleanup_loop()));
        if update_on_startup {
            let scheduler = self.clone();
            tasks.push(tokio::spawn(async move {
                scheduler.run_update(UpdateTrigger::Startup).await;
            }));
        }
        tracing::info!("update scheduler started");
    }

    /// Aborts the scheduled jobs.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for task in self.lock_tasks().drain(..) {
            task.abort();
        }
        let mut next = self.lock_next_runs();
        next.update = None;
        next.cleanup = None;
        tracing::info!("update scheduler stopped");
    }

    pub fn jobs(&self) -> Vec<JobInfo> {
        let next = self.lock_next_runs();
        vec![
            JobInfo {
                id: UPDATE_JOB_ID,
                name: "Knowledge Base Update",
                next_run_time: next.update.map(|t| t.to_rfc3339()),
                trigger: self.schedule.to_string(),
            },
            JobInfo {
                id: CLEANUP_JOB_ID,
                name: "Cleanup Old Entries",
                next_run_time: next.cleanup.map(|t| t.to_rfc3339()),
                trigger: self.cleanup_schedule.to_string(),
            },
        ]
    }

    /// Runs one update unless another is in progress, in which case `None`
    /// is returned.
    ///
    /// Failures are logged, recorded and sent to the notification webhook;
    /// the error text is returned to the caller.
    pub async fn run_update(&self, trigger: UpdateTrigger) -> Option<Result<UpdateStats, String>> {
        let Some(claim) = self.claim_update() else {
            tracing::warn!(trigger = trigger.as_str(), "update already in progress, skipping");
            return None;
        };
        Some(self.run_claimed(claim, trigger).await)
    }

    /// Runs an update in a slot reserved by [`claim_update`](Self::claim_update).
    /// The slot is released when the run has been recorded.
    pub async fn run_claimed(
        &self,
        _claim: UpdateClaim,
        trigger: UpdateTrigger,
    ) -> Result<UpdateStats, String> {
        tracing::info!(trigger = trigger.as_str(), "starting knowledge base update");
        let started_at = Utc::now();
        let start = Instant::now();
        let result = self.updater.update_knowledge_base().await;
        let duration = start.elapsed();

        let outcome = match result {
            Ok(stats) => {
                tracing::info!(
                    duration_secs = duration.as_secs_f64(),
                    new = stats.new,
                    updated = stats.updated,
                    errors = stats.errors,
                    "update completed"
                );
                self.notifier.update_complete(&stats, duration).await;
                Ok(stats)
            }
            Err(e) => {
                tracing::error!(error = %e, "error during knowledge base update");
                let message = e.to_string();
                self.notifier.update_failed(&message).await;
                Err(message)
            }
        };

        self.record_run(UpdateRun {
            trigger: trigger.as_str().to_string(),
            started_at: started_at.to_rfc3339(),
            finished_at: Utc::now().to_rfc3339(),
            new: outcome.as_ref().map(|s| s.new).unwrap_or_default(),
            updated: outcome.as_ref().map(|s| s.updated).unwrap_or_default(),
            errors: outcome.as_ref().map(|s| s.errors).unwrap_or_default(),
            failure: outcome.as_ref().err().cloned(),
        })
        .await;

        outcome
    }

    /// The most recently started recorded run.
    pub async fn last_run(&self) -> Result<Option<UpdateRun>, String> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| e.to_string())?;
            conn.query_row(
                "SELECT trigger, started_at, finished_at, new_entries, updated_entries, errors, failure
                 FROM update_runs ORDER BY started_at DESC, id DESC LIMIT 1",
                [],
                |row| {
                    Ok(UpdateRun {
                        trigger: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        new: row.get::<_, i64>(3)? as usize,
                        updated: row.get::<_, i64>(4)? as usize,
                        errors: row.get::<_, i64>(5)? as usize,
                        failure: row.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| format!("task join error: {}", e))?
    }

    async fn record_run(&self, run: UpdateRun) {
        let pool = self.pool.clone();
        let res = tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| e.to_string())?;
            conn.execute(
                "INSERT INTO update_runs (trigger, started_at, finished_at, new_entries, updated_entries, errors, failure)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    run.trigger,
                    run.started_at,
                    run.finished_at,
                    run.new as i64,
                    run.updated as i64,
                    run.errors as i64,
                    run.failure,
                ],
            )
            .map_err(|e| e.to_string())
        })
        .await;

        match res {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::error!("failed to record update run: {}", e);
            }
            Err(e) => {
                tracing::error!("update run recording join error: {}", e);
            }
        }
    }

    async fn update_loop(self: Arc<Self>) {
        loop {
            let now = Utc::now();
            let Some(next) = self.schedule.next_after(now) else {
                tracing::warn!(trigger = %self.schedule, "update schedule has no future runs");
                return;
            };
            self.lock_next_runs().update = Some(next);
            sleep((next - now).to_std().unwrap_or_default()).await;

            self.run_update(UpdateTrigger::Scheduled).await;
        }
    }

    async fn cleanup_loop(self: Arc<Self>) {
        loop {
            let now = Utc::now();
            let Some(next) = self.cleanup_schedule.next_after(now) else {
                return;
            };
            self.lock_next_runs().cleanup = Some(next);
            sleep((next - now).to_std().unwrap_or_default()).await;

            // TODO: prune entries whose deadlines have all passed once
            // collected deadlines are parsed into dates.
            tracing::info!("running cleanup of expired entries");
            tracing::info!("cleanup completed");
        }
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_next_runs(&self) -> std::sync::MutexGuard<'_, NextRuns> {
        match self.next_runs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
