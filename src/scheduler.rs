// src/scheduler.rs
//! Interval scheduler for the pipeline tasks.
//!
//! Each registered task owns one recurring tokio timer and one run lock.
//! Timers fire one full interval after registration (never immediately) and
//! only start runs while the scheduler is started. Every run executes on its
//! own tokio task, so re-registering a timer, stopping the scheduler or
//! dropping an HTTP request never cuts a run short: its outcome always lands
//! in the run history.
//!
//! Overlap policy: a task that is already running rejects a manual run with
//! [`SchedulerError::AlreadyRunning`]; a timer tick that finds it running is
//! skipped. There is no mid-run cancellation.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::history::RunHistory;

/// Every job the pipeline knows how to run. Names only exist as strings at
/// the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Baltics,
    Euronext,
    Omx,
    Clean,
    Enrich,
    EnrichContent,
    EnrichTags,
    EnrichSummary,
}

impl TaskKind {
    pub const ALL: [TaskKind; 8] = [
        TaskKind::Baltics,
        TaskKind::Euronext,
        TaskKind::Omx,
        TaskKind::Clean,
        TaskKind::Enrich,
        TaskKind::EnrichContent,
        TaskKind::EnrichTags,
        TaskKind::EnrichSummary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Baltics => "baltics",
            TaskKind::Euronext => "euronext",
            TaskKind::Omx => "omx",
            TaskKind::Clean => "clean",
            TaskKind::Enrich => "enrich",
            TaskKind::EnrichContent => "enrich_content",
            TaskKind::EnrichTags => "enrich_tags",
            TaskKind::EnrichSummary => "enrich_summary",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| SchedulerError::UnknownTask(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    #[serde(rename = "Not run")]
    NotRun,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotRun => "Not run",
            TaskStatus::Running => "Running",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
        }
    }
}

/// What `/task_info` reports per task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskRecord {
    pub status: TaskStatus,
    pub frequency: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("unknown task: {0}")]
    UnknownTask(String),
    #[error("{0} task already running")]
    AlreadyRunning(TaskKind),
    #[error("invalid frequency: {0}")]
    InvalidFrequency(String),
}

/// A task body. The returned string is a one-line summary for the run history.
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(String),
    Failed(String),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

fn period_for(hours: u32) -> Duration {
    Duration::from_secs(u64::from(hours) * 3600)
}

struct Slot {
    job: Arc<dyn Job>,
    frequency_hours: u32,
    status: TaskStatus,
    run_lock: Arc<tokio::sync::Mutex<()>>,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    slots: Mutex<BTreeMap<TaskKind, Slot>>,
    started: AtomicBool,
    history: Arc<RunHistory>,
}

/// Proof that the caller holds a task's run lock.
struct RunPermit {
    kind: TaskKind,
    job: Arc<dyn Job>,
    _guard: OwnedMutexGuard<()>,
}

/// Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Created stopped, with an empty registry.
    pub fn new() -> Self {
        Self::with_history(Arc::new(RunHistory::new()))
    }

    pub fn with_history(history: Arc<RunHistory>) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(BTreeMap::new()),
                started: AtomicBool::new(false),
                history,
            }),
        }
    }

    fn slots(&self) -> MutexGuard<'_, BTreeMap<TaskKind, Slot>> {
        self.inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn history(&self) -> &Arc<RunHistory> {
        &self.inner.history
    }

    /// Register `job` under `kind` with a recurring timer every `hours`.
    /// An existing timer for the same task is aborted first; the task keeps
    /// its status and run lock, so an in-flight run still blocks overlap.
    /// Must be called from inside a tokio runtime.
    pub fn schedule(
        &self,
        kind: TaskKind,
        job: Arc<dyn Job>,
        hours: u32,
    ) -> Result<(), SchedulerError> {
        if hours == 0 {
            return Err(SchedulerError::InvalidFrequency(
                "frequency must be at least 1 hour".into(),
            ));
        }
        let mut slots = self.slots();
        self.install(&mut slots, kind, job, hours);
        Ok(())
    }

    /// Re-register an already scheduled task at a new interval.
    pub fn set_frequency(&self, kind: TaskKind, hours: u32) -> Result<(), SchedulerError> {
        if hours == 0 {
            return Err(SchedulerError::InvalidFrequency(
                "frequency must be at least 1 hour".into(),
            ));
        }
        let mut slots = self.slots();
        let job = slots
            .get(&kind)
            .map(|s| s.job.clone())
            .ok_or_else(|| SchedulerError::UnknownTask(kind.to_string()))?;
        self.install(&mut slots, kind, job, hours);
        Ok(())
    }

    fn install(
        &self,
        slots: &mut BTreeMap<TaskKind, Slot>,
        kind: TaskKind,
        job: Arc<dyn Job>,
        hours: u32,
    ) {
        let timer = Some(spawn_timer(Arc::downgrade(&self.inner), kind, period_for(hours)));
        match slots.get_mut(&kind) {
            Some(slot) => {
                if let Some(old) = slot.timer.take() {
                    old.abort();
                }
                slot.job = job;
                slot.frequency_hours = hours;
                slot.timer = timer;
            }
            None => {
                slots.insert(
                    kind,
                    Slot {
                        job,
                        frequency_hours: hours,
                        status: TaskStatus::NotRun,
                        run_lock: Arc::new(tokio::sync::Mutex::new(())),
                        timer,
                    },
                );
            }
        }
        info!(
            target: "scheduler",
            task = %kind,
            hours,
            "scheduled task to run every {hours} hours"
        );
    }

    /// Returns true when this call changed the state.
    pub fn start(&self) -> bool {
        let changed = !self.inner.started.swap(true, Ordering::SeqCst);
        if changed {
            info!(target: "scheduler", "Scheduler started");
        }
        changed
    }

    /// Stops timer ticks from starting runs. In-flight runs finish normally.
    pub fn stop(&self) -> bool {
        let changed = self.inner.started.swap(false, Ordering::SeqCst);
        if changed {
            info!(target: "scheduler", "Scheduler stopped");
        }
        changed
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    pub fn registered(&self) -> Vec<TaskKind> {
        self.slots().keys().copied().collect()
    }

    pub fn is_registered(&self, kind: TaskKind) -> bool {
        self.slots().contains_key(&kind)
    }

    pub fn record(&self, kind: TaskKind) -> Option<TaskRecord> {
        self.slots().get(&kind).map(|s| TaskRecord {
            status: s.status,
            frequency: s.frequency_hours,
        })
    }

    pub fn task_info(&self) -> BTreeMap<TaskKind, TaskRecord> {
        self.slots()
            .iter()
            .map(|(k, s)| {
                (
                    *k,
                    TaskRecord {
                        status: s.status,
                        frequency: s.frequency_hours,
                    },
                )
            })
            .collect()
    }

    fn set_status(&self, kind: TaskKind, status: TaskStatus) {
        if let Some(slot) = self.slots().get_mut(&kind) {
            slot.status = status;
        }
    }

    /// Take the run lock and flip the task to `Running`, without awaiting.
    fn acquire(&self, kind: TaskKind) -> Result<RunPermit, SchedulerError> {
        let mut slots = self.slots();
        let slot = slots
            .get_mut(&kind)
            .ok_or_else(|| SchedulerError::UnknownTask(kind.to_string()))?;
        let guard = slot
            .run_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| SchedulerError::AlreadyRunning(kind))?;
        slot.status = TaskStatus::Running;
        Ok(RunPermit {
            kind,
            job: slot.job.clone(),
            _guard: guard,
        })
    }

    /// Run a task now, independent of its timer, and wait for the outcome.
    /// Allowed while the scheduler is stopped.
    pub async fn run_now(&self, kind: TaskKind) -> Result<RunOutcome, SchedulerError> {
        let permit = self.acquire(kind)?;
        let handle = tokio::spawn(self.clone().finish(permit));
        Ok(handle
            .await
            .unwrap_or_else(|e| RunOutcome::Failed(format!("run bookkeeping aborted: {e}"))))
    }

    async fn finish(self, permit: RunPermit) -> RunOutcome {
        let kind = permit.kind;
        info!(target: "scheduler", task = %kind, "Running {kind} task");
        let t0 = std::time::Instant::now();

        let job = permit.job.clone();
        // A separate task turns a panicking job into a JoinError.
        let joined = tokio::spawn(async move { job.run().await }).await;

        let outcome = match joined {
            Ok(Ok(summary)) => RunOutcome::Completed(summary),
            Ok(Err(e)) => RunOutcome::Failed(format!("{e:#}")),
            Err(e) if e.is_panic() => RunOutcome::Failed("task panicked".to_string()),
            Err(e) => RunOutcome::Failed(format!("task aborted: {e}")),
        };

        let history = &self.inner.history;
        match &outcome {
            RunOutcome::Completed(summary) => {
                history.push_success(kind.as_str(), summary);
                self.set_status(kind, TaskStatus::Completed);
                info!(
                    target: "scheduler",
                    task = %kind,
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    summary = %summary,
                    "task completed"
                );
            }
            RunOutcome::Failed(detail) => {
                history.push_failure(kind.as_str(), detail);
                self.set_status(kind, TaskStatus::Failed);
                counter!("scheduler_run_failures_total", "task" => kind.as_str()).increment(1);
                error!(target: "scheduler", task = %kind, error = %detail, "task failed");
            }
        }
        counter!("scheduler_runs_total", "task" => kind.as_str()).increment(1);
        gauge!("scheduler_last_run_ts", "task" => kind.as_str())
            .set(chrono::Utc::now().timestamp() as f64);

        drop(permit);
        outcome
    }

    /// One timer tick: start a run in the background unless stopped or busy.
    fn on_tick(&self, kind: TaskKind) {
        if !self.is_started() {
            debug!(target: "scheduler", task = %kind, "scheduler stopped; tick ignored");
            return;
        }
        match self.acquire(kind) {
            Ok(permit) => {
                tokio::spawn(self.clone().finish(permit));
            }
            Err(SchedulerError::AlreadyRunning(_)) => {
                warn!(
                    target: "scheduler",
                    task = %kind,
                    "previous run still in progress; tick skipped"
                );
            }
            Err(e) => {
                warn!(target: "scheduler", task = %kind, error = %e, "tick could not start run");
            }
        }
    }
}

fn spawn_timer(inner: Weak<Inner>, kind: TaskKind, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            // Scheduler gone: nothing left to drive.
            let Some(inner) = inner.upgrade() else {
                break;
            };
            Scheduler { inner }.on_tick(kind);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl Job for Noop {
        async fn run(&self) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn task_names_round_trip() {
        for k in TaskKind::ALL {
            assert_eq!(k.as_str().parse::<TaskKind>().unwrap(), k);
        }
        assert_eq!(
            "nope".parse::<TaskKind>().unwrap_err(),
            SchedulerError::UnknownTask("nope".into())
        );
    }

    #[test]
    fn status_serializes_like_the_dashboard_expects() {
        let rec = TaskRecord {
            status: TaskStatus::NotRun,
            frequency: 6,
        };
        assert_eq!(
            serde_json::to_value(rec).unwrap(),
            serde_json::json!({"status": "Not run", "frequency": 6})
        );
    }

    #[tokio::test]
    async fn start_stop_are_idempotent() {
        let s = Scheduler::new();
        assert!(!s.is_started());
        assert!(s.start());
        assert!(!s.start());
        assert!(s.is_started());
        assert!(s.stop());
        assert!(!s.stop());
        assert!(!s.is_started());
    }

    #[tokio::test]
    async fn zero_frequency_is_rejected() {
        let s = Scheduler::new();
        assert!(matches!(
            s.schedule(TaskKind::Clean, Arc::new(Noop), 0),
            Err(SchedulerError::InvalidFrequency(_))
        ));
        assert!(s.registered().is_empty());
        s.schedule(TaskKind::Clean, Arc::new(Noop), 2).unwrap();
        assert!(matches!(
            s.set_frequency(TaskKind::Clean, 0),
            Err(SchedulerError::InvalidFrequency(_))
        ));
        assert_eq!(s.record(TaskKind::Clean).unwrap().frequency, 2);
    }

    #[tokio::test]
    async fn set_frequency_requires_registration() {
        let s = Scheduler::new();
        assert_eq!(
            s.set_frequency(TaskKind::Omx, 3),
            Err(SchedulerError::UnknownTask("omx".into()))
        );
    }
}
