//! Task scheduler
//!
//! Durable scheduling of named, parameterized deferred actions. Tasks are
//! persisted through the store so they survive a process restart: on startup
//! every persisted task is reloaded, overdue ones run immediately and future
//! ones are re-armed on an in-process timer. A task can also be forced to run
//! early, which cancels its timer and executes its preset exactly once.

use crate::store::{Store, StoreError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::task::AbortHandle;
use tracing::{error, info};
use uuid::Uuid;

/// Errors that can occur during scheduler operations
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The named preset is not registered. Losing a scheduled action over a
    /// missing preset is a configuration error, never silently skipped.
    #[error("Task preset '{0}' does not exist")]
    UnknownPreset(String),

    /// No persisted task matches the requested name and arguments
    #[error("No scheduled task matching '{0}' was found")]
    TaskNotFound(String),

    /// Persistence error
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// A persisted deferred action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    /// Unique ID of this task
    pub id: String,
    /// Name of the preset to invoke
    pub name: String,
    /// Arguments passed to the preset when the task runs
    pub arguments: Vec<String>,
    /// When the task is due
    pub run_at: DateTime<Utc>,
    /// When the record was created
    pub created_at: DateTime<Utc>,
}

impl ScheduledTask {
    /// Create a new task record
    pub fn new(name: impl Into<String>, arguments: Vec<String>, run_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            arguments,
            run_at,
            created_at: Utc::now(),
        }
    }
}

/// Execution state of a task known to this process. The scheduler is the
/// single writer: whichever of the natural fire and a manual "run now" swaps
/// `Scheduled` to `Executing` first runs the preset; the other observes the
/// tag and aborts instead of double-invoking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Scheduled,
    Executing,
    Done,
}

/// A named asynchronous function the scheduler is allowed to invoke
pub type TaskPreset = Arc<
    dyn Fn(Vec<String>) -> Pin<Box<dyn Future<Output = Result<(), crate::Error>> + Send>>
        + Send
        + Sync,
>;

/// Build a [`TaskPreset`] from an async closure
pub fn preset<F, Fut>(f: F) -> TaskPreset
where
    F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), crate::Error>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}

struct SchedulerInner {
    store: Arc<Store>,
    presets: HashMap<String, TaskPreset>,
    states: DashMap<String, TaskState>,
    timers: DashMap<String, AbortHandle>,
    loaded: AtomicBool,
}

/// Durable scheduler for deferred actions
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Create a new scheduler with the given preset registry
    #[must_use]
    pub fn new(store: Arc<Store>, presets: Vec<(&str, TaskPreset)>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                presets: presets
                    .into_iter()
                    .map(|(name, preset)| (name.to_string(), preset))
                    .collect(),
                states: DashMap::new(),
                timers: DashMap::new(),
                loaded: AtomicBool::new(false),
            }),
        }
    }

    /// Load all persisted tasks and schedule them for execution. Overdue
    /// tasks run immediately. Idempotent: a second call is a no-op.
    ///
    /// # Errors
    /// Returns [`SchedulerError::UnknownPreset`] if any persisted task names
    /// a preset missing from the registry.
    pub async fn load_tasks(&self) -> SchedulerResult<()> {
        if self.inner.loaded.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let tasks = self.inner.store.all_tasks();
        info!(task_count = tasks.len(), "Loading persisted tasks");

        for task in tasks {
            if !self.inner.presets.contains_key(&task.name) {
                return Err(SchedulerError::UnknownPreset(task.name));
            }

            self.inner
                .states
                .insert(task.id.clone(), TaskState::Scheduled);

            if task.run_at <= Utc::now() {
                self.run_task(task).await?;
            } else {
                self.arm_timer(task);
            }
        }

        Ok(())
    }

    /// Schedule a new task to run `delay_secs` from now.
    ///
    /// # Errors
    /// Returns [`SchedulerError::UnknownPreset`] if the preset name is not
    /// registered.
    pub async fn new_task(
        &self,
        delay_secs: u64,
        name: &str,
        arguments: Vec<String>,
    ) -> SchedulerResult<String> {
        if !self.inner.presets.contains_key(name) {
            return Err(SchedulerError::UnknownPreset(name.to_string()));
        }

        let run_at = Utc::now() + chrono::Duration::seconds(delay_secs as i64);
        let task = ScheduledTask::new(name, arguments, run_at);
        let task_id = task.id.clone();

        self.inner.store.save_task(task.clone()).await?;
        self.inner
            .states
            .insert(task_id.clone(), TaskState::Scheduled);
        self.arm_timer(task);

        info!(
            task_id = %task_id,
            preset = %name,
            run_at = %run_at,
            "Task scheduled"
        );

        Ok(task_id)
    }

    /// Find a persisted task by preset name and arguments and execute it
    /// immediately, cancelling its pending timer.
    ///
    /// # Errors
    /// Returns [`SchedulerError::TaskNotFound`] if no matching task exists,
    /// for example because it already ran and was deleted.
    pub async fn run_task_now(&self, name: &str, arguments: Vec<String>) -> SchedulerResult<()> {
        let task = self
            .inner
            .store
            .find_task(name, &arguments)
            .ok_or_else(|| SchedulerError::TaskNotFound(name.to_string()))?;

        if let Some((_, handle)) = self.inner.timers.remove(&task.id) {
            handle.abort();
        }

        info!(task_id = %task.id, preset = %name, "Task forced to run now");
        self.run_task(task).await
    }

    /// Invoke a task's preset and delete its persisted record. A preset
    /// failure is logged and the record still removed, so one bad task does
    /// not wedge the scheduler.
    async fn run_task(&self, task: ScheduledTask) -> SchedulerResult<()> {
        if !self.claim(&task.id) {
            // Lost the race with the other execution path; it runs the preset.
            return Ok(());
        }

        let preset = self
            .inner
            .presets
            .get(&task.name)
            .ok_or_else(|| SchedulerError::UnknownPreset(task.name.clone()))?;

        let result = preset(task.arguments.clone()).await;

        self.inner.store.delete_task(&task.id).await?;
        self.inner.states.insert(task.id.clone(), TaskState::Done);
        self.inner.timers.remove(&task.id);

        match result {
            Ok(()) => info!(
                task_id = %task.id,
                preset = %task.name,
                "Task executed"
            ),
            Err(e) => error!(
                task_id = %task.id,
                preset = %task.name,
                error = %e,
                "Task preset failed"
            ),
        }

        Ok(())
    }

    /// Transition a task from Scheduled to Executing. Returns false if the
    /// other execution path already claimed it. A task with no state entry
    /// (persisted by hand, or from before a restart) is claimable.
    fn claim(&self, task_id: &str) -> bool {
        use dashmap::mapref::entry::Entry;

        match self.inner.states.entry(task_id.to_string()) {
            Entry::Occupied(mut entry) => match entry.get() {
                TaskState::Scheduled => {
                    entry.insert(TaskState::Executing);
                    true
                }
                TaskState::Executing | TaskState::Done => false,
            },
            Entry::Vacant(entry) => {
                entry.insert(TaskState::Executing);
                true
            }
        }
    }

    /// Arm an in-process timer that fires when the task is due
    fn arm_timer(&self, task: ScheduledTask) {
        let delay = (task.run_at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        let task_id = task.id.clone();
        let scheduler = self.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = scheduler.run_task(task).await {
                error!(error = %e, "Scheduled task failed to run");
            }
        });

        self.inner.timers.insert(task_id, handle.abort_handle());
    }
}
