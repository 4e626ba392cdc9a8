//! The poll loop.
//!
//! A dispatcher claims due tasks from the store while admission control
//! allows, hands them to the [`TaskRunner`], and decides when to poll next:
//! immediately while capacity remains, when a cap is released, or on a
//! one-shot timer bounded by the configured ceiling.
//!
//! Polling is single-flight. Triggers that arrive while a poll is in flight are
//! coalesced into one follow-up poll.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use uuid::Uuid;

use super::definition::{TaskDefinition, TaskRegistry};
use super::error::SchedulerError;
use super::error_sink::{ErrorSink, GuardedErrorSink};
use super::executor::ExecutionContextRegistry;
use super::monitored_store::MonitoredStore;
use super::runner::TaskRunner;
use super::store::TaskStore;
use super::task::{NewTask, Task, TaskId};
use super::tracker::{DispatchTracker, TrackerSnapshot};
use crate::config::SchedulerConfig;
use crate::runtime::TokioSpawner;
use crate::util::clock::Clock;

/// Collaborators a dispatcher is built from.
pub struct DispatcherParts {
    /// Backing store.
    pub store: Arc<dyn TaskStore>,
    /// Task definitions, shared with the registration API.
    pub registry: Arc<TaskRegistry>,
    /// Execution contexts, shared with the registration API.
    pub contexts: Arc<ExecutionContextRegistry>,
    /// Receiver of every handled error.
    pub sink: Arc<dyn ErrorSink>,
    /// Time source for deadlines and poll hints.
    pub clock: Arc<dyn Clock>,
    /// Runtime that hosts the poll loop and the runners.
    pub spawner: TokioSpawner,
}

struct DispatcherInner {
    id: Uuid,
    running: AtomicBool,
    polling: AtomicBool,
    repoll_requested: AtomicBool,
    next_poll: Mutex<Option<AbortHandle>>,
    poll_at_least_every: Duration,
    tracker: DispatchTracker,
    registry: Arc<TaskRegistry>,
    runner: TaskRunner,
    store: MonitoredStore,
    sink: GuardedErrorSink,
    clock: Arc<dyn Clock>,
    spawner: TokioSpawner,
}

/// Orchestrates claiming and dispatching of tasks for one process.
#[derive(Clone)]
pub struct TaskDispatcher {
    inner: Arc<DispatcherInner>,
}

impl TaskDispatcher {
    /// Create a stopped dispatcher.
    #[must_use]
    pub fn new(config: &SchedulerConfig, parts: DispatcherParts) -> Self {
        let id = Uuid::new_v4();
        let sink = GuardedErrorSink::new(parts.sink);
        let store = MonitoredStore::new(parts.store, sink.clone());
        let runner = TaskRunner::new(
            id,
            store.clone(),
            parts.contexts,
            sink.clone(),
            Arc::clone(&parts.clock),
            parts.spawner.clone(),
        );

        let tracker = DispatchTracker::new(config.max_concurrent_tasks);
        for name in parts.registry.names() {
            if let Some(definition) = parts.registry.get(&name) {
                tracker.add_task_definition(&name, definition.max_concurrent_tasks());
            }
        }

        tracing::debug!(dispatcher = %id, "dispatcher created");
        Self {
            inner: Arc::new(DispatcherInner {
                id,
                running: AtomicBool::new(false),
                polling: AtomicBool::new(false),
                repoll_requested: AtomicBool::new(false),
                next_poll: Mutex::new(None),
                poll_at_least_every: Duration::from_secs(config.poll_at_least_every_secs),
                tracker,
                registry: parts.registry,
                runner,
                store,
                sink,
                clock: parts.clock,
                spawner: parts.spawner,
            }),
        }
    }

    /// Instance id attached to this dispatcher's log events.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Make a newly registered definition known to admission control.
    pub fn add_task_definition(&self, definition: &TaskDefinition) {
        self.inner
            .tracker
            .add_task_definition(definition.name(), definition.max_concurrent_tasks());
    }

    /// Start polling. Idempotent.
    pub fn start(&self) {
        if !self.inner.running.swap(true, Ordering::AcqRel) {
            tracing::info!(dispatcher = %self.inner.id, "dispatcher started");
            self.inner.trigger_poll();
        }
    }

    /// Stop claiming new tasks. Idempotent; running tasks are not interrupted.
    pub fn stop(&self) {
        if self.inner.running.swap(false, Ordering::AcqRel) {
            self.inner.cancel_timer();
            tracing::info!(dispatcher = %self.inner.id, "dispatcher stopped");
        }
    }

    /// Whether the dispatcher is polling.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Persist a new task and nudge the poll loop.
    ///
    /// # Errors
    ///
    /// Returns the reported [`SchedulerError::StoreAccess`] if the store fails.
    pub async fn schedule_task(&self, task: NewTask) -> Result<TaskId, SchedulerError> {
        let name = task.name.clone();
        let id = self.inner.store.store_new_task(task).await?;
        tracing::debug!(dispatcher = %self.inner.id, "scheduled {} task {}", name, id);
        self.inner.trigger_poll();
        Ok(id)
    }

    /// Ask for a poll as soon as possible. Coalesced with any poll in flight.
    pub fn trigger_poll(&self) {
        self.inner.trigger_poll();
    }

    /// Current admission-control counters.
    #[must_use]
    pub fn snapshot(&self) -> TrackerSnapshot {
        self.inner.tracker.snapshot()
    }
}

/// Clears the single-flight flag when dropped, also when a poll unwinds.
struct PollingGuard<'a>(&'a AtomicBool);

impl Drop for PollingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DispatcherInner {
    fn trigger_poll(self: &Arc<Self>) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        if self.polling.swap(true, Ordering::AcqRel) {
            self.repoll_requested.store(true, Ordering::Release);
            return;
        }
        let this = Arc::clone(self);
        self.spawner.spawn(async move { this.poll_loop().await });
    }

    /// Runs while holding the single-flight guard.
    async fn poll_loop(self: Arc<Self>) {
        loop {
            self.repoll_requested.store(false, Ordering::Release);
            let again = {
                let _guard = PollingGuard(&self.polling);
                self.poll_once().await
            };

            let requested = self.repoll_requested.swap(false, Ordering::AcqRel);
            if !(again || requested) || !self.running.load(Ordering::Acquire) {
                break;
            }
            if self.polling.swap(true, Ordering::AcqRel) {
                break;
            }
        }
    }

    /// One claim attempt. Returns whether another attempt should follow at once.
    async fn poll_once(self: &Arc<Self>) -> bool {
        self.cancel_timer();
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        if self.tracker.reached_max_capacity() {
            tracing::debug!(dispatcher = %self.id, "at global capacity, waiting for a task to finish");
            return false;
        }

        let excluded = self.tracker.task_names_at_capacity();
        let claimed = match self.store.get_next_pending_task(&excluded).await {
            Ok(claimed) => claimed,
            Err(_) => {
                if self.running.load(Ordering::Acquire) {
                    self.arm_timer(self.poll_at_least_every);
                }
                return false;
            }
        };

        let Some(task) = claimed else {
            self.arm_next_poll(&excluded).await;
            return false;
        };

        if !self.running.load(Ordering::Acquire) {
            tracing::info!(
                dispatcher = %self.id,
                "stopped while claiming, returning task {} to the schedule",
                task.id
            );
            let _ = self.store.cancel_task_processing(&task, false, None).await;
            return false;
        }

        let Some(definition) = self.registry.get(&task.name) else {
            let error = SchedulerError::MissingDefinition {
                task_name: task.name.clone(),
                task_id: task.id,
            };
            self.sink.report(&error);
            let message = error.to_string();
            let _ = self
                .store
                .cancel_task_processing(&task, true, Some(&message))
                .await;
            return !self.tracker.reached_max_capacity();
        };

        if self.tracker.reached_max_capacity_for_task(&task.name) {
            tracing::debug!(
                dispatcher = %self.id,
                "task type {} is at capacity, re-yielding task {}",
                task.name,
                task.id
            );
            let _ = self.store.cancel_task_processing(&task, false, None).await;
            self.arm_timer(self.poll_at_least_every);
            return false;
        }

        self.tracker.track_task_started(&task.name);
        self.dispatch(task, definition);
        !self.tracker.reached_max_capacity()
    }

    fn dispatch(self: &Arc<Self>, task: Task, definition: Arc<TaskDefinition>) {
        tracing::info!(
            dispatcher = %self.id,
            "dispatching {} task {}",
            task.name,
            task.id
        );
        let this = Arc::clone(self);
        self.spawner.spawn(async move {
            let name = task.name.clone();
            let task_id = task.id;
            let runner = this.runner.clone();
            let run = this
                .spawner
                .spawn(async move { runner.run(task, definition).await });
            if let Err(e) = run.await {
                tracing::error!(dispatcher = %this.id, "runner for task {} aborted: {}", task_id, e);
            }

            let release = this.tracker.track_task_stopped(&name);
            if release.any() {
                tracing::debug!(
                    dispatcher = %this.id,
                    "capacity released by {} task {}, polling again",
                    name,
                    task_id
                );
                this.trigger_poll();
            }
        });
    }

    async fn arm_next_poll(self: &Arc<Self>, excluded: &[String]) {
        let ceiling = self.poll_at_least_every;
        let wait = match self.store.get_next_polling_time(excluded).await {
            Ok(Some(at)) => {
                let delta = at.saturating_sub(self.clock.now_secs());
                Duration::from_secs(u64::try_from(delta).unwrap_or(0)).min(ceiling)
            }
            Ok(None) | Err(_) => ceiling,
        };
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        tracing::debug!(dispatcher = %self.id, "next poll in {:?}", wait);
        self.arm_timer(wait);
    }

    fn arm_timer(self: &Arc<Self>, wait: Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let timer = self.spawner.spawn(async move {
            tokio::time::sleep(wait).await;
            if let Some(inner) = weak.upgrade() {
                inner.trigger_poll();
            }
        });
        if let Some(previous) = self.next_poll.lock().replace(timer.abort_handle()) {
            previous.abort();
        }
    }

    fn cancel_timer(&self) {
        if let Some(timer) = self.next_poll.lock().take() {
            timer.abort();
        }
    }
}
