//! Registration API surface.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::core::{
    ExecutionContext, ExecutionContextRegistry, NewTask, SchedulerError, TaskDefinition,
    TaskDispatcher, TaskId, TaskOptions, TaskRegistry, TrackerSnapshot,
};

/// Front door of the scheduler: define task types, schedule tasks, start and stop polling.
///
/// Build one with [`SchedulerBuilder`](crate::builders::SchedulerBuilder).
/// Dropping the scheduler stops polling; tasks already running finish on their own.
pub struct Scheduler {
    config: SchedulerConfig,
    registry: Arc<TaskRegistry>,
    contexts: Arc<ExecutionContextRegistry>,
    dispatcher: TaskDispatcher,
}

impl Scheduler {
    pub(crate) fn from_parts(
        config: SchedulerConfig,
        registry: Arc<TaskRegistry>,
        contexts: Arc<ExecutionContextRegistry>,
        dispatcher: TaskDispatcher,
    ) -> Self {
        Self {
            config,
            registry,
            contexts,
            dispatcher,
        }
    }

    /// Register an execution context for running tasks.
    ///
    /// The in-process context is registered as `"main"` by default.
    ///
    /// # Errors
    ///
    /// Returns a setup error for an empty or already registered name.
    pub fn register_execution_context(
        &self,
        name: impl Into<String>,
        context: Arc<dyn ExecutionContext>,
    ) -> Result<(), SchedulerError> {
        self.contexts.register(name, context)
    }

    /// Define a task type.
    ///
    /// # Errors
    ///
    /// Returns a setup error for invalid options, a duplicate name, or an
    /// execution context that is not registered.
    pub fn define_task(
        &self,
        name: impl Into<String>,
        options: TaskOptions,
    ) -> Result<(), SchedulerError> {
        let definition = TaskDefinition::new(name, options, &self.config.definition_defaults())?;
        if !self.contexts.contains(definition.execution_context()) {
            return Err(SchedulerError::UnknownExecutionContext {
                task_name: definition.name().to_owned(),
                context: definition.execution_context().to_owned(),
            });
        }
        let definition = self.registry.insert(definition)?;
        self.dispatcher.add_task_definition(&definition);
        tracing::info!(
            "defined task {} (context {}, cap {:?})",
            definition.name(),
            definition.execution_context(),
            definition.max_concurrent_tasks()
        );
        Ok(())
    }

    /// Schedule a task. Resolves once the store holds it.
    ///
    /// # Errors
    ///
    /// Returns a setup error for an empty task name, or the store access error
    /// already reported to the error sink.
    pub async fn schedule_task(&self, task: NewTask) -> Result<TaskId, SchedulerError> {
        if task.name.is_empty() {
            return Err(SchedulerError::Setup("task name must be a non-empty string".into()));
        }
        self.dispatcher.schedule_task(task).await
    }

    /// Start polling. Idempotent.
    pub fn start(&self) {
        self.dispatcher.start();
    }

    /// Stop polling. Idempotent; running tasks are not interrupted.
    pub fn stop(&self) {
        self.dispatcher.stop();
    }

    /// Whether the scheduler is polling.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.dispatcher.is_running()
    }

    /// Admission-control counters.
    #[must_use]
    pub fn stats(&self) -> TrackerSnapshot {
        self.dispatcher.snapshot()
    }

    /// Instance id of the underlying dispatcher.
    #[must_use]
    pub fn instance_id(&self) -> Uuid {
        self.dispatcher.id()
    }

    /// Configuration the scheduler was built with.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Registered task definition by name.
    #[must_use]
    pub fn task_definition(&self, name: &str) -> Option<Arc<TaskDefinition>> {
        self.registry.get(name)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.dispatcher.stop();
    }
}
