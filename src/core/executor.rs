//! Execution contexts: the capability that actually runs a task's implementation.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::definition::{Implementation, TaskDefinition};
use super::error::{AppResult, SchedulerError};
use super::task::Task;

/// Abstraction for running a claimed task and producing its output.
///
/// The runner calls this on a dedicated tokio task, so a panic inside `run`
/// surfaces as an execution error instead of unwinding into the dispatcher.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_task_scheduler::core::{AppResult, ExecutionContext, Task, TaskDefinition};
///
/// struct EchoContext;
///
/// #[async_trait]
/// impl ExecutionContext for EchoContext {
///     async fn run(&self, task: Task, _definition: Arc<TaskDefinition>) -> AppResult<serde_json::Value> {
///         Ok(task.input)
///     }
/// }
/// ```
#[async_trait]
pub trait ExecutionContext: Send + Sync + 'static {
    /// Run `task` according to `definition` and return its output.
    ///
    /// Failures must be returned as errors, never as a silent default value.
    async fn run(&self, task: Task, definition: Arc<TaskDefinition>) -> AppResult<Value>;
}

/// Runs function implementations in the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessExecutionContext;

#[async_trait]
impl ExecutionContext for InProcessExecutionContext {
    async fn run(&self, task: Task, definition: Arc<TaskDefinition>) -> AppResult<Value> {
        match definition.implementation() {
            Implementation::Function(f) => f(task.input).await,
            Implementation::Locator(path) => Err(anyhow!(
                "the implementation of \"{}\" tasks ({}) does not point to a function",
                definition.name(),
                path.display()
            )),
        }
    }
}

/// Registry of execution contexts (name -> capability).
pub struct ExecutionContextRegistry {
    contexts: RwLock<HashMap<String, Arc<dyn ExecutionContext>>>,
}

impl ExecutionContextRegistry {
    /// Name under which the in-process context is registered by default.
    pub const MAIN: &'static str = "main";

    /// Create a registry holding only the in-process context under `"main"`.
    #[must_use]
    pub fn new() -> Self {
        let mut contexts: HashMap<String, Arc<dyn ExecutionContext>> = HashMap::new();
        contexts.insert(Self::MAIN.to_owned(), Arc::new(InProcessExecutionContext));
        Self {
            contexts: RwLock::new(contexts),
        }
    }

    /// Create a registry with no context at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
        }
    }

    /// Register a context under `name`.
    ///
    /// # Errors
    ///
    /// Returns a setup error for an empty name and
    /// [`SchedulerError::DuplicateExecutionContext`] if the name is taken.
    pub fn register(
        &self,
        name: impl Into<String>,
        context: Arc<dyn ExecutionContext>,
    ) -> Result<(), SchedulerError> {
        let name = name.into();
        if name.is_empty() {
            return Err(SchedulerError::Setup(
                "execution context name must be a non-empty string".into(),
            ));
        }
        let mut contexts = self.contexts.write();
        if contexts.contains_key(&name) {
            return Err(SchedulerError::DuplicateExecutionContext(name));
        }
        tracing::debug!("registered execution context {}", name);
        contexts.insert(name, context);
        Ok(())
    }

    /// Look a context up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ExecutionContext>> {
        self.contexts.read().get(name).cloned()
    }

    /// Whether a context is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.contexts.read().contains_key(name)
    }
}

impl Default for ExecutionContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}
