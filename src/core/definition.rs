//! Task type descriptors and the registry that holds them.
//!
//! A [`TaskDefinition`] is built once from [`TaskOptions`], validated, and never
//! changed afterwards. The dispatcher looks definitions up by name for every
//! claimed task.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;

use super::error::{AppResult, SchedulerError};
use super::task::{Epoch, RetainUntil};

/// Future returned by an in-process task implementation.
pub type TaskFuture = Pin<Box<dyn Future<Output = AppResult<Value>> + Send>>;

/// In-process task implementation: input in, output out.
pub type TaskFn = Arc<dyn Fn(Value) -> TaskFuture + Send + Sync>;

/// Reference to the code that runs a task.
#[derive(Clone)]
pub enum Implementation {
    /// A function executed in-process.
    Function(TaskFn),
    /// An absolute code locator, interpreted by the execution context.
    Locator(PathBuf),
}

impl Implementation {
    /// Wrap an async closure.
    pub fn function<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<Value>> + Send + 'static,
    {
        Self::Function(Arc::new(move |input| Box::pin(f(input))))
    }

    /// Wrap a synchronous closure.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Value) -> AppResult<Value> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::Function(Arc::new(move |input| {
            let f = Arc::clone(&f);
            Box::pin(async move { f(input) })
        }))
    }

    /// Point at code by absolute path.
    pub fn locator(path: impl Into<PathBuf>) -> Self {
        Self::Locator(path.into())
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(_) => f.write_str("Implementation::Function(..)"),
            Self::Locator(path) => f.debug_tuple("Implementation::Locator").field(path).finish(),
        }
    }
}

/// Black-box validator for task input or output.
pub trait SchemaValidator: Send + Sync {
    /// Validate `data`, returning one message per violation on failure.
    ///
    /// # Errors
    ///
    /// Returns the list of violations when `data` does not conform.
    fn validate(&self, data: &Value) -> Result<(), Vec<String>>;
}

impl<F> SchemaValidator for F
where
    F: Fn(&Value) -> Result<(), Vec<String>> + Send + Sync,
{
    fn validate(&self, data: &Value) -> Result<(), Vec<String>> {
        self(data)
    }
}

/// What happens to a task record after it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retention {
    /// Delete the record immediately.
    #[default]
    Discard,
    /// Keep the record.
    Keep {
        /// How long to keep it; `None` keeps it forever.
        period: Option<Duration>,
        /// Whether to store the task's output in the record.
        store_output: bool,
    },
}

impl Retention {
    /// Keep forever without output.
    #[must_use]
    pub const fn forever() -> Self {
        Self::Keep {
            period: None,
            store_output: false,
        }
    }

    /// Keep for `period`, optionally with output.
    #[must_use]
    pub const fn for_period(period: Duration, store_output: bool) -> Self {
        Self::Keep {
            period: Some(period),
            store_output,
        }
    }
}

/// Options passed to `define_task`. Unset values take configured defaults.
#[derive(Clone)]
pub struct TaskOptions {
    implementation: Implementation,
    execution_context: Option<String>,
    completes_within: Option<Duration>,
    retention: Retention,
    max_concurrent_tasks: Option<u32>,
    input_schema: Option<Arc<dyn SchemaValidator>>,
    output_schema: Option<Arc<dyn SchemaValidator>>,
}

impl TaskOptions {
    /// Start from an implementation with every other option defaulted.
    #[must_use]
    pub fn new(implementation: Implementation) -> Self {
        Self {
            implementation,
            execution_context: None,
            completes_within: None,
            retention: Retention::Discard,
            max_concurrent_tasks: None,
            input_schema: None,
            output_schema: None,
        }
    }

    /// Run tasks of this type in the named execution context.
    #[must_use]
    pub fn with_execution_context(mut self, context: impl Into<String>) -> Self {
        self.execution_context = Some(context.into());
        self
    }

    /// Expected upper bound for one execution.
    #[must_use]
    pub const fn with_completes_within(mut self, completes_within: Duration) -> Self {
        self.completes_within = Some(completes_within);
        self
    }

    /// Retention policy for finished records.
    #[must_use]
    pub const fn with_retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }

    /// Cap concurrent executions of this task type.
    #[must_use]
    pub const fn with_max_concurrent_tasks(mut self, max: u32) -> Self {
        self.max_concurrent_tasks = Some(max);
        self
    }

    /// Validate inputs before execution.
    #[must_use]
    pub fn with_input_schema(mut self, schema: impl SchemaValidator + 'static) -> Self {
        self.input_schema = Some(Arc::new(schema));
        self
    }

    /// Validate outputs after execution.
    #[must_use]
    pub fn with_output_schema(mut self, schema: impl SchemaValidator + 'static) -> Self {
        self.output_schema = Some(Arc::new(schema));
        self
    }
}

impl fmt::Debug for TaskOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOptions")
            .field("implementation", &self.implementation)
            .field("execution_context", &self.execution_context)
            .field("completes_within", &self.completes_within)
            .field("retention", &self.retention)
            .field("max_concurrent_tasks", &self.max_concurrent_tasks)
            .field("input_schema", &self.input_schema.is_some())
            .field("output_schema", &self.output_schema.is_some())
            .finish()
    }
}

/// Defaults applied to options left unset.
#[derive(Debug, Clone)]
pub struct DefinitionDefaults {
    /// Execution context used when none is given.
    pub execution_context: String,
    /// Deadline used when none is given.
    pub completes_within: Duration,
}

impl Default for DefinitionDefaults {
    fn default() -> Self {
        Self {
            execution_context: "main".into(),
            completes_within: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Immutable, validated descriptor of a task type.
pub struct TaskDefinition {
    name: String,
    implementation: Implementation,
    execution_context: String,
    completes_within: Duration,
    retention: Retention,
    max_concurrent_tasks: Option<u32>,
    input_schema: Option<Arc<dyn SchemaValidator>>,
    output_schema: Option<Arc<dyn SchemaValidator>>,
}

impl TaskDefinition {
    /// Normalize and validate options into a definition.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Setup`] for an empty name, a zero deadline, a
    /// zero retention period, a zero per-type cap, or a relative code locator.
    pub fn new(
        name: impl Into<String>,
        options: TaskOptions,
        defaults: &DefinitionDefaults,
    ) -> Result<Self, SchedulerError> {
        let name = name.into();
        if name.is_empty() {
            return Err(SchedulerError::Setup("task name must be a non-empty string".into()));
        }

        if let Implementation::Locator(path) = &options.implementation {
            if !path.is_absolute() {
                return Err(SchedulerError::Setup(format!(
                    "the implementation locator for task \"{name}\" must be an absolute path, got {}",
                    path.display()
                )));
            }
        }

        let execution_context = options
            .execution_context
            .unwrap_or_else(|| defaults.execution_context.clone());
        if execution_context.is_empty() {
            return Err(SchedulerError::Setup(format!(
                "the execution context for task \"{name}\" must be a non-empty string"
            )));
        }

        let completes_within = options.completes_within.unwrap_or(defaults.completes_within);
        if completes_within.is_zero() {
            return Err(SchedulerError::Setup(format!(
                "completes_within for task \"{name}\" must be positive"
            )));
        }

        if let Retention::Keep {
            period: Some(period),
            ..
        } = options.retention
        {
            if period.is_zero() {
                return Err(SchedulerError::Setup(format!(
                    "the retention period for task \"{name}\" must be positive"
                )));
            }
        }

        if options.max_concurrent_tasks == Some(0) {
            return Err(SchedulerError::Setup(format!(
                "max_concurrent_tasks for task \"{name}\" must be at least 1"
            )));
        }

        Ok(Self {
            name,
            implementation: options.implementation,
            execution_context,
            completes_within,
            retention: options.retention,
            max_concurrent_tasks: options.max_concurrent_tasks,
            input_schema: options.input_schema,
            output_schema: options.output_schema,
        })
    }

    /// Task type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Code reference handed to the execution context.
    #[must_use]
    pub const fn implementation(&self) -> &Implementation {
        &self.implementation
    }

    /// Name of the execution context that runs this type.
    #[must_use]
    pub fn execution_context(&self) -> &str {
        &self.execution_context
    }

    /// Declared upper bound for one execution.
    #[must_use]
    pub const fn completes_within(&self) -> Duration {
        self.completes_within
    }

    /// Per-type admission cap; `None` means unbounded.
    #[must_use]
    pub const fn max_concurrent_tasks(&self) -> Option<u32> {
        self.max_concurrent_tasks
    }

    /// Retention policy.
    #[must_use]
    pub const fn retention(&self) -> Retention {
        self.retention
    }

    /// Claim deadline for an execution starting at `now`, rounded up to whole seconds.
    #[must_use]
    pub fn processing_until(&self, now: Epoch) -> Epoch {
        let secs = self.completes_within.as_secs()
            + u64::from(self.completes_within.subsec_nanos() > 0);
        now.saturating_add(Epoch::try_from(secs).unwrap_or(Epoch::MAX))
    }

    /// Check input against the input schema, if any.
    ///
    /// # Errors
    ///
    /// Returns the validator's messages on mismatch.
    pub fn validate_input(&self, input: &Value) -> Result<(), Vec<String>> {
        self.input_schema
            .as_ref()
            .map_or(Ok(()), |schema| schema.validate(input))
    }

    /// Check output against the output schema, if any.
    ///
    /// # Errors
    ///
    /// Returns the validator's messages on mismatch.
    pub fn validate_output(&self, output: &Value) -> Result<(), Vec<String>> {
        self.output_schema
            .as_ref()
            .map_or(Ok(()), |schema| schema.validate(output))
    }

    /// Whether the record survives finishing.
    #[must_use]
    pub const fn shall_retain(&self) -> bool {
        matches!(self.retention, Retention::Keep { .. })
    }

    /// Retention deadline for a task finishing at `now`.
    #[must_use]
    pub fn shall_retain_until(&self, now: Epoch) -> Option<RetainUntil> {
        match self.retention {
            Retention::Discard => None,
            Retention::Keep { period: None, .. } => Some(RetainUntil::Forever),
            Retention::Keep {
                period: Some(period),
                ..
            } => {
                let secs = Epoch::try_from(period.as_secs()).unwrap_or(Epoch::MAX);
                Some(RetainUntil::Until(now.saturating_add(secs)))
            }
        }
    }

    /// Whether the output is stored with the retained record.
    #[must_use]
    pub const fn shall_retain_output(&self) -> bool {
        matches!(
            self.retention,
            Retention::Keep {
                store_output: true,
                ..
            }
        )
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("name", &self.name)
            .field("execution_context", &self.execution_context)
            .field("completes_within", &self.completes_within)
            .field("retention", &self.retention)
            .field("max_concurrent_tasks", &self.max_concurrent_tasks)
            .finish_non_exhaustive()
    }
}

/// Registry of task definitions (name -> definition).
///
/// Definitions are insert-only; lookups hand out shared references.
#[derive(Default)]
pub struct TaskRegistry {
    definitions: RwLock<HashMap<String, Arc<TaskDefinition>>>,
}

impl TaskRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::DuplicateTaskDefinition`] if the name is taken.
    pub fn insert(&self, definition: TaskDefinition) -> Result<Arc<TaskDefinition>, SchedulerError> {
        let mut definitions = self.definitions.write();
        if definitions.contains_key(definition.name()) {
            return Err(SchedulerError::DuplicateTaskDefinition(definition.name().to_owned()));
        }
        let definition = Arc::new(definition);
        definitions.insert(definition.name().to_owned(), Arc::clone(&definition));
        Ok(definition)
    }

    /// Look a definition up by task name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<TaskDefinition>> {
        self.definitions.read().get(name).cloned()
    }

    /// Whether a definition exists for `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.definitions.read().contains_key(name)
    }

    /// Registered task names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.definitions.read().keys().cloned().collect()
    }

    /// Number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.read().len()
    }

    /// Whether no definition is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.read().is_empty()
    }
}
