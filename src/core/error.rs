//! Error types for scheduler operations.

use thiserror::Error;

use super::task::TaskId;

/// Errors produced or handled by scheduler components.
///
/// Setup errors are returned synchronously to the caller. Every other variant
/// is constructed where the failure is detected and routed to the
/// [`ErrorSink`](super::ErrorSink); none of them stops the poll loop.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchedulerError {
    /// Invalid registration, definition, or configuration.
    #[error("invalid setup: {0}")]
    Setup(String),
    /// A task type with this name is already defined.
    #[error("a task named \"{0}\" is already defined")]
    DuplicateTaskDefinition(String),
    /// An execution context with this name is already registered.
    #[error("an execution context named \"{0}\" is already registered")]
    DuplicateExecutionContext(String),
    /// A task definition references an execution context that is not registered.
    #[error("the execution context \"{context}\" required by task \"{task_name}\" does not exist")]
    UnknownExecutionContext {
        /// Task type being defined.
        task_name: String,
        /// Missing execution context.
        context: String,
    },
    /// Task input rejected by the definition's input schema.
    #[error("the input of a \"{task_name}\" task failed to validate: {}", .errors.join("; "))]
    InputValidation {
        /// Task type.
        task_name: String,
        /// Store-assigned task id.
        task_id: TaskId,
        /// Validator messages.
        errors: Vec<String>,
    },
    /// Task output rejected by the definition's output schema.
    #[error("the output of a \"{task_name}\" task failed to validate: {}", .errors.join("; "))]
    OutputValidation {
        /// Task type.
        task_name: String,
        /// Store-assigned task id.
        task_id: TaskId,
        /// Validator messages.
        errors: Vec<String>,
    },
    /// The execution capability failed or panicked.
    #[error("failed to execute a \"{task_name}\" task caused by: {cause}")]
    Execution {
        /// Task type.
        task_name: String,
        /// Store-assigned task id.
        task_id: TaskId,
        /// Rendered cause, including its context chain.
        cause: String,
    },
    /// A claimed task has no registered definition.
    #[error("missing task definition for tasks named \"{task_name}\"")]
    MissingDefinition {
        /// Task type found in the store.
        task_name: String,
        /// Store-assigned task id.
        task_id: TaskId,
    },
    /// A store operation failed.
    #[error("failed to access the task store with .{operation}({arguments}) caused by: {cause}")]
    StoreAccess {
        /// Store operation name.
        operation: &'static str,
        /// Rendered call arguments.
        arguments: String,
        /// Rendered cause, including its context chain.
        cause: String,
    },
    /// A task is running longer than its declared deadline. Informational.
    #[error("\"{task_name}\" task {task_id} is taking longer than {completes_within_ms}ms")]
    Overrun {
        /// Task type.
        task_name: String,
        /// Store-assigned task id.
        task_id: TaskId,
        /// Declared deadline in milliseconds.
        completes_within_ms: u128,
    },
    /// A task that overran eventually finished. Informational.
    #[error("\"{task_name}\" task {task_id} finished {overrun_ratio:.2}x later than expected")]
    FinishedLate {
        /// Task type.
        task_name: String,
        /// Store-assigned task id.
        task_id: TaskId,
        /// Measured runtime divided by the declared deadline.
        overrun_ratio: f64,
    },
}

impl SchedulerError {
    /// Whether this error only informs and never affects a task's outcome.
    #[must_use]
    pub const fn is_informational(&self) -> bool {
        matches!(self, Self::Overrun { .. } | Self::FinishedLate { .. })
    }

    /// Whether this error belongs to the synchronous setup category.
    #[must_use]
    pub const fn is_setup(&self) -> bool {
        matches!(
            self,
            Self::Setup(_)
                | Self::DuplicateTaskDefinition(_)
                | Self::DuplicateExecutionContext(_)
                | Self::UnknownExecutionContext { .. }
        )
    }

    /// Task type the error relates to, if any.
    #[must_use]
    pub fn task_name(&self) -> Option<&str> {
        match self {
            Self::UnknownExecutionContext { task_name, .. }
            | Self::InputValidation { task_name, .. }
            | Self::OutputValidation { task_name, .. }
            | Self::Execution { task_name, .. }
            | Self::MissingDefinition { task_name, .. }
            | Self::Overrun { task_name, .. }
            | Self::FinishedLate { task_name, .. } => Some(task_name.as_str()),
            Self::DuplicateTaskDefinition(name) => Some(name.as_str()),
            Self::Setup(_) | Self::DuplicateExecutionContext(_) | Self::StoreAccess { .. } => None,
        }
    }
}

/// Application-facing result using anyhow for collaborator implementations.
pub type AppResult<T> = Result<T, anyhow::Error>;
