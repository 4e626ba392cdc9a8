//! Task records and their lifecycle status.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use crate::util::clock::Epoch;

/// Store-assigned task identifier.
pub type TaskId = u64;

/// Status of a task in the store's state machine.
///
/// `Scheduled -> Processing -> {Scheduled (retry), Failed, Done}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for its due time or for a retry.
    Scheduled,
    /// Claimed by a dispatcher until `processing_until`.
    Processing,
    /// Execution failed; never claimed again.
    Failed,
    /// Execution finished successfully.
    Done,
}

impl TaskStatus {
    /// Whether the task left the claimable part of the state machine.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Done)
    }
}

/// Deadline after which a retained record is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetainUntil {
    /// Delete once this epoch has passed.
    Until(Epoch),
    /// Never delete.
    Forever,
}

impl RetainUntil {
    /// Whether the retention period has elapsed at `now`.
    #[must_use]
    pub const fn has_elapsed(self, now: Epoch) -> bool {
        match self {
            Self::Until(until) => until <= now,
            Self::Forever => false,
        }
    }
}

/// A task as passed to `schedule_task`, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    /// Name of the task definition.
    pub name: String,
    /// Opaque payload handed to the implementation.
    pub input: Value,
    /// Epoch seconds at which the task becomes eligible.
    pub due: Epoch,
}

impl NewTask {
    /// Build a new task request.
    pub fn new(name: impl Into<String>, input: Value, due: Epoch) -> Self {
        Self {
            name: name.into(),
            input,
            due,
        }
    }
}

/// One scheduled unit of work as held by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Store-assigned identifier.
    pub id: TaskId,
    /// Name of the task definition.
    pub name: String,
    /// Opaque payload handed to the implementation.
    pub input: Value,
    /// Epoch seconds at which the task becomes eligible. Immutable.
    pub due: Epoch,
    /// Current state.
    pub status: TaskStatus,
    /// Claim deadline; only meaningful while processing.
    pub processing_until: Option<Epoch>,
    /// Retained output of a successful execution.
    pub output: Option<Value>,
    /// Failure description of a failed execution.
    pub error: Option<String>,
    /// Retention deadline once finished or failed.
    pub retain_until: Option<RetainUntil>,
}

impl Task {
    /// Materialize a freshly stored task.
    #[must_use]
    pub fn scheduled(id: TaskId, new_task: NewTask) -> Self {
        Self {
            id,
            name: new_task.name,
            input: new_task.input,
            due: new_task.due,
            status: TaskStatus::Scheduled,
            processing_until: None,
            output: None,
            error: None,
            retain_until: None,
        }
    }

    /// Whether a claim attempt at `now` may take this task.
    #[must_use]
    pub fn is_claimable(&self, now: Epoch) -> bool {
        match self.status {
            TaskStatus::Scheduled => self.due <= now,
            TaskStatus::Processing => self.processing_until.is_none_or(|until| until <= now),
            TaskStatus::Failed | TaskStatus::Done => false,
        }
    }

    /// Earliest epoch at which this task could become claimable, if ever.
    #[must_use]
    pub fn next_actionable_at(&self) -> Option<Epoch> {
        match self.status {
            TaskStatus::Scheduled => Some(self.due),
            TaskStatus::Processing => self.processing_until.map(|until| until.saturating_add(1)),
            TaskStatus::Failed | TaskStatus::Done => None,
        }
    }
}
