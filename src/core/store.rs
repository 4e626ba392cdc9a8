//! Persistence contract for scheduled tasks.
//!
//! Implementations own durability and the claim protocol. The engine assumes
//! `get_next_pending_task` is atomic: of several dispatchers racing for the same
//! task, at most one gets it back.
//!
//! The `Task` handed to `set_task_processing_time`, `cancel_task_processing`
//! and `finish_task_processing` carries the claim it was returned with. Its
//! `processing_until` identifies that claim: once an expired claim has been
//! taken over by another dispatcher, stores reject calls made with the old one.

use async_trait::async_trait;
use serde_json::Value;

use super::error::AppResult;
use super::task::{Epoch, NewTask, RetainUntil, Task, TaskId};

/// Abstraction for task store backends.
///
/// All operations are async and may fail; the engine routes failures to its
/// error sink and keeps going.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new task in the scheduled state and return its id.
    async fn store_new_task(&self, task: NewTask) -> AppResult<TaskId>;

    /// Atomically claim the next eligible task.
    ///
    /// A task is eligible when it is scheduled and due, or processing with an
    /// elapsed claim. `excluded` lists task types currently at capacity; stores
    /// should skip them, but the engine re-checks and tolerates stores that do not.
    async fn get_next_pending_task(&self, excluded: &[String]) -> AppResult<Option<Task>>;

    /// Replace the provisional claim deadline with the definition's real one.
    async fn set_task_processing_time(&self, task: &Task, processing_until: Epoch) -> AppResult<()>;

    /// Release a claim. With `failed` the task becomes terminal and records
    /// `error`; otherwise it is rescheduled.
    async fn cancel_task_processing(
        &self,
        task: &Task,
        failed: bool,
        error: Option<&str>,
    ) -> AppResult<()>;

    /// Mark a task done. Without `retain` the record is deleted.
    async fn finish_task_processing(
        &self,
        task: &Task,
        retain: bool,
        retain_until: Option<RetainUntil>,
        store_output: bool,
        output: Option<Value>,
    ) -> AppResult<()>;

    /// Earliest epoch at which a non-excluded task could become claimable.
    async fn get_next_polling_time(&self, excluded: &[String]) -> AppResult<Option<Epoch>>;
}
