//! In-memory task store for development and testing.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::table::{TaskTable, DEFAULT_CLAIM_TIMEOUT_SECS};
use crate::core::{AppResult, Epoch, NewTask, RetainUntil, Task, TaskId, TaskStore};
use crate::util::clock::{Clock, SystemClock};

/// In-memory store implementing the full task state machine.
///
/// Every operation holds one mutex for its whole duration, so claims are
/// atomic across dispatchers sharing the store. Elapsed retention is purged
/// lazily at the start of every operation.
pub struct MemoryTaskStore {
    table: Mutex<TaskTable>,
    clock: Arc<dyn Clock>,
    claim_timeout: Epoch,
}

impl MemoryTaskStore {
    /// Create an empty store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store on the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            table: Mutex::new(TaskTable::new()),
            clock,
            claim_timeout: DEFAULT_CLAIM_TIMEOUT_SECS,
        }
    }

    /// Override the provisional claim length, in seconds.
    #[must_use]
    pub const fn with_claim_timeout(mut self, claim_timeout: Epoch) -> Self {
        self.claim_timeout = claim_timeout;
        self
    }

    /// Record by id.
    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.locked().get(id).cloned()
    }

    /// Number of records, after purging elapsed retention.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locked().len()
    }

    /// Whether the store is empty, after purging elapsed retention.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locked().is_empty()
    }

    /// All records in id order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Task> {
        self.locked().iter().cloned().collect()
    }

    /// Delete records whose retention elapsed; returns how many.
    pub fn prune_expired(&self) -> usize {
        let now = self.clock.now_secs();
        self.table.lock().prune_expired(now)
    }

    fn locked(&self) -> parking_lot::MutexGuard<'_, TaskTable> {
        let now = self.clock.now_secs();
        let mut table = self.table.lock();
        let pruned = table.prune_expired(now);
        if pruned > 0 {
            tracing::debug!("pruned {} expired task records", pruned);
        }
        table
    }
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn store_new_task(&self, task: NewTask) -> AppResult<TaskId> {
        Ok(self.locked().insert(task))
    }

    async fn get_next_pending_task(&self, excluded: &[String]) -> AppResult<Option<Task>> {
        let now = self.clock.now_secs();
        Ok(self.locked().claim_next(excluded, now, self.claim_timeout))
    }

    async fn set_task_processing_time(&self, task: &Task, processing_until: Epoch) -> AppResult<()> {
        let mut table = self.locked();
        table.verify_claim(task)?;
        table.set_processing_time(task.id, processing_until)
    }

    async fn cancel_task_processing(
        &self,
        task: &Task,
        failed: bool,
        error: Option<&str>,
    ) -> AppResult<()> {
        let mut table = self.locked();
        table.verify_claim(task)?;
        table.cancel(task.id, failed, error)
    }

    async fn finish_task_processing(
        &self,
        task: &Task,
        retain: bool,
        retain_until: Option<RetainUntil>,
        store_output: bool,
        output: Option<Value>,
    ) -> AppResult<()> {
        let mut table = self.locked();
        table.verify_claim(task)?;
        table.finish(task.id, retain, retain_until, store_output, output)
    }

    async fn get_next_polling_time(&self, excluded: &[String]) -> AppResult<Option<Epoch>> {
        Ok(self.locked().next_polling_time(excluded))
    }
}
