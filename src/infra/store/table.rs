//! Task state machine shared by the bundled store backends.
//!
//! `TaskTable` is plain data: callers serialize access (a mutex in every
//! backend) and pass the current time in, which keeps the claim protocol
//! atomic and deterministic under test.

use std::collections::BTreeMap;

use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{AppResult, Epoch, NewTask, RetainUntil, Task, TaskId, TaskStatus};

/// Provisional claim length applied by `claim_next`, in seconds.
pub const DEFAULT_CLAIM_TIMEOUT_SECS: Epoch = 24 * 60 * 60;

/// Ordered task records plus the id sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskTable {
    tasks: BTreeMap<TaskId, Task>,
    next_id: TaskId,
}

impl TaskTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table from records, continuing the id sequence after the largest id.
    #[must_use]
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let tasks: BTreeMap<TaskId, Task> = tasks.into_iter().map(|t| (t.id, t)).collect();
        let next_id = tasks.keys().next_back().map_or(0, |id| id + 1);
        Self { tasks, next_id }
    }

    /// Insert a scheduled task.
    pub fn insert(&mut self, task: NewTask) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        self.tasks.insert(id, Task::scheduled(id, task));
        id
    }

    /// Claim the earliest-due eligible task not in `excluded`; ties go to the lowest id.
    pub fn claim_next(&mut self, excluded: &[String], now: Epoch, claim_timeout: Epoch) -> Option<Task> {
        let id = self
            .tasks
            .values()
            .filter(|t| t.is_claimable(now) && !excluded.contains(&t.name))
            .min_by_key(|t| (t.due, t.id))
            .map(|t| t.id)?;

        let task = self.tasks.get_mut(&id)?;
        task.status = TaskStatus::Processing;
        task.processing_until = Some(now.saturating_add(claim_timeout));
        Some(task.clone())
    }

    /// Check that `claimed` still holds the claim on its record.
    ///
    /// The claim deadline doubles as the claim token: once a claim expires and
    /// another dispatcher reclaims the task, the record's deadline moves and a
    /// late caller holding the old copy is turned away.
    ///
    /// # Errors
    ///
    /// Fails if the record is processing under a different deadline.
    pub fn verify_claim(&self, claimed: &Task) -> AppResult<()> {
        match self.tasks.get(&claimed.id) {
            Some(current)
                if current.status == TaskStatus::Processing
                    && current.processing_until != claimed.processing_until =>
            {
                bail!("task {} was reclaimed after its claim expired", claimed.id)
            }
            _ => Ok(()),
        }
    }

    /// Replace the claim deadline of a processing task.
    ///
    /// # Errors
    ///
    /// Fails if the task is unknown or not processing.
    pub fn set_processing_time(&mut self, id: TaskId, until: Epoch) -> AppResult<()> {
        let task = self.processing_task(id)?;
        task.processing_until = Some(until);
        Ok(())
    }

    /// Release a claim, either back to scheduled or into failed.
    ///
    /// # Errors
    ///
    /// Fails if the task is unknown or not processing.
    pub fn cancel(&mut self, id: TaskId, failed: bool, error: Option<&str>) -> AppResult<()> {
        let task = self.processing_task(id)?;
        task.processing_until = None;
        if failed {
            task.status = TaskStatus::Failed;
            task.error = Some(error.unwrap_or("execution failed").to_owned());
        } else {
            task.status = TaskStatus::Scheduled;
        }
        Ok(())
    }

    /// Mark a processing task done, deleting it unless retained.
    ///
    /// # Errors
    ///
    /// Fails if the task is unknown or not processing.
    pub fn finish(
        &mut self,
        id: TaskId,
        retain: bool,
        retain_until: Option<RetainUntil>,
        store_output: bool,
        output: Option<Value>,
    ) -> AppResult<()> {
        self.processing_task(id)?;
        if !retain {
            self.tasks.remove(&id);
            return Ok(());
        }
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| anyhow!("task {id} does not exist"))?;
        task.status = TaskStatus::Done;
        task.processing_until = None;
        task.retain_until = Some(retain_until.unwrap_or(RetainUntil::Forever));
        if store_output {
            task.output = output;
        }
        Ok(())
    }

    /// Earliest epoch at which a non-excluded task becomes actionable.
    #[must_use]
    pub fn next_polling_time(&self, excluded: &[String]) -> Option<Epoch> {
        self.tasks
            .values()
            .filter(|t| !excluded.contains(&t.name))
            .filter_map(Task::next_actionable_at)
            .min()
    }

    /// Delete finished records whose retention elapsed; returns how many.
    pub fn prune_expired(&mut self, now: Epoch) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, t| !t.retain_until.is_some_and(|r| r.has_elapsed(now)));
        before - self.tasks.len()
    }

    /// Record by id.
    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// Records in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the table holds no record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn processing_task(&mut self, id: TaskId) -> AppResult<&mut Task> {
        let Some(task) = self.tasks.get_mut(&id) else {
            bail!("task {id} does not exist");
        };
        if task.status != TaskStatus::Processing {
            bail!("task {id} is {:?}, not processing", task.status);
        }
        Ok(task)
    }
}
