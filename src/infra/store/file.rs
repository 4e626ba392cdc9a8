//! File-backed task store.
//!
//! A simplified persistent backend: the task table is kept in memory and
//! rewritten as JSON lines (one task per line) after every mutation, then
//! reloaded on open.

use std::fs::{create_dir_all, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::table::{TaskTable, DEFAULT_CLAIM_TIMEOUT_SECS};
use crate::core::{AppResult, Epoch, NewTask, RetainUntil, SchedulerError, Task, TaskId, TaskStore};
use crate::util::clock::{Clock, SystemClock};

/// File-backed store using JSON lines for durability.
pub struct FileTaskStore {
    path: PathBuf,
    stream: String,
    table: Mutex<TaskTable>,
    clock: Arc<dyn Clock>,
}

impl FileTaskStore {
    /// Open (or create) the store `<path>/<stream>.jsonl` on the system clock.
    ///
    /// # Errors
    ///
    /// Returns a setup error if the directory cannot be created or the file
    /// cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>, stream: impl Into<String>) -> Result<Self, SchedulerError> {
        Self::open_with_clock(path, stream, Arc::new(SystemClock))
    }

    /// Open (or create) the store on the given clock.
    ///
    /// # Errors
    ///
    /// Returns a setup error if the directory cannot be created or the file
    /// cannot be read or parsed.
    pub fn open_with_clock(
        path: impl AsRef<Path>,
        stream: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SchedulerError> {
        let path = path.as_ref().to_path_buf();
        let stream = stream.into();
        create_dir_all(&path).map_err(|e| SchedulerError::Setup(e.to_string()))?;
        let mut store = Self {
            path,
            stream,
            table: Mutex::new(TaskTable::new()),
            clock,
        };
        store.load_from_disk()?;
        Ok(store)
    }

    /// Location of the JSON-lines file.
    #[must_use]
    pub fn file_path(&self) -> PathBuf {
        self.path.join(format!("{}.jsonl", self.stream))
    }

    /// Record by id.
    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.table.lock().get(id).cloned()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }

    fn load_from_disk(&mut self) -> Result<(), SchedulerError> {
        let file_path = self.file_path();
        if !file_path.exists() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .read(true)
            .open(&file_path)
            .map_err(|e| SchedulerError::Setup(e.to_string()))?;
        let reader = BufReader::new(file);
        let mut tasks = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|e| SchedulerError::Setup(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let task: Task = serde_json::from_str(&line).map_err(|e| {
                SchedulerError::Setup(format!("corrupt task record in {}: {e}", file_path.display()))
            })?;
            tasks.push(task);
        }
        tracing::info!("loaded {} tasks from {}", tasks.len(), file_path.display());
        *self.table.get_mut() = TaskTable::from_tasks(tasks);
        Ok(())
    }

    fn rewrite_disk(&self, table: &TaskTable) -> AppResult<()> {
        let file_path = self.file_path();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&file_path)
            .with_context(|| format!("failed to open {}", file_path.display()))?;
        let mut writer = BufWriter::new(file);
        for task in table.iter() {
            let line = serde_json::to_string(task)?;
            writeln!(writer, "{line}")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Apply `mutate` to a copy of the table and adopt it once it is on disk.
    ///
    /// A failed write leaves the in-memory table untouched.
    fn mutate<T>(&self, mutate: impl FnOnce(&mut TaskTable, Epoch) -> AppResult<T>) -> AppResult<T> {
        let now = self.clock.now_secs();
        let mut table = self.table.lock();
        let mut next = table.clone();
        next.prune_expired(now);
        let result = mutate(&mut next, now)?;
        self.rewrite_disk(&next)?;
        *table = next;
        Ok(result)
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn store_new_task(&self, task: NewTask) -> AppResult<TaskId> {
        self.mutate(|table, _| Ok(table.insert(task)))
    }

    async fn get_next_pending_task(&self, excluded: &[String]) -> AppResult<Option<Task>> {
        self.mutate(|table, now| Ok(table.claim_next(excluded, now, DEFAULT_CLAIM_TIMEOUT_SECS)))
    }

    async fn set_task_processing_time(&self, task: &Task, processing_until: Epoch) -> AppResult<()> {
        self.mutate(|table, _| {
            table.verify_claim(task)?;
            table.set_processing_time(task.id, processing_until)
        })
    }

    async fn cancel_task_processing(
        &self,
        task: &Task,
        failed: bool,
        error: Option<&str>,
    ) -> AppResult<()> {
        self.mutate(|table, _| {
            table.verify_claim(task)?;
            table.cancel(task.id, failed, error)
        })
    }

    async fn finish_task_processing(
        &self,
        task: &Task,
        retain: bool,
        retain_until: Option<RetainUntil>,
        store_output: bool,
        output: Option<Value>,
    ) -> AppResult<()> {
        self.mutate(|table, _| {
            table.verify_claim(task)?;
            table.finish(task.id, retain, retain_until, store_output, output)
        })
    }

    async fn get_next_polling_time(&self, excluded: &[String]) -> AppResult<Option<Epoch>> {
        let now = self.clock.now_secs();
        let mut table = self.table.lock();
        table.prune_expired(now);
        Ok(table.next_polling_time(excluded))
    }
}
