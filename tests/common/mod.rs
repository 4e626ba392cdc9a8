//! Shared fixtures for scheduler integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use prometheus_task_scheduler::builders::SchedulerBuilder;
use prometheus_task_scheduler::config::SchedulerConfig;
use prometheus_task_scheduler::core::{
    AppResult, Epoch, InMemoryErrorSink, NewTask, RetainUntil, Task, TaskId, TaskStore,
};
use prometheus_task_scheduler::infra::store::MemoryTaskStore;
use prometheus_task_scheduler::runtime::Scheduler;

/// One observed store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StoreNewTask,
    GetNextPendingTask {
        excluded: Vec<String>,
        claimed: Option<TaskId>,
    },
    SetTaskProcessingTime(TaskId),
    CancelTaskProcessing { id: TaskId, failed: bool },
    FinishTaskProcessing { id: TaskId, retain: bool },
    GetNextPollingTime,
}

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    StoreNewTask,
    GetNextPendingTask,
    SetTaskProcessingTime,
    CancelTaskProcessing,
    FinishTaskProcessing,
    GetNextPollingTime,
}

/// Memory store wrapper that records every call in order.
pub struct RecordingStore {
    inner: MemoryTaskStore,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<Op>>,
    ignore_exclusions: AtomicBool,
    panic_on_claim: AtomicBool,
    claim_delay: Mutex<Option<Duration>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::wrap(MemoryTaskStore::new())
    }

    pub fn wrap(inner: MemoryTaskStore) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            ignore_exclusions: AtomicBool::new(false),
            panic_on_claim: AtomicBool::new(false),
            claim_delay: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &MemoryTaskStore {
        &self.inner
    }

    /// Make `op` fail with "Failed!" from now on.
    pub fn fail_on(&self, op: Op) {
        self.failing.lock().insert(op);
    }

    /// Pretend not to support exclusion hints.
    pub fn ignore_exclusions(&self) {
        self.ignore_exclusions.store(true, Ordering::SeqCst);
    }

    /// Make the next claim panic with "store exploded".
    pub fn panic_next_claim(&self) {
        self.panic_on_claim.store(true, Ordering::SeqCst);
    }

    /// Delay every claim by `delay`.
    pub fn delay_claims(&self, delay: Duration) {
        *self.claim_delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls.lock().iter().filter(|c| op_of(c) == op).count()
    }

    /// Position of the `nth` call (0-based) to `op` in the call log.
    pub fn position(&self, op: Op, nth: usize) -> Option<usize> {
        self.calls
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, c)| op_of(c) == op)
            .nth(nth)
            .map(|(i, _)| i)
    }

    /// Position of the `nth` claim that returned a task.
    pub fn successful_claim_position(&self, nth: usize) -> Option<usize> {
        self.calls
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, Call::GetNextPendingTask { claimed: Some(_), .. }))
            .nth(nth)
            .map(|(i, _)| i)
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn check(&self, op: Op) -> AppResult<()> {
        if self.failing.lock().contains(&op) {
            return Err(anyhow!("Failed!"));
        }
        Ok(())
    }
}

fn op_of(call: &Call) -> Op {
    match call {
        Call::StoreNewTask => Op::StoreNewTask,
        Call::GetNextPendingTask { .. } => Op::GetNextPendingTask,
        Call::SetTaskProcessingTime(_) => Op::SetTaskProcessingTime,
        Call::CancelTaskProcessing { .. } => Op::CancelTaskProcessing,
        Call::FinishTaskProcessing { .. } => Op::FinishTaskProcessing,
        Call::GetNextPollingTime => Op::GetNextPollingTime,
    }
}

#[async_trait]
impl TaskStore for RecordingStore {
    async fn store_new_task(&self, task: NewTask) -> AppResult<TaskId> {
        self.record(Call::StoreNewTask);
        self.check(Op::StoreNewTask)?;
        self.inner.store_new_task(task).await
    }

    async fn get_next_pending_task(&self, excluded: &[String]) -> AppResult<Option<Task>> {
        let delay = *self.claim_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_on_claim.swap(false, Ordering::SeqCst) {
            panic!("store exploded");
        }
        if let Err(e) = self.check(Op::GetNextPendingTask) {
            self.record(Call::GetNextPendingTask {
                excluded: excluded.to_vec(),
                claimed: None,
            });
            return Err(e);
        }
        let hint: &[String] = if self.ignore_exclusions.load(Ordering::SeqCst) {
            &[]
        } else {
            excluded
        };
        let claimed = self.inner.get_next_pending_task(hint).await?;
        self.record(Call::GetNextPendingTask {
            excluded: excluded.to_vec(),
            claimed: claimed.as_ref().map(|t| t.id),
        });
        Ok(claimed)
    }

    async fn set_task_processing_time(&self, task: &Task, processing_until: Epoch) -> AppResult<()> {
        self.record(Call::SetTaskProcessingTime(task.id));
        self.check(Op::SetTaskProcessingTime)?;
        self.inner.set_task_processing_time(task, processing_until).await
    }

    async fn cancel_task_processing(
        &self,
        task: &Task,
        failed: bool,
        error: Option<&str>,
    ) -> AppResult<()> {
        self.record(Call::CancelTaskProcessing {
            id: task.id,
            failed,
        });
        self.check(Op::CancelTaskProcessing)?;
        self.inner.cancel_task_processing(task, failed, error).await
    }

    async fn finish_task_processing(
        &self,
        task: &Task,
        retain: bool,
        retain_until: Option<RetainUntil>,
        store_output: bool,
        output: Option<Value>,
    ) -> AppResult<()> {
        self.record(Call::FinishTaskProcessing {
            id: task.id,
            retain,
        });
        self.check(Op::FinishTaskProcessing)?;
        self.inner
            .finish_task_processing(task, retain, retain_until, store_output, output)
            .await
    }

    async fn get_next_polling_time(&self, excluded: &[String]) -> AppResult<Option<Epoch>> {
        self.record(Call::GetNextPollingTime);
        self.check(Op::GetNextPollingTime)?;
        self.inner.get_next_polling_time(excluded).await
    }
}

/// Scheduler over `store` with the given global cap, reporting into a fresh sink.
pub fn scheduler_with(
    store: Arc<dyn TaskStore>,
    max_concurrent_tasks: usize,
) -> (Scheduler, Arc<InMemoryErrorSink>) {
    let sink = Arc::new(InMemoryErrorSink::default());
    let config = SchedulerConfig {
        max_concurrent_tasks,
        ..SchedulerConfig::default()
    };
    let scheduler = SchedulerBuilder::new(config)
        .store(store)
        .error_sink(sink.clone())
        .build()
        .expect("scheduler builds");
    (scheduler, sink)
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Let spawned work settle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
