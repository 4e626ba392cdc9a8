//! Store wrapper that turns every store failure into a reported
//! [`SchedulerError::StoreAccess`].
//!
//! A store call that panics is reported the same way as one that fails.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::anyhow;
use futures::FutureExt;
use serde_json::Value;

use super::error::{AppResult, SchedulerError};
use super::error_sink::GuardedErrorSink;
use super::runner::panic_message;
use super::store::TaskStore;
use super::task::{Epoch, NewTask, RetainUntil, Task, TaskId};

/// Wraps a [`TaskStore`]; failures are reported once here and returned to the caller.
#[derive(Clone)]
pub struct MonitoredStore {
    inner: Arc<dyn TaskStore>,
    sink: GuardedErrorSink,
}

impl MonitoredStore {
    /// Wrap `inner`, reporting failures to `sink`.
    #[must_use]
    pub fn new(inner: Arc<dyn TaskStore>, sink: GuardedErrorSink) -> Self {
        Self { inner, sink }
    }

    /// The wrapped store.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn TaskStore> {
        &self.inner
    }

    fn check<T>(
        &self,
        operation: &'static str,
        arguments: impl FnOnce() -> String,
        result: AppResult<T>,
    ) -> Result<T, SchedulerError> {
        result.map_err(|cause| {
            let error = SchedulerError::StoreAccess {
                operation,
                arguments: arguments(),
                cause: format!("{cause:#}"),
            };
            self.sink.report(&error);
            error
        })
    }

    /// See [`TaskStore::store_new_task`].
    ///
    /// # Errors
    ///
    /// Returns the reported [`SchedulerError::StoreAccess`].
    pub async fn store_new_task(&self, task: NewTask) -> Result<TaskId, SchedulerError> {
        let arguments = describe_new_task(&task);
        let result = contained(self.inner.store_new_task(task)).await;
        self.check("storeNewTask", || arguments, result)
    }

    /// See [`TaskStore::get_next_pending_task`].
    ///
    /// # Errors
    ///
    /// Returns the reported [`SchedulerError::StoreAccess`].
    pub async fn get_next_pending_task(
        &self,
        excluded: &[String],
    ) -> Result<Option<Task>, SchedulerError> {
        let result = contained(self.inner.get_next_pending_task(excluded)).await;
        self.check("getNextPendingTask", || format!("{excluded:?}"), result)
    }

    /// See [`TaskStore::set_task_processing_time`].
    ///
    /// # Errors
    ///
    /// Returns the reported [`SchedulerError::StoreAccess`].
    pub async fn set_task_processing_time(
        &self,
        task: &Task,
        processing_until: Epoch,
    ) -> Result<(), SchedulerError> {
        let result = contained(self.inner.set_task_processing_time(task, processing_until)).await;
        self.check(
            "setTaskProcessingTime",
            || format!("{}, {processing_until}", describe_task(task)),
            result,
        )
    }

    /// See [`TaskStore::cancel_task_processing`].
    ///
    /// # Errors
    ///
    /// Returns the reported [`SchedulerError::StoreAccess`].
    pub async fn cancel_task_processing(
        &self,
        task: &Task,
        failed: bool,
        error: Option<&str>,
    ) -> Result<(), SchedulerError> {
        let result = contained(self.inner.cancel_task_processing(task, failed, error)).await;
        self.check(
            "cancelTaskProcessing",
            || format!("{}, {failed}, {error:?}", describe_task(task)),
            result,
        )
    }

    /// See [`TaskStore::finish_task_processing`].
    ///
    /// # Errors
    ///
    /// Returns the reported [`SchedulerError::StoreAccess`].
    pub async fn finish_task_processing(
        &self,
        task: &Task,
        retain: bool,
        retain_until: Option<RetainUntil>,
        store_output: bool,
        output: Option<Value>,
    ) -> Result<(), SchedulerError> {
        let result = contained(self.inner.finish_task_processing(
            task,
            retain,
            retain_until,
            store_output,
            output,
        ))
        .await;
        self.check(
            "finishTaskProcessing",
            || format!("{}, {retain}, {retain_until:?}, {store_output}", describe_task(task)),
            result,
        )
    }

    /// See [`TaskStore::get_next_polling_time`].
    ///
    /// # Errors
    ///
    /// Returns the reported [`SchedulerError::StoreAccess`].
    pub async fn get_next_polling_time(
        &self,
        excluded: &[String],
    ) -> Result<Option<Epoch>, SchedulerError> {
        let result = contained(self.inner.get_next_polling_time(excluded)).await;
        self.check("getNextPollingTime", || format!("{excluded:?}"), result)
    }
}

async fn contained<T>(call: impl Future<Output = AppResult<T>>) -> AppResult<T> {
    AssertUnwindSafe(call).catch_unwind().await.unwrap_or_else(|payload| {
        Err(panic_message(payload.as_ref())
            .map_or_else(|| anyhow!("store panicked"), |message| anyhow!("store panicked: {message}")))
    })
}

fn describe_new_task(task: &NewTask) -> String {
    format!("{{ name: {:?}, due: {} }}", task.name, task.due)
}

fn describe_task(task: &Task) -> String {
    format!("{{ id: {}, name: {:?} }}", task.id, task.name)
}
