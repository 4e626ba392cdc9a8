//! Execution lifecycle of one claimed task.
//!
//! `arm deadline -> set processing time -> validate input -> run -> validate
//! output -> finish | cancel -> disarm deadline`. Store failures are reported by
//! the [`MonitoredStore`] and never abort the lifecycle.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::task::JoinError;
use uuid::Uuid;

use super::definition::TaskDefinition;
use super::error::SchedulerError;
use super::error_sink::GuardedErrorSink;
use super::executor::ExecutionContextRegistry;
use super::monitored_store::MonitoredStore;
use super::task::Task;
use crate::runtime::TokioSpawner;
use crate::util::clock::Clock;

/// Runs claimed tasks through their execution context and records the outcome.
#[derive(Clone)]
pub struct TaskRunner {
    dispatcher_id: Uuid,
    store: MonitoredStore,
    contexts: Arc<ExecutionContextRegistry>,
    sink: GuardedErrorSink,
    clock: Arc<dyn Clock>,
    spawner: TokioSpawner,
}

impl TaskRunner {
    /// Create a runner.
    #[must_use]
    pub fn new(
        dispatcher_id: Uuid,
        store: MonitoredStore,
        contexts: Arc<ExecutionContextRegistry>,
        sink: GuardedErrorSink,
        clock: Arc<dyn Clock>,
        spawner: TokioSpawner,
    ) -> Self {
        Self {
            dispatcher_id,
            store,
            contexts,
            sink,
            clock,
            spawner,
        }
    }

    /// Run the full lifecycle of `task`. Never fails: every error is reported.
    pub async fn run(&self, mut task: Task, definition: Arc<TaskDefinition>) {
        let started = Instant::now();
        let completes_within = definition.completes_within();
        let until = definition.processing_until(self.clock.now_secs());

        let overran = Arc::new(AtomicBool::new(false));
        let alarm = {
            let overran = Arc::clone(&overran);
            let sink = self.sink.clone();
            let error = SchedulerError::Overrun {
                task_name: task.name.clone(),
                task_id: task.id,
                completes_within_ms: completes_within.as_millis(),
            };
            self.spawner.spawn(async move {
                tokio::time::sleep(completes_within).await;
                overran.store(true, Ordering::Release);
                sink.report(&error);
            })
        };

        if self.store.set_task_processing_time(&task, until).await.is_ok() {
            task.processing_until = Some(until);
        } else {
            tracing::warn!(
                dispatcher = %self.dispatcher_id,
                "task {} keeps its provisional claim after failing to set its processing time",
                task.id
            );
        }

        match self.execute(&task, &definition).await {
            Ok(output) => {
                let now = self.clock.now_secs();
                let finished = self
                    .store
                    .finish_task_processing(
                        &task,
                        definition.shall_retain(),
                        definition.shall_retain_until(now),
                        definition.shall_retain_output(),
                        Some(output),
                    )
                    .await;
                if finished.is_ok() {
                    tracing::info!(
                        dispatcher = %self.dispatcher_id,
                        "task {} ({}) finished in {:?}",
                        task.id,
                        task.name,
                        started.elapsed()
                    );
                }
            }
            Err(error) => {
                self.sink.report(&error);
                let message = error.to_string();
                if self
                    .store
                    .cancel_task_processing(&task, true, Some(&message))
                    .await
                    .is_ok()
                {
                    tracing::info!(
                        dispatcher = %self.dispatcher_id,
                        "task {} ({}) marked as failed",
                        task.id,
                        task.name
                    );
                }
            }
        }

        alarm.abort();
        if overran.load(Ordering::Acquire) {
            self.sink.report(&SchedulerError::FinishedLate {
                task_name: task.name.clone(),
                task_id: task.id,
                overrun_ratio: started.elapsed().as_secs_f64() / completes_within.as_secs_f64(),
            });
        }
    }

    async fn execute(
        &self,
        task: &Task,
        definition: &Arc<TaskDefinition>,
    ) -> Result<Value, SchedulerError> {
        definition
            .validate_input(&task.input)
            .map_err(|errors| SchedulerError::InputValidation {
                task_name: task.name.clone(),
                task_id: task.id,
                errors,
            })?;

        let context = self
            .contexts
            .get(definition.execution_context())
            .ok_or_else(|| SchedulerError::Execution {
                task_name: task.name.clone(),
                task_id: task.id,
                cause: format!(
                    "the execution context \"{}\" is not registered",
                    definition.execution_context()
                ),
            })?;

        tracing::debug!(
            dispatcher = %self.dispatcher_id,
            "running task {} ({}) in context {}",
            task.id,
            task.name,
            definition.execution_context()
        );
        let run = {
            let task = task.clone();
            let definition = Arc::clone(definition);
            self.spawner
                .spawn(async move { context.run(task, definition).await })
        };

        let output = match run.await {
            Ok(Ok(output)) => output,
            Ok(Err(cause)) => {
                return Err(SchedulerError::Execution {
                    task_name: task.name.clone(),
                    task_id: task.id,
                    cause: format!("{cause:#}"),
                })
            }
            Err(join_error) => {
                return Err(SchedulerError::Execution {
                    task_name: task.name.clone(),
                    task_id: task.id,
                    cause: describe_join_error(join_error),
                })
            }
        };

        definition
            .validate_output(&output)
            .map_err(|errors| SchedulerError::OutputValidation {
                task_name: task.name.clone(),
                task_id: task.id,
                errors,
            })?;
        Ok(output)
    }
}

fn describe_join_error(error: JoinError) -> String {
    if error.is_cancelled() {
        return "execution was cancelled".into();
    }
    let payload = error.into_panic();
    panic_message(payload.as_ref()).map_or_else(
        || "execution panicked".into(),
        |message| format!("execution panicked: {message}"),
    )
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> Option<&str> {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
}
