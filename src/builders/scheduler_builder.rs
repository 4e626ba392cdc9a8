//! Builder wiring a [`Scheduler`] from configuration and collaborators.

use std::sync::Arc;

use tokio::runtime::Handle;

use super::store_builder::build_store;
use crate::config::SchedulerConfig;
use crate::core::{
    DispatcherParts, ErrorSink, ExecutionContextRegistry, SchedulerError, TaskDispatcher,
    TaskRegistry, TaskStore, TracingErrorSink,
};
use crate::runtime::{Scheduler, TokioSpawner};
use crate::util::clock::{Clock, SystemClock};

/// Builder for [`Scheduler`].
///
/// Unset collaborators default to: the store selected by the configuration,
/// a [`TracingErrorSink`], the system clock, and the tokio runtime the caller
/// is running on.
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    store: Option<Arc<dyn TaskStore>>,
    error_sink: Option<Arc<dyn ErrorSink>>,
    clock: Option<Arc<dyn Clock>>,
    runtime_handle: Option<Handle>,
}

impl SchedulerBuilder {
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            store: None,
            error_sink: None,
            clock: None,
            runtime_handle: None,
        }
    }

    /// Use this store instead of the configured backend.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Report handled errors to this sink.
    #[must_use]
    pub fn error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = Some(sink);
        self
    }

    /// Use this clock for deadlines and poll hints.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Run the poll loop and the tasks on this runtime.
    #[must_use]
    pub fn runtime_handle(mut self, handle: Handle) -> Self {
        self.runtime_handle = Some(handle);
        self
    }

    /// Configuration being built from.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Build a stopped scheduler.
    ///
    /// # Errors
    ///
    /// Returns a setup error if the configuration is invalid, the store
    /// backend cannot be opened, or no tokio runtime is available.
    pub fn build(self) -> Result<Scheduler, SchedulerError> {
        self.config.validate()?;

        let spawner = self
            .runtime_handle
            .map(TokioSpawner::new)
            .or_else(TokioSpawner::try_current)
            .ok_or_else(|| {
                SchedulerError::Setup(
                    "a tokio runtime is required: build inside one or pass a runtime handle".into(),
                )
            })?;

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = match self.store {
            Some(store) => store,
            None => build_store(&self.config, Arc::clone(&clock))?,
        };
        let sink: Arc<dyn ErrorSink> = self
            .error_sink
            .unwrap_or_else(|| Arc::new(TracingErrorSink));

        let registry = Arc::new(TaskRegistry::new());
        let contexts = Arc::new(ExecutionContextRegistry::new());
        let dispatcher = TaskDispatcher::new(
            &self.config,
            DispatcherParts {
                store,
                registry: Arc::clone(&registry),
                contexts: Arc::clone(&contexts),
                sink,
                clock,
                spawner,
            },
        );

        tracing::info!(
            dispatcher = %dispatcher.id(),
            "scheduler built (max_concurrent_tasks={}, poll_at_least_every={}s)",
            self.config.max_concurrent_tasks,
            self.config.poll_at_least_every_secs
        );
        Ok(Scheduler::from_parts(self.config, registry, contexts, dispatcher))
    }
}
