//! Core scheduling abstractions and the dispatch engine.

pub mod definition;
pub mod dispatcher;
pub mod error;
pub mod error_sink;
pub mod executor;
pub mod monitored_store;
pub mod runner;
pub mod store;
pub mod task;
pub mod tracker;

pub use definition::{
    DefinitionDefaults, Implementation, Retention, SchemaValidator, TaskDefinition, TaskFn,
    TaskFuture, TaskOptions, TaskRegistry,
};
pub use dispatcher::{DispatcherParts, TaskDispatcher};
pub use error::{AppResult, SchedulerError};
pub use error_sink::{ErrorSink, GuardedErrorSink, InMemoryErrorSink, TracingErrorSink};
pub use executor::{ExecutionContext, ExecutionContextRegistry, InProcessExecutionContext};
pub use monitored_store::MonitoredStore;
pub use runner::TaskRunner;
pub use store::TaskStore;
pub use task::{Epoch, NewTask, RetainUntil, Task, TaskId, TaskStatus};
pub use tracker::{CapacityRelease, DispatchTracker, TrackerSnapshot};
