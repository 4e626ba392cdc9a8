//! # Prometheus Task Scheduler
//!
//! A durable background-task scheduler for server processes that need
//! at-least-once execution of deferred jobs without embedding their own polling
//! or concurrency bookkeeping.
//!
//! Callers define named task types, schedule instances with a due time, and the
//! engine repeatedly claims due work from a pluggable [`core::TaskStore`],
//! executes it through a pluggable [`core::ExecutionContext`], and records
//! completion, failure, or retry.
//!
//! ## Key Features
//!
//! - **Single-flight polling**: at most one claim is outstanding per dispatcher
//! - **Admission control**: a global cap plus optional per-task-type caps
//! - **Crash recovery**: claims carry a deadline after which another dispatcher may
//!   reclaim the task
//! - **Edge-triggered re-polling**: capacity freed by a completing task restarts the
//!   poll loop only when a cap actually transitions from saturated to available
//! - **Error sink**: every internally handled failure is routed to one callback that
//!   can never break the loop
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use prometheus_task_scheduler::builders::SchedulerBuilder;
//! use prometheus_task_scheduler::config::SchedulerConfig;
//! use prometheus_task_scheduler::core::{Implementation, NewTask, TaskOptions};
//! use prometheus_task_scheduler::infra::store::MemoryTaskStore;
//! use prometheus_task_scheduler::util::now_secs;
//!
//! let scheduler = SchedulerBuilder::new(SchedulerConfig::default())
//!     .store(Arc::new(MemoryTaskStore::new()))
//!     .build()?;
//!
//! scheduler.define_task(
//!     "send_report",
//!     TaskOptions::new(Implementation::function(|input| async move {
//!         Ok(serde_json::json!({ "sent": input }))
//!     })),
//! )?;
//!
//! scheduler
//!     .schedule_task(NewTask::new("send_report", serde_json::json!("weekly"), now_secs()))
//!     .await?;
//! scheduler.start();
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: tasks, definitions, store contract, dispatch engine.
pub mod core;
/// Configuration models for the scheduler and its store backend.
pub mod config;
/// Builders to construct schedulers and stores from configuration.
pub mod builders;
/// Store backends implementing the task store contract.
pub mod infra;
/// Runtime adapters and the registration API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
