//! Tests for tokio spawner utilities and the registration API

use std::sync::Arc;
use std::time::Duration;

use prometheus_task_scheduler::builders::SchedulerBuilder;
use prometheus_task_scheduler::config::SchedulerConfig;
use prometheus_task_scheduler::core::{
    Implementation, InProcessExecutionContext, NewTask, Retention, SchedulerError, TaskOptions,
};
use prometheus_task_scheduler::runtime::tokio_spawner::TokioSpawner;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_join_handle_returns_output() {
    let spawner = TokioSpawner::try_current().expect("inside a runtime");
    let handle = spawner.spawn(async { 6 * 7 });
    assert_eq!(handle.await.unwrap(), 42);
}

#[test]
fn test_tokio_spawner_outside_runtime() {
    assert!(TokioSpawner::try_current().is_none());
}

fn noop() -> Implementation {
    Implementation::sync(Ok)
}

#[tokio::test]
async fn test_define_task_rejects_duplicates() {
    let scheduler = SchedulerBuilder::new(SchedulerConfig::default()).build().unwrap();
    scheduler.define_task("report", TaskOptions::new(noop())).unwrap();

    let err = scheduler
        .define_task("report", TaskOptions::new(noop()))
        .unwrap_err();
    assert_eq!(err, SchedulerError::DuplicateTaskDefinition("report".into()));
}

#[tokio::test]
async fn test_define_task_requires_known_context() {
    let scheduler = SchedulerBuilder::new(SchedulerConfig::default()).build().unwrap();

    let err = scheduler
        .define_task(
            "report",
            TaskOptions::new(noop()).with_execution_context("gpu"),
        )
        .unwrap_err();
    assert_eq!(
        err,
        SchedulerError::UnknownExecutionContext {
            task_name: "report".into(),
            context: "gpu".into(),
        }
    );

    scheduler
        .register_execution_context("gpu", Arc::new(InProcessExecutionContext))
        .unwrap();
    scheduler
        .define_task("report", TaskOptions::new(noop()).with_execution_context("gpu"))
        .unwrap();
    assert_eq!(
        scheduler.task_definition("report").unwrap().execution_context(),
        "gpu"
    );
}

#[tokio::test]
async fn test_define_task_rejects_invalid_options() {
    let scheduler = SchedulerBuilder::new(SchedulerConfig::default()).build().unwrap();

    assert!(scheduler.define_task("", TaskOptions::new(noop())).is_err());
    assert!(scheduler
        .define_task("zero", TaskOptions::new(noop()).with_max_concurrent_tasks(0))
        .is_err());
    assert!(scheduler
        .define_task(
            "instant",
            TaskOptions::new(noop()).with_completes_within(Duration::ZERO)
        )
        .is_err());
    assert!(scheduler
        .define_task(
            "relative",
            TaskOptions::new(Implementation::locator("tasks/report.wasm"))
        )
        .is_err());
    assert!(scheduler
        .define_task(
            "fleeting",
            TaskOptions::new(noop()).with_retention(Retention::for_period(Duration::ZERO, false))
        )
        .is_err());
}

#[tokio::test]
async fn test_definitions_take_config_defaults() {
    let config = SchedulerConfig {
        default_completes_within_secs: 90,
        ..SchedulerConfig::default()
    };
    let scheduler = SchedulerBuilder::new(config).build().unwrap();
    scheduler.define_task("report", TaskOptions::new(noop())).unwrap();

    let definition = scheduler.task_definition("report").unwrap();
    assert_eq!(definition.completes_within(), Duration::from_secs(90));
    assert_eq!(definition.execution_context(), "main");
    assert_eq!(definition.max_concurrent_tasks(), None);
    assert!(!definition.shall_retain());
}

#[tokio::test]
async fn test_schedule_task_rejects_empty_name() {
    let scheduler = SchedulerBuilder::new(SchedulerConfig::default()).build().unwrap();
    let err = scheduler
        .schedule_task(NewTask::new("", serde_json::Value::Null, 0))
        .await
        .unwrap_err();
    assert!(err.is_setup());
}

#[tokio::test]
async fn test_start_stop_and_stats() {
    let scheduler = SchedulerBuilder::new(SchedulerConfig {
        max_concurrent_tasks: 3,
        ..SchedulerConfig::default()
    })
    .build()
    .unwrap();
    scheduler
        .define_task("report", TaskOptions::new(noop()).with_max_concurrent_tasks(2))
        .unwrap();

    assert!(!scheduler.is_running());
    scheduler.start();
    assert!(scheduler.is_running());
    scheduler.stop();
    assert!(!scheduler.is_running());

    let stats = scheduler.stats();
    assert_eq!(stats.running, 0);
    assert_eq!(stats.max_concurrent_tasks, 3);
    assert!(stats.saturated.is_empty());
    assert_ne!(scheduler.instance_id(), uuid::Uuid::nil());
}
