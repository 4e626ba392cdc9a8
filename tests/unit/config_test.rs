//! Tests for configuration validation

use std::collections::HashMap;
use std::time::Duration;

use prometheus_task_scheduler::config::{SchedulerConfig, StoreBackendConfig};

#[test]
fn test_default_config_is_valid() {
    let cfg = SchedulerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.max_concurrent_tasks, 1);
    assert_eq!(cfg.poll_at_least_every(), Duration::from_secs(60));
    assert_eq!(cfg.store, StoreBackendConfig::InMemory);

    let defaults = cfg.definition_defaults();
    assert_eq!(defaults.execution_context, "main");
    assert_eq!(defaults.completes_within, Duration::from_secs(24 * 60 * 60));
}

#[test]
fn test_config_invalid_max_concurrent_tasks() {
    let invalid = SchedulerConfig {
        max_concurrent_tasks: 0,
        ..SchedulerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_config_invalid_poll_interval() {
    let invalid = SchedulerConfig {
        poll_at_least_every_secs: 0,
        ..SchedulerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_config_invalid_defaults() {
    let no_deadline = SchedulerConfig {
        default_completes_within_secs: 0,
        ..SchedulerConfig::default()
    };
    assert!(no_deadline.validate().is_err());

    let no_context = SchedulerConfig {
        default_execution_context: String::new(),
        ..SchedulerConfig::default()
    };
    assert!(no_context.validate().is_err());
}

#[test]
fn test_config_invalid_file_stream() {
    let invalid = SchedulerConfig {
        store: StoreBackendConfig::File {
            path: "/tmp/tasks".into(),
            stream: String::new(),
        },
        ..SchedulerConfig::default()
    };
    let err = invalid.validate().unwrap_err();
    assert!(err.to_string().contains("stream"));
}

#[test]
fn test_config_from_json() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{
            "max_concurrent_tasks": 8,
            "poll_at_least_every_secs": 5,
            "store": { "file": { "path": "/var/lib/tasks", "stream": "jobs" } }
        }"#,
    )
    .unwrap();

    assert_eq!(cfg.max_concurrent_tasks, 8);
    assert_eq!(cfg.poll_at_least_every_secs, 5);
    assert_eq!(cfg.default_execution_context, "main");
    assert_eq!(
        cfg.store,
        StoreBackendConfig::File {
            path: "/var/lib/tasks".into(),
            stream: "jobs".into(),
        }
    );
}

#[test]
fn test_config_from_json_rejects_invalid() {
    assert!(SchedulerConfig::from_json_str("{ not json").is_err());
    assert!(SchedulerConfig::from_json_str(r#"{ "max_concurrent_tasks": 0 }"#).is_err());
}

#[test]
fn test_config_from_lookup() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("TASK_SCHEDULER_MAX_CONCURRENT_TASKS", "4"),
        ("TASK_SCHEDULER_POLL_AT_LEAST_EVERY_SECS", "15"),
        ("TASK_SCHEDULER_DEFAULT_EXECUTION_CONTEXT", "workers"),
    ]);
    let cfg = SchedulerConfig::from_lookup(|key| vars.get(key).map(|v| (*v).to_string())).unwrap();

    assert_eq!(cfg.max_concurrent_tasks, 4);
    assert_eq!(cfg.poll_at_least_every_secs, 15);
    assert_eq!(cfg.default_execution_context, "workers");
    assert_eq!(cfg.default_completes_within_secs, 24 * 60 * 60);
}

#[test]
fn test_config_from_lookup_rejects_garbage() {
    let result = SchedulerConfig::from_lookup(|key| {
        (key == "TASK_SCHEDULER_MAX_CONCURRENT_TASKS").then(|| "many".to_string())
    });
    assert!(result.is_err());
}
