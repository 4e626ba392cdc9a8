//! Tests for utility functions

use prometheus_task_scheduler::util::{
    now_ms, now_secs, scheduler_filter, Clock, ManualClock, SystemClock, DEFAULT_LOG_FILTER,
};

#[test]
fn test_manual_clock() {
    let clock = ManualClock::new(1_000);
    assert_eq!(clock.now_secs(), 1_000);

    clock.advance(30);
    assert_eq!(clock.now_secs(), 1_030);

    clock.set(5);
    assert_eq!(clock.now_secs(), 5);
}

#[test]
fn test_system_clock_tracks_wall_clock() {
    let before = now_secs();
    let observed = SystemClock.now_secs();
    let after = now_secs();
    assert!(before <= observed && observed <= after);
}

#[test]
fn test_millis_agree_with_seconds() {
    let secs = now_secs();
    let millis = now_ms();
    let millis_as_secs = i64::try_from(millis / 1000).unwrap();
    assert!((millis_as_secs - secs).abs() <= 1);
}

#[test]
fn test_init_tracing_is_idempotent() {
    prometheus_task_scheduler::util::init_tracing();
    prometheus_task_scheduler::util::init_tracing();
}

#[test]
fn test_scheduler_filter_falls_back_to_default() {
    let default = scheduler_filter(None).to_string();
    assert!(default.contains("prometheus_task_scheduler=info"));
    assert!(DEFAULT_LOG_FILTER.starts_with("warn"));

    assert_eq!(scheduler_filter(Some("prometheus_task_scheduler=loudest")).to_string(), default);

    let custom = scheduler_filter(Some("prometheus_task_scheduler=debug")).to_string();
    assert!(custom.contains("prometheus_task_scheduler=debug"));
}
