//! Tests for admission-control bookkeeping

use std::sync::Arc;
use std::thread;

use prometheus_task_scheduler::core::DispatchTracker;

#[test]
fn test_per_task_cap_release_is_edge_triggered() {
    let tracker = DispatchTracker::new(10);
    tracker.add_task_definition("render", Some(2));

    tracker.track_task_started("render");
    tracker.track_task_started("render");
    assert!(tracker.reached_max_capacity_for_task("render"));
    assert_eq!(tracker.task_names_at_capacity(), vec!["render".to_string()]);

    let first = tracker.track_task_stopped("render");
    assert!(first.task_freed);
    assert!(!first.global_freed);

    let second = tracker.track_task_stopped("render");
    assert!(!second.any());
    assert!(tracker.task_names_at_capacity().is_empty());
}

#[test]
fn test_uncapped_types_never_excluded() {
    let tracker = DispatchTracker::new(2);
    tracker.add_task_definition("free", None);
    tracker.track_task_started("free");
    tracker.track_task_started("free");

    assert!(tracker.reached_max_capacity());
    assert!(!tracker.reached_max_capacity_for_task("free"));
    assert!(tracker.task_names_at_capacity().is_empty());
}

#[test]
fn test_zero_global_cap_is_clamped() {
    let tracker = DispatchTracker::new(0);
    assert_eq!(tracker.max_concurrent_tasks(), 1);
}

#[test]
fn test_concurrent_bookkeeping_balances() {
    let tracker = Arc::new(DispatchTracker::new(1000));
    tracker.add_task_definition("a", Some(500));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                for _ in 0..100 {
                    tracker.track_task_started("a");
                    tracker.track_task_started("b");
                    tracker.track_task_stopped("a");
                    tracker.track_task_stopped("b");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = tracker.snapshot();
    assert_eq!(snapshot.running, 0);
    assert!(snapshot.per_task.is_empty());
}

#[test]
fn test_snapshot_serializes() {
    let tracker = DispatchTracker::new(4);
    tracker.add_task_definition("render", Some(1));
    tracker.track_task_started("render");

    let json = serde_json::to_value(tracker.snapshot()).unwrap();
    assert_eq!(json["running"], 1);
    assert_eq!(json["max_concurrent_tasks"], 4);
    assert_eq!(json["per_task"]["render"], 1);
    assert_eq!(json["saturated"][0], "render");
}
