//! Tests for error sinks

use std::sync::Arc;

use parking_lot::Mutex;
use prometheus_task_scheduler::core::{
    ErrorSink, GuardedErrorSink, InMemoryErrorSink, SchedulerError, TracingErrorSink,
};

fn store_error(n: u64) -> SchedulerError {
    SchedulerError::StoreAccess {
        operation: "getNextPollingTime",
        arguments: format!("[{n}]"),
        cause: "timeout".to_string(),
    }
}

#[test]
fn test_in_memory_sink_records_in_order() {
    let sink = InMemoryErrorSink::new(10);
    sink.report(&store_error(1));
    sink.report(&store_error(2));

    assert_eq!(sink.len(), 2);
    assert_eq!(sink.errors(), vec![store_error(1), store_error(2)]);

    sink.clear();
    assert!(sink.is_empty());
}

#[test]
fn test_in_memory_sink_drops_oldest() {
    let sink = InMemoryErrorSink::new(3);
    for n in 0..5 {
        sink.report(&store_error(n));
    }
    assert_eq!(sink.errors(), vec![store_error(2), store_error(3), store_error(4)]);
}

#[test]
fn test_zero_capacity_sink_keeps_nothing() {
    let sink = InMemoryErrorSink::new(0);
    sink.report(&store_error(1));
    assert!(sink.is_empty());
}

#[test]
fn test_tracing_sink_accepts_every_kind() {
    let sink = TracingErrorSink;
    sink.report(&store_error(1));
    sink.report(&SchedulerError::Overrun {
        task_name: "report".to_string(),
        task_id: 1,
        completes_within_ms: 10,
    });
}

#[test]
fn test_guarded_sink_forwards_and_survives_panics() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&seen);
    let flaky = GuardedErrorSink::new(Arc::new(move |e: &SchedulerError| {
        captured.lock().push(e.clone());
        if captured.lock().len() == 1 {
            panic!("first report explodes");
        }
    }));

    flaky.report(&store_error(1));
    flaky.report(&store_error(2));

    assert_eq!(*seen.lock(), vec![store_error(1), store_error(2)]);
}
