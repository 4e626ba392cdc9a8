//! Subscriber setup for binaries and test harnesses.
//!
//! The scheduler only emits `tracing` events, all under the
//! `prometheus_task_scheduler` target. Per-task dispatch is logged at `debug`
//! and recovered store failures at `warn`.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str = "warn,prometheus_task_scheduler=info";

/// Install a formatted subscriber filtered by `RUST_LOG`, falling back to
/// [`DEFAULT_LOG_FILTER`]. Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    init_tracing_with(scheduler_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref()));
}

/// Install a formatted subscriber with an explicit filter.
pub fn init_tracing_with(filter: EnvFilter) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Parse `directives`, or [`DEFAULT_LOG_FILTER`] when they are absent or invalid.
#[must_use]
pub fn scheduler_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}
