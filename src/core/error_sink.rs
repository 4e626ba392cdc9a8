//! Error sink implementations.
//!
//! Every internally handled failure is reported to one sink. The engine wraps
//! the user's sink in a [`GuardedErrorSink`] so that a panicking sink can never
//! break the poll loop.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::SchedulerError;

/// Error sink abstraction.
pub trait ErrorSink: Send + Sync {
    /// Report one error.
    fn report(&self, error: &SchedulerError);
}

impl<F> ErrorSink for F
where
    F: Fn(&SchedulerError) + Send + Sync,
{
    fn report(&self, error: &SchedulerError) {
        self(error);
    }
}

/// Default sink: logs every error through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, error: &SchedulerError) {
        if error.is_informational() {
            tracing::warn!(task = error.task_name().unwrap_or_default(), "{error}");
        } else {
            tracing::error!(task = error.task_name().unwrap_or_default(), "{error}");
        }
    }
}

/// In-memory sink with a bounded buffer, for tests and dev.
pub struct InMemoryErrorSink {
    errors: Mutex<VecDeque<SchedulerError>>,
    max_errors: usize,
}

impl InMemoryErrorSink {
    /// Create a sink keeping at most `max_errors` of the latest reports.
    #[must_use]
    pub fn new(max_errors: usize) -> Self {
        Self {
            errors: Mutex::new(VecDeque::with_capacity(max_errors.min(1024))),
            max_errors,
        }
    }

    /// Snapshot of the stored errors, oldest first.
    #[must_use]
    pub fn errors(&self) -> Vec<SchedulerError> {
        self.errors.lock().iter().cloned().collect()
    }

    /// Number of stored errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    /// Whether nothing was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }

    /// Drop every stored error.
    pub fn clear(&self) {
        self.errors.lock().clear();
    }
}

impl Default for InMemoryErrorSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl ErrorSink for InMemoryErrorSink {
    fn report(&self, error: &SchedulerError) {
        let mut errors = self.errors.lock();
        if self.max_errors == 0 {
            return;
        }
        if errors.len() >= self.max_errors {
            errors.pop_front();
        }
        errors.push_back(error.clone());
    }
}

/// Wraps a sink so that its failures are contained and logged.
#[derive(Clone)]
pub struct GuardedErrorSink {
    inner: Arc<dyn ErrorSink>,
}

impl GuardedErrorSink {
    /// Guard `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn ErrorSink>) -> Self {
        Self { inner }
    }

    /// Report to the wrapped sink, swallowing any panic it raises.
    pub fn report(&self, error: &SchedulerError) {
        tracing::debug!("reporting scheduler error: {}", error);
        if catch_unwind(AssertUnwindSafe(|| self.inner.report(error))).is_err() {
            tracing::error!("error sink panicked while reporting: {}", error);
        }
    }
}

impl std::fmt::Debug for GuardedErrorSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedErrorSink").finish_non_exhaustive()
    }
}
