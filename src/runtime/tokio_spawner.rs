//! Tokio runtime spawner implementation.

use std::future::Future;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Tokio-based spawner that runs dispatcher work on a tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioSpawner {
    handle: Handle,
}

impl TokioSpawner {
    /// Create a spawner from a tokio runtime handle.
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Create a spawner bound to the runtime the caller is running on.
    ///
    /// Returns `None` outside a tokio runtime.
    #[must_use]
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    /// Spawn a future, returning its join handle.
    ///
    /// A panic inside `fut` is reported through the join handle and never
    /// unwinds into the caller.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(fut)
    }

    /// The underlying runtime handle.
    #[must_use]
    pub const fn handle(&self) -> &Handle {
        &self.handle
    }
}
