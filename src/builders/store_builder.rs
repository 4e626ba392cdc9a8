//! Build the configured store backend.

use std::sync::Arc;

use crate::config::{SchedulerConfig, StoreBackendConfig};
use crate::core::{SchedulerError, TaskStore};
use crate::infra::store::{FileTaskStore, MemoryTaskStore};
use crate::util::clock::Clock;

/// Build the store backend selected by `cfg.store`.
///
/// # Errors
///
/// Returns a setup error if the configuration is invalid or the backend
/// cannot be opened.
pub fn build_store(
    cfg: &SchedulerConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn TaskStore>, SchedulerError> {
    cfg.validate()?;
    match &cfg.store {
        StoreBackendConfig::InMemory => {
            tracing::debug!("using in-memory task store");
            Ok(Arc::new(MemoryTaskStore::with_clock(clock)))
        }
        StoreBackendConfig::File { path, stream } => {
            tracing::debug!("using file task store at {}", path.display());
            Ok(Arc::new(FileTaskStore::open_with_clock(path, stream.clone(), clock)?))
        }
    }
}
