//! Runtime adapters and the registration API surface.

pub mod api;
pub mod tokio_spawner;

pub use api::Scheduler;
pub use tokio_spawner::TokioSpawner;
