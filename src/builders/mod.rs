//! Builders to construct schedulers and stores from configuration.

pub mod scheduler_builder;
pub mod store_builder;

pub use scheduler_builder::SchedulerBuilder;
pub use store_builder::build_store;
