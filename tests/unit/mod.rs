//! Unit tests for individual components

mod error_sink_test;
mod config_test;
mod util_test;
mod runtime_test;
mod tracker_test;
