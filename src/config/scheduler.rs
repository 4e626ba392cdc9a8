//! Scheduler and store backend configuration structures.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::definition::DefinitionDefaults;
use crate::core::SchedulerError;

const ENV_POLL_AT_LEAST_EVERY_SECS: &str = "TASK_SCHEDULER_POLL_AT_LEAST_EVERY_SECS";
const ENV_MAX_CONCURRENT_TASKS: &str = "TASK_SCHEDULER_MAX_CONCURRENT_TASKS";
const ENV_DEFAULT_COMPLETES_WITHIN_SECS: &str = "TASK_SCHEDULER_DEFAULT_COMPLETES_WITHIN_SECS";
const ENV_DEFAULT_EXECUTION_CONTEXT: &str = "TASK_SCHEDULER_DEFAULT_EXECUTION_CONTEXT";

/// Store backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackendConfig {
    /// In-memory store for development/testing.
    #[default]
    InMemory,
    /// JSON-lines file store.
    File {
        /// Directory holding the store file.
        path: PathBuf,
        /// File stem of the store file.
        stream: String,
    },
}

/// Root scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on the time between two polls, in seconds.
    pub poll_at_least_every_secs: u64,
    /// Global cap on concurrently running tasks.
    pub max_concurrent_tasks: usize,
    /// Deadline for definitions that declare none, in seconds.
    pub default_completes_within_secs: u64,
    /// Execution context for definitions that name none.
    pub default_execution_context: String,
    /// Store backend selection.
    pub store: StoreBackendConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_at_least_every_secs: 60,
            max_concurrent_tasks: 1,
            default_completes_within_secs: 24 * 60 * 60,
            default_execution_context: "main".into(),
            store: StoreBackendConfig::InMemory,
        }
    }
}

impl SchedulerConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Setup`] naming the first invalid value.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.poll_at_least_every_secs == 0 {
            return Err(invalid("poll_at_least_every_secs must be greater than 0"));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(invalid("max_concurrent_tasks must be greater than 0"));
        }
        if self.default_completes_within_secs == 0 {
            return Err(invalid("default_completes_within_secs must be greater than 0"));
        }
        if self.default_execution_context.is_empty() {
            return Err(invalid("default_execution_context must be a non-empty string"));
        }
        if let StoreBackendConfig::File { stream, .. } = &self.store {
            if stream.is_empty() {
                return Err(invalid("file store stream must be a non-empty string"));
            }
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Setup`] on malformed JSON or invalid values.
    pub fn from_json_str(input: &str) -> Result<Self, SchedulerError> {
        let cfg: Self = serde_json::from_str(input)
            .map_err(|e| SchedulerError::Setup(format!("config parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from defaults overlaid with `TASK_SCHEDULER_*`
    /// environment variables, loading a `.env` file first if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Setup`] on unparseable or invalid values.
    pub fn from_env() -> Result<Self, SchedulerError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from defaults overlaid with values from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Setup`] on unparseable or invalid values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SchedulerError> {
        let mut cfg = Self::default();
        if let Some(value) = parse_var(&lookup, ENV_POLL_AT_LEAST_EVERY_SECS)? {
            cfg.poll_at_least_every_secs = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_MAX_CONCURRENT_TASKS)? {
            cfg.max_concurrent_tasks = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_DEFAULT_COMPLETES_WITHIN_SECS)? {
            cfg.default_completes_within_secs = value;
        }
        if let Some(value) = lookup(ENV_DEFAULT_EXECUTION_CONTEXT) {
            cfg.default_execution_context = value;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Ceiling between two polls.
    #[must_use]
    pub const fn poll_at_least_every(&self) -> Duration {
        Duration::from_secs(self.poll_at_least_every_secs)
    }

    /// Defaults applied to task definitions.
    #[must_use]
    pub fn definition_defaults(&self) -> DefinitionDefaults {
        DefinitionDefaults {
            execution_context: self.default_execution_context.clone(),
            completes_within: Duration::from_secs(self.default_completes_within_secs),
        }
    }
}

fn invalid(message: &str) -> SchedulerError {
    SchedulerError::Setup(format!("config invalid: {message}"))
}

fn parse_var<T>(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, SchedulerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| SchedulerError::Setup(format!("{key}={raw:?} is invalid: {e}")))
        })
        .transpose()
}
