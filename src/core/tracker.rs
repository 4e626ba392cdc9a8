//! In-flight accounting for admission control.
//!
//! The tracker counts running tasks globally and per task type. Releases are
//! edge-triggered: [`DispatchTracker::track_task_stopped`] reports whether a cap
//! went from saturated to available, which is the only moment a re-poll helps.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
struct TrackerState {
    running: usize,
    per_task: HashMap<String, usize>,
    task_caps: HashMap<String, usize>,
}

impl TrackerState {
    fn is_task_saturated(&self, name: &str) -> bool {
        self.task_caps
            .get(name)
            .is_some_and(|cap| self.per_task.get(name).copied().unwrap_or(0) >= *cap)
    }
}

/// Which caps a finishing task freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapacityRelease {
    /// The global cap went from saturated to available.
    pub global_freed: bool,
    /// The task type's cap went from saturated to available.
    pub task_freed: bool,
}

impl CapacityRelease {
    /// Whether any cap was freed.
    #[must_use]
    pub const fn any(self) -> bool {
        self.global_freed || self.task_freed
    }
}

/// Point-in-time view of the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    /// Tasks currently running.
    pub running: usize,
    /// Global cap.
    pub max_concurrent_tasks: usize,
    /// Running count per task type, for types with at least one running task.
    pub per_task: HashMap<String, usize>,
    /// Task types currently at their cap.
    pub saturated: Vec<String>,
}

/// Tracks running tasks against the global and per-type caps.
#[derive(Debug)]
pub struct DispatchTracker {
    max_concurrent_tasks: usize,
    state: Mutex<TrackerState>,
}

impl DispatchTracker {
    /// Create a tracker with a global cap (at least 1).
    #[must_use]
    pub fn new(max_concurrent_tasks: usize) -> Self {
        Self {
            max_concurrent_tasks: max_concurrent_tasks.max(1),
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Global cap.
    #[must_use]
    pub const fn max_concurrent_tasks(&self) -> usize {
        self.max_concurrent_tasks
    }

    /// Register a task type and its optional cap.
    pub fn add_task_definition(&self, name: &str, max_concurrent_tasks: Option<u32>) {
        let mut state = self.state.lock();
        match max_concurrent_tasks {
            Some(cap) => {
                state.task_caps.insert(name.to_owned(), cap as usize);
            }
            None => {
                state.task_caps.remove(name);
            }
        }
    }

    /// Count a task as running.
    pub fn track_task_started(&self, name: &str) {
        let mut state = self.state.lock();
        state.running += 1;
        *state.per_task.entry(name.to_owned()).or_insert(0) += 1;
        tracing::trace!(
            "task type {} started ({} running globally)",
            name,
            state.running
        );
    }

    /// Count a task as stopped and report which caps it freed.
    pub fn track_task_stopped(&self, name: &str) -> CapacityRelease {
        let mut state = self.state.lock();
        let was_global_saturated = state.running >= self.max_concurrent_tasks;
        let was_task_saturated = state.is_task_saturated(name);

        state.running = state.running.saturating_sub(1);
        if let Some(count) = state.per_task.get_mut(name) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.per_task.remove(name);
            }
        }

        let release = CapacityRelease {
            global_freed: was_global_saturated && state.running < self.max_concurrent_tasks,
            task_freed: was_task_saturated && !state.is_task_saturated(name),
        };
        tracing::trace!(
            "task type {} stopped ({} running globally, {:?})",
            name,
            state.running,
            release
        );
        release
    }

    /// Whether the global cap is reached.
    #[must_use]
    pub fn reached_max_capacity(&self) -> bool {
        self.state.lock().running >= self.max_concurrent_tasks
    }

    /// Whether the cap of task type `name` is reached.
    #[must_use]
    pub fn reached_max_capacity_for_task(&self, name: &str) -> bool {
        self.state.lock().is_task_saturated(name)
    }

    /// Task types currently at their cap, sorted by name.
    #[must_use]
    pub fn task_names_at_capacity(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut names: Vec<String> = state
            .task_caps
            .keys()
            .filter(|name| state.is_task_saturated(name))
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Number of running tasks.
    #[must_use]
    pub fn running(&self) -> usize {
        self.state.lock().running
    }

    /// Capture the current counters.
    #[must_use]
    pub fn snapshot(&self) -> TrackerSnapshot {
        let state = self.state.lock();
        let mut saturated: Vec<String> = state
            .task_caps
            .keys()
            .filter(|name| state.is_task_saturated(name))
            .cloned()
            .collect();
        saturated.sort();
        TrackerSnapshot {
            running: state.running,
            max_concurrent_tasks: self.max_concurrent_tasks,
            per_task: state.per_task.clone(),
            saturated,
        }
    }
}
