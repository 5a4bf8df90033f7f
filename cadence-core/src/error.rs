//! Error types.
//!
//! `SchedulerError` aborts a whole run and is only produced before orchestration
//! starts (bad configuration, malformed snapshot). Per-task failures are never
//! errors: they are reported as an [`UnscheduledReason`] next to the task id.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid task '{task}': {reason}")]
    InvalidTask { task: String, reason: String },

    #[error("duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("invalid local datetime '{input}': {reason}")]
    InvalidLocalTime { input: String, reason: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Why a task came out of a run without an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnscheduledReason {
    /// The immediate dependency is neither completed nor overdue.
    Blocked,
    /// The task is reachable from itself through its dependency chain.
    ExcludedCycle,
    /// The dependency names a task that is not in this user's snapshot.
    InvalidDependency,
    /// The slot search exhausted the horizon.
    NoSlotFound,
}

impl UnscheduledReason {
    /// Exclusions come from graph validation; the task is never considered for placement.
    pub fn is_exclusion(self) -> bool {
        matches!(self, Self::ExcludedCycle | Self::InvalidDependency)
    }
}

impl std::fmt::Display for UnscheduledReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocked => write!(f, "blocked"),
            Self::ExcludedCycle => write!(f, "excluded_cycle"),
            Self::InvalidDependency => write!(f, "invalid_dependency"),
            Self::NoSlotFound => write!(f, "no_slot_found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_wire_names_match_display() {
        for reason in [
            UnscheduledReason::Blocked,
            UnscheduledReason::ExcludedCycle,
            UnscheduledReason::InvalidDependency,
            UnscheduledReason::NoSlotFound,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{reason}\""));
        }
    }

    #[test]
    fn only_graph_failures_are_exclusions() {
        assert!(UnscheduledReason::ExcludedCycle.is_exclusion());
        assert!(UnscheduledReason::InvalidDependency.is_exclusion());
        assert!(!UnscheduledReason::Blocked.is_exclusion());
        assert!(!UnscheduledReason::NoSlotFound.is_exclusion());
    }
}
