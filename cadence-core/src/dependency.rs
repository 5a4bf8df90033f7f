//! Dependency resolver: graph validation and per-task eligibility.
//!
//! Each task has at most one immediate predecessor. Eligibility only looks at that
//! predecessor's status (never the transitive chain):
//!
//! | task status            | dependency            | result                      |
//! |------------------------|-----------------------|-----------------------------|
//! | completed / overdue    | any                   | `Inactive` (never placed)   |
//! | pending / in_progress  | unknown id            | `Excluded(InvalidDependency)` |
//! | pending / in_progress  | chain returns to self | `Excluded(ExcludedCycle)`   |
//! | pending / in_progress  | none                  | `Eligible`                  |
//! | pending / in_progress  | completed or overdue  | `Eligible`                  |
//! | pending / in_progress  | pending / in_progress | `Blocked`                   |
//!
//! Overdue predecessors do not block, so a stalled upstream task cannot freeze the
//! rest of its chain.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::UnscheduledReason;
use crate::task::{Task, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Eligibility {
    Eligible { not_before: DateTime<Utc> },
    Blocked { on: String },
    Excluded { reason: UnscheduledReason },
    Inactive { status: TaskStatus },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible { .. })
    }
}

/// A structural problem found by the validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyIssue {
    pub task_id: String,
    pub reason: UnscheduledReason,
}

/// Result of one resolver pass, in snapshot order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyReport {
    entries: Vec<(String, Eligibility)>,
    issues: Vec<DependencyIssue>,
}

impl DependencyReport {
    pub fn get(&self, task_id: &str) -> Option<&Eligibility> {
        self.entries
            .iter()
            .find(|(id, _)| id == task_id)
            .map(|(_, e)| e)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Eligibility)> {
        self.entries.iter().map(|(id, e)| (id.as_str(), e))
    }

    /// Every graph problem, including ones on tasks that are no longer active.
    pub fn issues(&self) -> &[DependencyIssue] {
        &self.issues
    }

    pub fn eligible_ids(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, e)| e.is_eligible())
            .map(|(id, _)| id)
            .collect()
    }
}

pub struct DependencyResolver<'a> {
    tasks: &'a [Task],
    index: HashMap<&'a str, usize>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(tasks: &'a [Task]) -> Self {
        let index = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.as_str(), i))
            .collect();
        Self { tasks, index }
    }

    pub fn task(&self, id: &str) -> Option<&'a Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    /// Immediate predecessor, if it exists in the snapshot.
    pub fn dependency_of(&self, id: &str) -> Option<&'a Task> {
        let dep = self.task(id)?.dependency.as_deref()?;
        self.task(dep)
    }

    /// Tasks whose immediate predecessor is `id`, in snapshot order.
    pub fn dependents_of(&self, id: &str) -> Vec<&'a Task> {
        self.tasks
            .iter()
            .filter(|t| t.dependency.as_deref() == Some(id))
            .collect()
    }

    /// Walk the single-parent chain from `task`. Bounded by the task count, so a
    /// cycle that does not pass through `task` still terminates.
    pub fn is_cyclic(&self, task: &Task) -> bool {
        let mut current = task.dependency.as_deref();
        for _ in 0..self.tasks.len() {
            let Some(id) = current else { return false };
            if id == task.id {
                return true;
            }
            current = self.task(id).and_then(|t| t.dependency.as_deref());
        }
        false
    }

    /// Validation pass over every task, independent of status.
    pub fn validate(&self) -> Vec<DependencyIssue> {
        let mut issues = Vec::new();
        for task in self.tasks {
            let Some(dep) = task.dependency.as_deref() else { continue };
            let reason = if dep != task.id && self.task(dep).is_none() {
                Some(UnscheduledReason::InvalidDependency)
            } else if self.is_cyclic(task) {
                Some(UnscheduledReason::ExcludedCycle)
            } else {
                None
            };
            if let Some(reason) = reason {
                warn!(task = %task.id, dependency = %dep, %reason, "dependency rejected");
                issues.push(DependencyIssue {
                    task_id: task.id.clone(),
                    reason,
                });
            }
        }
        issues
    }

    pub fn resolve(&self, now: DateTime<Utc>) -> DependencyReport {
        let issues = self.validate();
        let issue_for = |id: &str| issues.iter().find(|i| i.task_id == id).map(|i| i.reason);

        let entries = self
            .tasks
            .iter()
            .map(|task| {
                let eligibility = if !task.status.is_schedulable() {
                    Eligibility::Inactive {
                        status: task.status,
                    }
                } else if let Some(reason) = issue_for(&task.id) {
                    Eligibility::Excluded { reason }
                } else {
                    self.eligibility(task, now)
                };
                (task.id.clone(), eligibility)
            })
            .collect();

        DependencyReport { entries, issues }
    }

    fn eligibility(&self, task: &Task, now: DateTime<Utc>) -> Eligibility {
        let Some(dep) = self.dependency_of(&task.id) else {
            return Eligibility::Eligible { not_before: now };
        };

        if !dep.status.satisfies_dependents() {
            return Eligibility::Blocked { on: dep.id.clone() };
        }

        // Overdue predecessors are satisfied as of their (past) deadline.
        let not_before = [Some(now), dep.satisfied_at(), dep_end_if_completed(dep)]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(now);
        Eligibility::Eligible { not_before }
    }
}

fn dep_end_if_completed(dep: &Task) -> Option<DateTime<Utc>> {
    match dep.status {
        TaskStatus::Completed => dep.occupied_interval().map(|iv| iv.end),
        _ => None,
    }
}
