//! Proportional allocator for tasks racing toward a shared deadline window.
//!
//! Tasks are grouped by deadline proximity. When a group needs more time than
//! remains before its earliest deadline, every member is shrunk by the same
//! factor `available / required`, so relative shares are preserved and the
//! effective durations add up to exactly what is available. Estimates on the
//! tasks themselves are never touched.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::time::hours_in;

/// Input row for one eligible, not-yet-placed task.
#[derive(Debug, Clone, PartialEq)]
pub struct Demand {
    pub task_id: String,
    pub deadline: DateTime<Utc>,
    pub estimated_hours: f64,
    /// Earliest allowable start (dependency satisfaction or now).
    pub not_before: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GroupDecision {
    /// Enough time; full estimates are used.
    Fits,
    /// Every member runs at `estimated * factor`.
    Shrunk { factor: f64 },
    /// The shared deadline has already passed; place right after now at full length.
    Emergency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadlineGroup {
    pub members: Vec<String>,
    pub deadline: DateTime<Utc>,
    pub required_hours: f64,
    pub available_hours: f64,
    pub decision: GroupDecision,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationPlan {
    pub groups: Vec<DeadlineGroup>,
    effective: HashMap<String, f64>,
    emergency: HashSet<String>,
}

impl AllocationPlan {
    /// Hours to reserve for `task_id` in this run.
    pub fn effective_hours(&self, task_id: &str) -> Option<f64> {
        self.effective.get(task_id).copied()
    }

    pub fn is_emergency(&self, task_id: &str) -> bool {
        self.emergency.contains(task_id)
    }
}

/// Split demands into groups whose consecutive deadlines are at most
/// `proximity_hours` apart. Input order breaks deadline ties.
pub fn group_by_deadline(demands: &[Demand], proximity_hours: f64) -> Vec<Vec<&Demand>> {
    let mut sorted: Vec<&Demand> = demands.iter().collect();
    sorted.sort_by_key(|d| d.deadline);

    let mut groups: Vec<Vec<&Demand>> = Vec::new();
    for demand in sorted {
        let joins_previous = groups
            .last()
            .and_then(|g| g.last())
            .is_some_and(|prev| hours_in(demand.deadline - prev.deadline) <= proximity_hours);

        if joins_previous {
            if let Some(group) = groups.last_mut() {
                group.push(demand);
                continue;
            }
        }
        groups.push(vec![demand]);
    }
    groups
}

/// Build the allocation plan for one run.
pub fn allocate(demands: &[Demand], now: DateTime<Utc>, proximity_hours: f64) -> AllocationPlan {
    let mut plan = AllocationPlan::default();

    for group in group_by_deadline(demands, proximity_hours) {
        let deadline = group.iter().map(|d| d.deadline).min().unwrap_or(now);
        let earliest_start = group
            .iter()
            .map(|d| d.not_before)
            .min()
            .unwrap_or(now)
            .max(now);
        let required_hours: f64 = group.iter().map(|d| d.estimated_hours).sum();
        let available_hours = hours_in(deadline - earliest_start);

        let decision = if available_hours <= 0.0 {
            GroupDecision::Emergency
        } else if group.len() > 1 && required_hours > available_hours {
            GroupDecision::Shrunk {
                factor: available_hours / required_hours,
            }
        } else {
            GroupDecision::Fits
        };

        for demand in &group {
            let hours = match decision {
                GroupDecision::Shrunk { factor } => demand.estimated_hours * factor,
                GroupDecision::Fits | GroupDecision::Emergency => demand.estimated_hours,
            };
            plan.effective.insert(demand.task_id.clone(), hours);
            if decision == GroupDecision::Emergency {
                plan.emergency.insert(demand.task_id.clone());
            }
        }

        if let GroupDecision::Shrunk { factor } = decision {
            info!(
                members = group.len(),
                required_hours,
                available_hours,
                factor,
                "proportional allocation applied"
            );
        }

        plan.groups.push(DeadlineGroup {
            members: group.iter().map(|d| d.task_id.clone()).collect(),
            deadline,
            required_hours,
            available_hours,
            decision,
        });
    }

    plan
}
