//! Conflict resolution between tasks competing for the same time.
//!
//! Ordering: higher urgency first, then earlier deadline, then earlier creation,
//! then snapshot position. The placement loop walks tasks in exactly this order, so
//! a later task can only lose a gap to one that outranks it. The explicit bump case
//! (a new task displacing an already-placed one) goes through [`bump_candidates`].

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::interval::Interval;
use crate::task::Task;

/// Everything the tie-break chain needs, detached from the task borrow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankKey {
    pub task_id: String,
    pub urgency: f64,
    pub deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Position in the snapshot; last resort so the order is total.
    pub position: usize,
}

impl RankKey {
    pub fn new(task: &Task, urgency: f64, position: usize) -> Self {
        Self {
            task_id: task.id.clone(),
            urgency,
            deadline: task.deadline,
            created_at: task.created_at,
            position,
        }
    }

    /// `Ordering::Less` means `self` is placed first.
    pub fn placement_cmp(&self, other: &Self) -> Ordering {
        other
            .urgency
            .total_cmp(&self.urgency)
            .then_with(|| self.deadline.cmp(&other.deadline))
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.position.cmp(&other.position))
    }

    pub fn outranks(&self, other: &Self) -> bool {
        self.placement_cmp(other) == Ordering::Less
    }
}

/// `(winner, loser)` for two tasks wanting the same slot.
pub fn resolve<'k>(a: &'k RankKey, b: &'k RankKey) -> (&'k RankKey, &'k RankKey) {
    if b.outranks(a) { (b, a) } else { (a, b) }
}

/// Sort anything carrying a [`RankKey`] into placement order.
pub fn placement_order<T>(items: &mut [T], key: impl Fn(&T) -> &RankKey) {
    items.sort_by(|a, b| key(a).placement_cmp(key(b)));
}

/// A placed task that may be displaced.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub key: RankKey,
    pub interval: Interval,
}

/// Indices of claims the newcomer outranks, lowest-ranked first. The caller tries
/// them in order and displaces the first one whose removal opens a fitting slot.
pub fn bump_candidates(claims: &[Claim], newcomer: &RankKey) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..claims.len())
        .filter(|&i| newcomer.outranks(&claims[i].key))
        .collect();
    idx.sort_by(|&a, &b| claims[b].key.placement_cmp(&claims[a].key));
    idx
}
