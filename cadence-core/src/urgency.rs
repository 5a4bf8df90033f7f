//! Urgency scoring and the tables keyed on it.
//!
//! `urgency = deadline_weight * deadline_term + priority_weight * priority_term`
//! where `deadline_term = 1 / (1 + hours_left / 24)` and `priority_term = priority / 5`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{DaypartHours, SchedulerConfig, UrgencyTiers};
use crate::error::{Result, SchedulerError};
use crate::task::{MAX_PRIORITY, MIN_PRIORITY, Task};
use crate::time::hours_in;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UrgencyScorer {
    deadline_weight: f64,
    priority_weight: f64,
}

impl UrgencyScorer {
    pub fn new(deadline_weight: f64, priority_weight: f64) -> Result<Self> {
        if !(deadline_weight >= 0.0 && priority_weight >= 0.0)
            || ((deadline_weight + priority_weight) - 1.0).abs() > 1e-6
        {
            return Err(SchedulerError::InvalidConfiguration(format!(
                "urgency weights must be non-negative and sum to 1.0, got {deadline_weight} + {priority_weight}"
            )));
        }
        Ok(Self {
            deadline_weight,
            priority_weight,
        })
    }

    pub fn from_config(config: &SchedulerConfig) -> Result<Self> {
        Self::new(config.deadline_weight, config.priority_weight)
    }

    /// 1.0 at or past the deadline, falling towards 0 for distant deadlines.
    pub fn deadline_term(deadline: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let hours_left = hours_in(deadline - now);
        if hours_left <= 0.0 {
            return 1.0;
        }
        1.0 / (1.0 + hours_left / 24.0)
    }

    pub fn priority_term(priority: i32) -> f64 {
        priority.clamp(MIN_PRIORITY, MAX_PRIORITY) as f64 / MAX_PRIORITY as f64
    }

    pub fn score(&self, task: &Task, now: DateTime<Utc>) -> f64 {
        let urgency = self.deadline_weight * Self::deadline_term(task.deadline, now)
            + self.priority_weight * Self::priority_term(task.priority);
        urgency.clamp(0.0, 1.0)
    }
}

/// Preferred part of the day for a task's start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Daypart {
    EarlyMorning,
    Morning,
    Midday,
    Afternoon,
}

impl Daypart {
    pub fn for_urgency(urgency: f64, tiers: &UrgencyTiers) -> Self {
        if urgency > tiers.early_morning {
            Self::EarlyMorning
        } else if urgency > tiers.morning {
            Self::Morning
        } else if urgency > tiers.midday {
            Self::Midday
        } else {
            Self::Afternoon
        }
    }

    pub fn start_hour(self, hours: &DaypartHours) -> u32 {
        match self {
            Self::EarlyMorning => hours.early_morning,
            Self::Morning => hours.morning,
            Self::Midday => hours.midday,
            Self::Afternoon => hours.afternoon,
        }
    }
}

impl std::fmt::Display for Daypart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EarlyMorning => write!(f, "early morning"),
            Self::Morning => write!(f, "morning"),
            Self::Midday => write!(f, "midday"),
            Self::Afternoon => write!(f, "afternoon"),
        }
    }
}

/// Pressure band that changes how the slot search behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyBand {
    Normal,
    /// Reduced buffer between consecutive tasks.
    High,
    /// Reduced buffer, and extended hours before searching further out.
    Critical,
}

impl UrgencyBand {
    pub fn for_urgency(urgency: f64, config: &SchedulerConfig) -> Self {
        if urgency > config.critical_threshold {
            Self::Critical
        } else if urgency > config.high_threshold {
            Self::High
        } else {
            Self::Normal
        }
    }
}
