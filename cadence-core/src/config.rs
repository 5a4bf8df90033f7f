//! Scheduler configuration.
//!
//! Every field has a default, and the struct deserializes with `#[serde(default)]`,
//! so a partial TOML file overrides only the keys it names. Call
//! [`SchedulerConfig::validate`] before running anything; the orchestrator does.

use chrono::Duration;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};
use crate::time::parse_timezone;

const WEIGHT_TOLERANCE: f64 = 1e-6;
const MAX_BUFFER_MINUTES: i64 = 24 * 60;

/// A daily window in local wall-clock hours, `[start_hour, end_hour)`.
/// `end_hour` may be 24 (midnight).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl DailyWindow {
    pub const fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    pub const fn whole_day() -> Self {
        Self::new(0, 24)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.start_hour >= self.end_hour || self.end_hour > 24 {
            return Err(SchedulerError::InvalidConfiguration(format!(
                "{name} must satisfy start_hour < end_hour <= 24, got {}..{}",
                self.start_hour, self.end_hour
            )));
        }
        Ok(())
    }
}

/// Urgency cut-offs for the preferred-daypart table. A score strictly above a
/// threshold selects that tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrgencyTiers {
    pub early_morning: f64,
    pub morning: f64,
    pub midday: f64,
}

/// With the default weights, a priority-5 task due in under a day scores about
/// 0.71, which lands in the morning tier. Lower `early_morning` to 0.7 to move
/// such tasks to the early-morning slot.
impl Default for UrgencyTiers {
    fn default() -> Self {
        Self {
            early_morning: 0.8,
            morning: 0.6,
            midday: 0.4,
        }
    }
}

/// Local start hour of each daypart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaypartHours {
    pub early_morning: u32,
    pub morning: u32,
    pub midday: u32,
    pub afternoon: u32,
}

impl Default for DaypartHours {
    fn default() -> Self {
        Self {
            early_morning: 9,
            morning: 10,
            midday: 12,
            afternoon: 14,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub deadline_weight: f64,
    pub priority_weight: f64,

    /// Default IANA timezone when a snapshot does not carry one.
    pub timezone: String,

    pub working_window: DailyWindow,
    /// Window opened to critical tasks once the working window cannot hold them.
    pub extended_window: DailyWindow,

    pub search_horizon_days: u32,

    /// Gap kept between consecutive tasks.
    pub min_buffer_minutes: i64,

    pub urgency_tiers: UrgencyTiers,
    pub daypart_hours: DaypartHours,

    /// Above this urgency a task may use the extended window.
    pub critical_threshold: f64,
    /// Above this urgency the buffer is scaled by `high_urgency_buffer_factor`.
    pub high_threshold: f64,
    pub high_urgency_buffer_factor: f64,

    /// Consecutive deadlines closer than this share a proportional-allocation group.
    pub deadline_proximity_hours: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            deadline_weight: 0.6,
            priority_weight: 0.4,
            timezone: "UTC".to_string(),
            working_window: DailyWindow::new(9, 18),
            extended_window: DailyWindow::new(7, 22),
            search_horizon_days: 7,
            min_buffer_minutes: 10,
            urgency_tiers: UrgencyTiers::default(),
            daypart_hours: DaypartHours::default(),
            critical_threshold: 0.9,
            high_threshold: 0.7,
            high_urgency_buffer_factor: 0.5,
            deadline_proximity_hours: 2.0,
        }
    }
}

impl SchedulerConfig {
    pub fn with_timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = tz.into();
        self
    }

    pub fn with_weights(mut self, deadline_weight: f64, priority_weight: f64) -> Self {
        self.deadline_weight = deadline_weight;
        self.priority_weight = priority_weight;
        self
    }

    pub fn with_buffer_minutes(mut self, minutes: i64) -> Self {
        self.min_buffer_minutes = minutes;
        self
    }

    pub fn with_urgency_tiers(mut self, tiers: UrgencyTiers) -> Self {
        self.urgency_tiers = tiers;
        self
    }

    pub fn min_buffer(&self) -> Duration {
        Duration::minutes(self.min_buffer_minutes)
    }

    pub fn tz(&self) -> Result<Tz> {
        parse_timezone(&self.timezone)
    }

    /// Reject anything that would make a run meaningless. Nothing is clamped.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(SchedulerError::InvalidConfiguration(msg));

        for (name, w) in [
            ("deadline_weight", self.deadline_weight),
            ("priority_weight", self.priority_weight),
        ] {
            if !w.is_finite() || !(0.0..=1.0).contains(&w) {
                return invalid(format!("{name} must be within 0..=1, got {w}"));
            }
        }
        let sum = self.deadline_weight + self.priority_weight;
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return invalid(format!("deadline_weight + priority_weight must equal 1.0, got {sum}"));
        }

        self.tz()?;
        self.working_window.validate("working_window")?;
        self.extended_window.validate("extended_window")?;

        if self.search_horizon_days == 0 || self.search_horizon_days > 366 {
            return invalid(format!(
                "search_horizon_days must be 1..=366, got {}",
                self.search_horizon_days
            ));
        }
        if !(0..=MAX_BUFFER_MINUTES).contains(&self.min_buffer_minutes) {
            return invalid(format!(
                "min_buffer_minutes must be 0..={MAX_BUFFER_MINUTES}, got {}",
                self.min_buffer_minutes
            ));
        }

        let t = self.urgency_tiers;
        let in_unit = |x: f64| x.is_finite() && (0.0..=1.0).contains(&x);
        if !(in_unit(t.early_morning) && in_unit(t.morning) && in_unit(t.midday)) {
            return invalid("urgency_tiers must lie within 0..=1".to_string());
        }
        if !(t.early_morning > t.morning && t.morning > t.midday) {
            return invalid(format!(
                "urgency_tiers must be strictly descending, got {} / {} / {}",
                t.early_morning, t.morning, t.midday
            ));
        }

        let d = self.daypart_hours;
        if [d.early_morning, d.morning, d.midday, d.afternoon]
            .iter()
            .any(|h| *h >= 24)
        {
            return invalid("daypart_hours must be 0..=23".to_string());
        }

        if !in_unit(self.critical_threshold) || !in_unit(self.high_threshold) {
            return invalid("critical_threshold and high_threshold must lie within 0..=1".to_string());
        }
        if self.high_threshold > self.critical_threshold {
            return invalid(format!(
                "high_threshold ({}) must not exceed critical_threshold ({})",
                self.high_threshold, self.critical_threshold
            ));
        }
        let f = self.high_urgency_buffer_factor;
        if !f.is_finite() || f <= 0.0 || f > 1.0 {
            return invalid(format!("high_urgency_buffer_factor must be within (0, 1], got {f}"));
        }

        let p = self.deadline_proximity_hours;
        if !p.is_finite() || p < 0.0 {
            return invalid(format!("deadline_proximity_hours must be >= 0, got {p}"));
        }

        Ok(())
    }
}
