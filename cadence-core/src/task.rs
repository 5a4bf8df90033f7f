//! Task model consumed and returned by the scheduling engine.
//!
//! The surrounding system owns tasks; a run works on a [`Snapshot`] copy and only
//! ever writes `start_time` / `end_time`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};
use crate::interval::Interval;

pub const MIN_PRIORITY: i32 = 1;
pub const MAX_PRIORITY: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Overdue,
}

impl TaskStatus {
    /// Only pending and in-progress tasks are ever placed.
    pub fn is_schedulable(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    /// Statuses that satisfy a dependent's dependency.
    pub fn satisfies_dependents(self) -> bool {
        matches!(self, Self::Completed | Self::Overdue)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Overdue => write!(f, "overdue"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub title: String,

    /// 1 (low) ..= 5 (critical).
    pub priority: i32,

    pub deadline: DateTime<Utc>,

    /// Hours.
    pub estimated_duration: f64,

    /// Immediate predecessor only.
    #[serde(default)]
    pub dependency: Option<String>,

    #[serde(default)]
    pub status: TaskStatus,

    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, deadline: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            priority: 3,
            deadline,
            estimated_duration: 1.0,
            dependency: None,
            status: TaskStatus::Pending,
            start_time: None,
            end_time: None,
            created_at: DateTime::<Utc>::default(),
            completed_at: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_duration(mut self, hours: f64) -> Self {
        self.estimated_duration = hours;
        self
    }

    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependency = Some(dependency.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_assignment(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    pub fn completed(mut self, at: DateTime<Utc>) -> Self {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(at);
        self
    }

    /// The committed interval, if both ends are set.
    pub fn interval(&self) -> Option<Interval> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if end >= start => Some(Interval::new(start, end)),
            _ => None,
        }
    }

    pub fn has_assignment(&self) -> bool {
        self.interval().is_some()
    }

    pub fn clear_assignment(&mut self) {
        self.start_time = None;
        self.end_time = None;
    }

    /// Time actually occupied on the calendar. A task completed before its planned
    /// end releases the remainder of its interval.
    pub fn occupied_interval(&self) -> Option<Interval> {
        let iv = self.interval()?;
        match self.completed_at {
            Some(done) if self.status == TaskStatus::Completed && done < iv.end => {
                (done > iv.start).then(|| Interval::new(iv.start, done))
            }
            _ => Some(iv),
        }
    }

    /// Earliest instant at which this task counts as done for its dependents.
    pub fn satisfied_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            TaskStatus::Completed => self.completed_at.or(self.end_time),
            _ => None,
        }
    }

    /// Input checks that abort a run before orchestration begins.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| SchedulerError::InvalidTask {
            task: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id must be non-empty".to_string()));
        }
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.priority) {
            return Err(invalid(format!(
                "priority must be {MIN_PRIORITY}..={MAX_PRIORITY}, got {}",
                self.priority
            )));
        }
        if !self.estimated_duration.is_finite() || self.estimated_duration <= 0.0 {
            return Err(invalid(format!(
                "estimated_duration must be a positive number of hours, got {}",
                self.estimated_duration
            )));
        }
        if self.start_time.is_some() != self.end_time.is_some() {
            return Err(invalid("start_time and end_time must be set together".to_string()));
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if end < start {
                return Err(invalid("end_time precedes start_time".to_string()));
            }
        }
        Ok(())
    }
}

/// One user's working set, as handed to a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub user_id: String,

    /// IANA timezone for this user; falls back to the configured default.
    #[serde(default)]
    pub timezone: Option<String>,

    pub tasks: Vec<Task>,

    /// Fixed commitments that are not tasks (meetings, blocked time).
    #[serde(default)]
    pub busy: Vec<Interval>,
}

impl Snapshot {
    pub fn new(user_id: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            user_id: user_id.into(),
            timezone: None,
            tasks,
            busy: Vec::new(),
        }
    }

    pub fn with_busy(mut self, busy: Vec<Interval>) -> Self {
        self.busy = busy;
        self
    }

    pub fn with_timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = Some(tz.into());
        self
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for task in &self.tasks {
            task.validate()?;
            if !seen.insert(task.id.as_str()) {
                return Err(SchedulerError::DuplicateTask(task.id.clone()));
            }
        }
        for (idx, busy) in self.busy.iter().enumerate() {
            if busy.end < busy.start {
                return Err(SchedulerError::InvalidConfiguration(format!(
                    "busy[{idx}]: end precedes start"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn deadline() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 3, 17, 0, 0).unwrap()
    }

    #[test]
    fn status_uses_snake_case_on_the_wire() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let back: TaskStatus = serde_json::from_str("\"overdue\"").unwrap();
        assert_eq!(back, TaskStatus::Overdue);
    }

    #[test]
    fn minimal_json_task_fills_defaults() {
        let json = r#"{"id":"t1","priority":4,"deadline":"2026-03-03T17:00:00Z","estimated_duration":2.5}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.dependency.is_none());
        assert!(!task.has_assignment());
        task.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_priority_and_duration() {
        assert!(Task::new("a", "a", deadline()).with_priority(0).validate().is_err());
        assert!(Task::new("a", "a", deadline()).with_priority(-2).validate().is_err());
        assert!(Task::new("a", "a", deadline()).with_priority(6).validate().is_err());
        assert!(Task::new("a", "a", deadline()).with_duration(0.0).validate().is_err());
        assert!(Task::new("a", "a", deadline()).with_duration(-1.0).validate().is_err());
        assert!(Task::new("a", "a", deadline()).with_duration(f64::NAN).validate().is_err());
    }

    #[test]
    fn half_set_assignment_is_invalid() {
        let mut t = Task::new("a", "a", deadline());
        t.start_time = Some(deadline());
        assert!(t.validate().is_err());
    }

    #[test]
    fn early_completion_releases_rest_of_interval() {
        let start = deadline() - Duration::hours(4);
        let end = start + Duration::hours(2);
        let done = start + Duration::hours(1);
        let t = Task::new("a", "a", deadline())
            .with_assignment(start, end)
            .completed(done);
        assert_eq!(t.occupied_interval(), Some(Interval::new(start, done)));
        assert_eq!(t.satisfied_at(), Some(done));
    }

    #[test]
    fn snapshot_rejects_duplicate_ids() {
        let snap = Snapshot::new(
            "u1",
            vec![Task::new("a", "x", deadline()), Task::new("a", "y", deadline())],
        );
        assert!(matches!(snap.validate(), Err(SchedulerError::DuplicateTask(id)) if id == "a"));
    }
}
