//! Schedule orchestrator: one run over one user's snapshot.
//!
//! Pipeline per run:
//! resolve dependencies -> score -> rank -> allocate -> place against the busy set.
//!
//! The busy set is seeded with everything a run does not move: external commitments,
//! in-progress tasks that already hold an interval (pinned), and intervals of
//! completed/overdue tasks that still reach past `now`.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::allocation::{Demand, DeadlineGroup, allocate};
use crate::config::SchedulerConfig;
use crate::conflict::{Claim, RankKey, bump_candidates, placement_order};
use crate::dependency::{DependencyReport, DependencyResolver, Eligibility};
use crate::error::{Result, SchedulerError, UnscheduledReason};
use crate::interval::{BusySet, Interval};
use crate::slot::{PassKind, SlotFinder, SlotMatch, SlotRequest};
use crate::task::{Snapshot, Task, TaskStatus};
use crate::time::{duration_from_hours, hours_in, parse_timezone};
use crate::urgency::{Daypart, UrgencyScorer};

/// A placement produced by a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub task_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Reserved length; below the estimate when the task's deadline group was shrunk.
    pub effective_hours: f64,
    pub urgency: f64,
    pub daypart: Daypart,
    pub pass: PassKind,
    /// Ends after the task's deadline.
    pub at_risk: bool,
    pub emergency: bool,
}

impl Assignment {
    pub fn interval(&self) -> Interval {
        Interval::new(self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Scheduled(Assignment),
    /// Kept its committed interval.
    Pinned { interval: Interval },
    Unscheduled { reason: UnscheduledReason },
    /// Completed or overdue; the run never writes to it.
    Untouched { status: TaskStatus },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    #[serde(flatten)]
    pub outcome: TaskOutcome,
}

/// Result of one run, with per-task outcomes in snapshot order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRun {
    pub user_id: String,
    pub now: DateTime<Utc>,
    pub results: Vec<TaskResult>,
    #[serde(default)]
    pub groups: Vec<DeadlineGroup>,
}

impl ScheduleRun {
    pub fn outcome(&self, task_id: &str) -> Option<&TaskOutcome> {
        self.results
            .iter()
            .find(|r| r.task_id == task_id)
            .map(|r| &r.outcome)
    }

    pub fn assignment(&self, task_id: &str) -> Option<&Assignment> {
        match self.outcome(task_id)? {
            TaskOutcome::Scheduled(a) => Some(a),
            _ => None,
        }
    }

    pub fn assignments(&self) -> impl Iterator<Item = &Assignment> {
        self.results.iter().filter_map(|r| match &r.outcome {
            TaskOutcome::Scheduled(a) => Some(a),
            _ => None,
        })
    }

    pub fn pinned(&self) -> impl Iterator<Item = (&str, Interval)> {
        self.results.iter().filter_map(|r| match r.outcome {
            TaskOutcome::Pinned { interval } => Some((r.task_id.as_str(), interval)),
            _ => None,
        })
    }

    pub fn unscheduled(&self) -> impl Iterator<Item = (&str, UnscheduledReason)> {
        self.results.iter().filter_map(|r| match r.outcome {
            TaskOutcome::Unscheduled { reason } => Some((r.task_id.as_str(), reason)),
            _ => None,
        })
    }

    pub fn at_risk(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments().filter(|a| a.at_risk)
    }

    /// Write the run back into a task list. Tasks the run does not mention are
    /// left alone.
    pub fn apply(&self, tasks: &mut [Task]) {
        for task in tasks.iter_mut() {
            match self.outcome(&task.id) {
                Some(TaskOutcome::Scheduled(a)) => {
                    task.start_time = Some(a.start);
                    task.end_time = Some(a.end);
                }
                Some(TaskOutcome::Pinned { interval }) => {
                    task.start_time = Some(interval.start);
                    task.end_time = Some(interval.end);
                }
                Some(TaskOutcome::Unscheduled { .. }) => task.clear_assignment(),
                Some(TaskOutcome::Untouched { .. }) | None => {}
            }
        }
    }
}

/// Changes from the surrounding system that trigger a fresh run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    Created(Task),
    Updated(Task),
    Completed { id: String, at: DateTime<Utc> },
    Deleted { id: String },
}

impl TaskEvent {
    pub fn task_id(&self) -> &str {
        match self {
            Self::Created(t) | Self::Updated(t) => &t.id,
            Self::Completed { id, .. } | Self::Deleted { id } => id,
        }
    }

    pub fn apply(self, snapshot: &mut Snapshot) -> Result<()> {
        match self {
            Self::Created(mut task) => {
                task.validate()?;
                if snapshot.task(&task.id).is_some() {
                    return Err(SchedulerError::DuplicateTask(task.id));
                }
                task.clear_assignment();
                snapshot.tasks.push(task);
            }
            Self::Updated(mut task) => {
                task.validate()?;
                let slot = snapshot
                    .task_mut(&task.id)
                    .ok_or_else(|| SchedulerError::TaskNotFound(task.id.clone()))?;
                task.clear_assignment();
                *slot = task;
            }
            Self::Completed { id, at } => {
                let task = snapshot
                    .task_mut(&id)
                    .ok_or_else(|| SchedulerError::TaskNotFound(id.clone()))?;
                task.status = TaskStatus::Completed;
                task.completed_at = Some(at);
            }
            Self::Deleted { id } => {
                let before = snapshot.tasks.len();
                snapshot.tasks.retain(|t| t.id != id);
                if snapshot.tasks.len() == before {
                    return Err(SchedulerError::TaskNotFound(id));
                }
                for dependent in snapshot
                    .tasks
                    .iter_mut()
                    .filter(|t| t.dependency.as_deref() == Some(id.as_str()))
                {
                    dependent.dependency = None;
                    dependent.clear_assignment();
                }
            }
        }
        Ok(())
    }
}

/// Eligible task waiting for placement.
struct Candidate {
    position: usize,
    key: RankKey,
    not_before: DateTime<Utc>,
}

pub struct Scheduler {
    config: SchedulerConfig,
    scorer: UrgencyScorer,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        let scorer = UrgencyScorer::from_config(&config)?;
        Ok(Self { config, scorer })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn scorer(&self) -> &UrgencyScorer {
        &self.scorer
    }

    fn timezone(&self, snapshot: &Snapshot) -> Result<Tz> {
        match snapshot.timezone.as_deref() {
            Some(tz) => parse_timezone(tz),
            None => self.config.tz(),
        }
    }

    /// Full re-plan of every pending task in the snapshot.
    pub fn run(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> Result<ScheduleRun> {
        snapshot.validate()?;
        let tz = self.timezone(snapshot)?;
        info!(user = %snapshot.user_id, tasks = snapshot.tasks.len(), %now, "schedule run started");

        let report = DependencyResolver::new(&snapshot.tasks).resolve(now);
        let mut busy = seed_busy(snapshot, &report, now);
        let mut outcomes: Vec<Option<TaskOutcome>> = vec![None; snapshot.tasks.len()];
        let mut candidates = Vec::new();

        for (position, task) in snapshot.tasks.iter().enumerate() {
            if let Some(interval) = held_interval(task, &report) {
                outcomes[position] = Some(TaskOutcome::Pinned { interval });
                continue;
            }
            match report.get(&task.id) {
                Some(Eligibility::Eligible { not_before }) => {
                    let urgency = self.scorer.score(task, now);
                    candidates.push(Candidate {
                        position,
                        key: RankKey::new(task, urgency, position),
                        not_before: *not_before,
                    });
                }
                Some(other) => outcomes[position] = Some(ineligible_outcome(&task.id, other)),
                None => {
                    outcomes[position] = Some(TaskOutcome::Untouched {
                        status: task.status,
                    })
                }
            }
        }

        placement_order(&mut candidates, |c| &c.key);

        let demands: Vec<Demand> = candidates
            .iter()
            .map(|c| {
                let task = &snapshot.tasks[c.position];
                Demand {
                    task_id: task.id.clone(),
                    deadline: task.deadline,
                    estimated_hours: task.estimated_duration,
                    not_before: c.not_before,
                }
            })
            .collect();
        let plan = allocate(&demands, now, self.config.deadline_proximity_hours);

        let finder = SlotFinder::new(&self.config, tz);
        for candidate in &candidates {
            let task = &snapshot.tasks[candidate.position];
            let hours = plan
                .effective_hours(&task.id)
                .unwrap_or(task.estimated_duration);
            let request = SlotRequest {
                duration: duration_from_hours(hours),
                urgency: candidate.key.urgency,
                not_before: candidate.not_before,
                deadline: task.deadline,
                emergency: plan.is_emergency(&task.id),
            };
            outcomes[candidate.position] = Some(self.place(&finder, task, &request, &mut busy, now));
        }

        let run = ScheduleRun {
            user_id: snapshot.user_id.clone(),
            now,
            results: collect_results(snapshot, outcomes),
            groups: plan.groups,
        };
        info!(
            user = %run.user_id,
            scheduled = run.assignments().count(),
            unscheduled = run.unscheduled().count(),
            at_risk = run.at_risk().count(),
            "schedule run finished"
        );
        Ok(run)
    }

    /// Place one task without moving anything already placed, unless the task
    /// outranks a pending task whose interval is in the way. The displaced task is
    /// re-placed at its previous length.
    pub fn insert(&self, snapshot: &Snapshot, task_id: &str, now: DateTime<Utc>) -> Result<ScheduleRun> {
        snapshot.validate()?;
        let tz = self.timezone(snapshot)?;
        let position = snapshot
            .tasks
            .iter()
            .position(|t| t.id == task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.to_string()))?;

        let report = DependencyResolver::new(&snapshot.tasks).resolve(now);
        let mut busy = seed_busy(snapshot, &report, now);
        let mut outcomes: Vec<Option<TaskOutcome>> = vec![None; snapshot.tasks.len()];
        let mut claims: Vec<Claim> = Vec::new();
        let mut claim_positions: Vec<usize> = Vec::new();

        for (i, task) in snapshot.tasks.iter().enumerate() {
            if i == position {
                continue;
            }
            if let Some(excluded @ Eligibility::Excluded { .. }) = report.get(&task.id) {
                outcomes[i] = Some(ineligible_outcome(&task.id, excluded));
            } else if let Some(interval) = held_interval(task, &report) {
                outcomes[i] = Some(TaskOutcome::Pinned { interval });
            } else if let (TaskStatus::Pending, Some(interval)) = (task.status, task.interval()) {
                busy.insert(interval);
                outcomes[i] = Some(TaskOutcome::Pinned { interval });
                claims.push(Claim {
                    key: RankKey::new(task, self.scorer.score(task, now), i),
                    interval,
                });
                claim_positions.push(i);
            } else {
                outcomes[i] = Some(TaskOutcome::Untouched {
                    status: task.status,
                });
            }
        }

        let task = &snapshot.tasks[position];
        if let Some(interval) = held_interval(task, &report) {
            outcomes[position] = Some(TaskOutcome::Pinned { interval });
            return Ok(self.finish_insert(snapshot, now, outcomes));
        }
        let finder = SlotFinder::new(&self.config, tz);
        let not_before = match report.get(&task.id) {
            Some(Eligibility::Eligible { not_before }) => *not_before,
            Some(other) => {
                outcomes[position] = Some(ineligible_outcome(&task.id, other));
                return Ok(self.finish_insert(snapshot, now, outcomes));
            }
            None => now,
        };

        let key = RankKey::new(task, self.scorer.score(task, now), position);
        let request = self.single_request(task, key.urgency, not_before, task.estimated_duration, now);

        if let Some(found) = finder.find_slot(&request, &busy, now) {
            busy.insert(found.interval);
            outcomes[position] = Some(TaskOutcome::Scheduled(self.assignment(task, found, &request)));
            return Ok(self.finish_insert(snapshot, now, outcomes));
        }

        let Some((found, claim_idx)) = bump(&finder, &request, &key, &claims, &mut busy, now) else {
            warn!(task = %task.id, "no slot found, nothing to displace");
            outcomes[position] = Some(TaskOutcome::Unscheduled {
                reason: UnscheduledReason::NoSlotFound,
            });
            return Ok(self.finish_insert(snapshot, now, outcomes));
        };

        busy.insert(found.interval);
        outcomes[position] = Some(TaskOutcome::Scheduled(self.assignment(task, found, &request)));

        let loser_position = claim_positions[claim_idx];
        let loser = &snapshot.tasks[loser_position];
        let claim = &claims[claim_idx];
        info!(winner = %task.id, loser = %loser.id, "task displaced");

        let loser_not_before = match report.get(&loser.id) {
            Some(Eligibility::Eligible { not_before }) => *not_before,
            _ => now,
        };
        let loser_request = self.single_request(
            loser,
            claim.key.urgency,
            loser_not_before,
            hours_in(claim.interval.duration()),
            now,
        );
        outcomes[loser_position] = Some(self.place(&finder, loser, &loser_request, &mut busy, now));

        Ok(self.finish_insert(snapshot, now, outcomes))
    }

    /// Apply an event to the snapshot, re-run, and write the result back.
    pub fn handle_event(
        &self,
        snapshot: &mut Snapshot,
        event: TaskEvent,
        now: DateTime<Utc>,
    ) -> Result<ScheduleRun> {
        debug!(user = %snapshot.user_id, task = %event.task_id(), "applying task event");
        event.apply(snapshot)?;
        let run = self.run(snapshot, now)?;
        run.apply(&mut snapshot.tasks);
        Ok(run)
    }

    fn single_request(
        &self,
        task: &Task,
        urgency: f64,
        not_before: DateTime<Utc>,
        hours: f64,
        now: DateTime<Utc>,
    ) -> SlotRequest {
        SlotRequest {
            duration: duration_from_hours(hours),
            urgency,
            not_before,
            deadline: task.deadline,
            emergency: task.deadline <= not_before.max(now),
        }
    }

    fn place(
        &self,
        finder: &SlotFinder<'_>,
        task: &Task,
        request: &SlotRequest,
        busy: &mut BusySet,
        now: DateTime<Utc>,
    ) -> TaskOutcome {
        match finder.find_slot(request, busy, now) {
            Some(found) => {
                busy.insert(found.interval);
                let assignment = self.assignment(task, found, request);
                if assignment.at_risk {
                    warn!(task = %task.id, end = %assignment.end, deadline = %task.deadline, "placed after deadline");
                }
                TaskOutcome::Scheduled(assignment)
            }
            None => {
                warn!(task = %task.id, "no slot found within search horizon");
                TaskOutcome::Unscheduled {
                    reason: UnscheduledReason::NoSlotFound,
                }
            }
        }
    }

    fn assignment(&self, task: &Task, found: SlotMatch, request: &SlotRequest) -> Assignment {
        Assignment {
            task_id: task.id.clone(),
            start: found.interval.start,
            end: found.interval.end,
            effective_hours: hours_in(found.interval.duration()),
            urgency: request.urgency,
            daypart: Daypart::for_urgency(request.urgency, &self.config.urgency_tiers),
            pass: found.pass,
            at_risk: found.interval.end > task.deadline,
            emergency: request.emergency,
        }
    }

    fn finish_insert(
        &self,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
        outcomes: Vec<Option<TaskOutcome>>,
    ) -> ScheduleRun {
        ScheduleRun {
            user_id: snapshot.user_id.clone(),
            now,
            results: collect_results(snapshot, outcomes),
            groups: Vec::new(),
        }
    }
}

/// Try displacing claims, lowest-ranked first. A claim whose removal does not open
/// a slot is restored before the next one is tried.
fn bump(
    finder: &SlotFinder<'_>,
    request: &SlotRequest,
    newcomer: &RankKey,
    claims: &[Claim],
    busy: &mut BusySet,
    now: DateTime<Utc>,
) -> Option<(SlotMatch, usize)> {
    for idx in bump_candidates(claims, newcomer) {
        let claim = &claims[idx];
        busy.remove(&claim.interval);
        if let Some(found) = finder.find_slot(request, busy, now) {
            return Some((found, idx));
        }
        busy.insert(claim.interval);
    }
    None
}

fn pinned_interval(task: &Task) -> Option<Interval> {
    match task.status {
        TaskStatus::InProgress => task.interval(),
        _ => None,
    }
}

/// Interval an in-progress task keeps. Tasks excluded by the dependency check
/// hold nothing, even when they carry an interval from an earlier run.
fn held_interval(task: &Task, report: &DependencyReport) -> Option<Interval> {
    match report.get(&task.id) {
        Some(Eligibility::Excluded { .. }) => None,
        _ => pinned_interval(task),
    }
}

fn seed_busy(snapshot: &Snapshot, report: &DependencyReport, now: DateTime<Utc>) -> BusySet {
    let mut busy = BusySet::from_intervals(snapshot.busy.iter().copied());
    for task in &snapshot.tasks {
        let held = if let Some(interval) = held_interval(task, report) {
            Some(interval)
        } else if !task.status.is_schedulable() {
            task.occupied_interval().filter(|iv| iv.end > now)
        } else {
            None
        };
        if let Some(interval) = held {
            busy.insert(interval);
        }
    }
    busy
}

fn ineligible_outcome(task_id: &str, eligibility: &Eligibility) -> TaskOutcome {
    match eligibility {
        Eligibility::Blocked { on } => {
            debug!(task = %task_id, blocked_on = %on, "waiting on dependency");
            TaskOutcome::Unscheduled {
                reason: UnscheduledReason::Blocked,
            }
        }
        Eligibility::Excluded { reason } => TaskOutcome::Unscheduled { reason: *reason },
        Eligibility::Inactive { status } => TaskOutcome::Untouched { status: *status },
        Eligibility::Eligible { .. } => TaskOutcome::Unscheduled {
            reason: UnscheduledReason::NoSlotFound,
        },
    }
}

fn collect_results(snapshot: &Snapshot, outcomes: Vec<Option<TaskOutcome>>) -> Vec<TaskResult> {
    snapshot
        .tasks
        .iter()
        .zip(outcomes)
        .map(|(task, outcome)| TaskResult {
            task_id: task.id.clone(),
            outcome: outcome.unwrap_or(TaskOutcome::Untouched {
                status: task.status,
            }),
        })
        .collect()
}
