//! cadence-core: Scheduling engine for the Cadence task planner

pub mod allocation;
pub mod config;
pub mod conflict;
pub mod dependency;
pub mod error;
pub mod interval;
pub mod orchestrator;
pub mod report;
pub mod slot;
pub mod task;
pub mod time;
pub mod urgency;

pub use allocation::{AllocationPlan, DeadlineGroup, Demand, GroupDecision, allocate, group_by_deadline};
pub use config::{DailyWindow, DaypartHours, SchedulerConfig, UrgencyTiers};
pub use conflict::{Claim, RankKey, bump_candidates, placement_order, resolve};
pub use dependency::{DependencyIssue, DependencyReport, DependencyResolver, Eligibility};
pub use error::{Result, SchedulerError, UnscheduledReason};
pub use interval::{BusySet, Interval};
pub use orchestrator::{Assignment, ScheduleRun, Scheduler, TaskEvent, TaskOutcome, TaskResult};
pub use report::render_report;
pub use slot::{PassKind, SearchPass, SlotFinder, SlotMatch, SlotRequest};
pub use task::{MAX_PRIORITY, MIN_PRIORITY, Snapshot, Task, TaskStatus};
pub use time::{parse_local_deadline_to_utc, parse_timezone};
pub use urgency::{Daypart, UrgencyBand, UrgencyScorer};
