//! Plain-text summary of a run.

use std::collections::BTreeMap;
use std::fmt;

use crate::allocation::GroupDecision;
use crate::error::UnscheduledReason;
use crate::orchestrator::ScheduleRun;
use crate::task::Snapshot;

pub fn render_report(snapshot: &Snapshot, run: &ScheduleRun) -> String {
    Report { snapshot, run }.to_string()
}

struct Report<'a> {
    snapshot: &'a Snapshot,
    run: &'a ScheduleRun,
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_report(out, self.snapshot, self.run)
    }
}

fn write_report(out: &mut fmt::Formatter<'_>, snapshot: &Snapshot, run: &ScheduleRun) -> fmt::Result {
    let total = snapshot.tasks.len();
    let dependent = snapshot
        .tasks
        .iter()
        .filter(|t| t.dependency.is_some())
        .count();

    let mut priorities: BTreeMap<i32, usize> = BTreeMap::new();
    for task in &snapshot.tasks {
        *priorities.entry(task.priority).or_default() += 1;
    }

    let mut reasons: BTreeMap<String, usize> = BTreeMap::new();
    for (_, reason) in run.unscheduled() {
        *reasons.entry(reason.to_string()).or_default() += 1;
    }

    writeln!(out, "=== Schedule Report: {} ===", run.user_id)?;
    writeln!(out, "Generated: {}", run.now.format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(out)?;
    writeln!(out, "Total tasks: {total}")?;
    writeln!(out, "Independent tasks: {}", total - dependent)?;
    writeln!(out, "Dependent tasks: {dependent}")?;
    writeln!(out)?;
    writeln!(out, "Priority distribution:")?;
    for (priority, count) in &priorities {
        writeln!(out, "  P{priority}: {count}")?;
    }

    writeln!(out)?;
    writeln!(out, "=== Results ===")?;
    writeln!(out, "Scheduled: {}", run.assignments().count())?;
    writeln!(out, "Pinned: {}", run.pinned().count())?;
    writeln!(out, "Unscheduled: {}", run.unscheduled().count())?;
    for (reason, count) in &reasons {
        writeln!(out, "  {reason}: {count}")?;
    }

    let shrunk: Vec<_> = run
        .groups
        .iter()
        .filter(|g| matches!(g.decision, GroupDecision::Shrunk { .. }))
        .collect();
    if !shrunk.is_empty() {
        writeln!(out)?;
        writeln!(out, "Shortened deadline groups:")?;
        for group in shrunk {
            writeln!(
                out,
                "  {} ({:.1}h needed, {:.1}h available)",
                group.members.join(", "),
                group.required_hours,
                group.available_hours
            )?;
        }
    }

    let at_risk: Vec<_> = run.at_risk().collect();
    if !at_risk.is_empty() {
        writeln!(out)?;
        writeln!(out, "At risk:")?;
        for a in at_risk {
            let deadline = snapshot
                .task(&a.task_id)
                .map(|t| t.deadline.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            writeln!(
                out,
                "  {} ends {} (deadline {deadline})",
                a.task_id,
                a.end.format("%Y-%m-%d %H:%M")
            )?;
        }
    }

    let blocked = run
        .unscheduled()
        .filter(|(_, r)| *r == UnscheduledReason::Blocked)
        .count();
    if blocked > 0 {
        writeln!(out)?;
        writeln!(out, "{blocked} task(s) waiting on a dependency.")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::orchestrator::Scheduler;
    use crate::task::Task;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
    }

    #[test]
    fn report_counts_tasks_and_reasons() {
        let snap = Snapshot::new(
            "alice",
            vec![
                Task::new("a", "write", now() + Duration::hours(48)).with_priority(5),
                Task::new("b", "review", now() + Duration::hours(48)).with_dependency("a"),
                Task::new("c", "loop", now() + Duration::hours(48))
                    .with_priority(1)
                    .with_dependency("c"),
            ],
        );
        let run = Scheduler::new(SchedulerConfig::default())
            .unwrap()
            .run(&snap, now())
            .unwrap();
        let report = render_report(&snap, &run);

        assert!(report.contains("=== Schedule Report: alice ==="));
        assert!(report.contains("Total tasks: 3"));
        assert!(report.contains("Independent tasks: 1"));
        assert!(report.contains("Dependent tasks: 2"));
        assert!(report.contains("  P5: 1"));
        assert!(report.contains("  P3: 1"));
        assert!(report.contains("Scheduled: 1"));
        assert!(report.contains("Unscheduled: 2"));
        assert!(report.contains("  blocked: 1"));
        assert!(report.contains("  excluded_cycle: 1"));
        assert!(report.contains("1 task(s) waiting on a dependency."));
        assert!(!report.contains("At risk:"));
    }
}
