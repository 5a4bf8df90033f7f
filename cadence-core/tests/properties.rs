use cadence_core::{Interval, Scheduler, SchedulerConfig, Snapshot, Task, TaskStatus};
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
}

#[derive(Debug, Clone)]
struct Spec {
    priority: i32,
    deadline_minutes: i64,
    duration_quarters: u32,
    dependency: Option<usize>,
    status: u8,
}

fn spec() -> impl Strategy<Value = Spec> {
    (
        1..=5i32,
        -600..12_000i64,
        1..=24u32,
        proptest::option::of(0..12usize),
        0..10u8,
    )
        .prop_map(|(priority, deadline_minutes, duration_quarters, dependency, status)| Spec {
            priority,
            deadline_minutes,
            duration_quarters,
            dependency,
            status,
        })
}

fn build(specs: &[Spec], busy: &[(i64, i64)]) -> Snapshot {
    let tasks = specs
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let mut task = Task::new(
                format!("t{i}"),
                "generated",
                now() + Duration::minutes(s.deadline_minutes),
            )
            .with_priority(s.priority)
            .with_duration(s.duration_quarters as f64 * 0.25)
            .with_created_at(now() - Duration::minutes(i as i64));
            if let Some(dep) = s.dependency.filter(|&d| d < specs.len()) {
                task = task.with_dependency(format!("t{dep}"));
            }
            match s.status {
                0 => task.with_status(TaskStatus::Overdue),
                1 => task.completed(now() - Duration::hours(1)),
                _ => task,
            }
        })
        .collect();

    let busy = busy
        .iter()
        .map(|&(offset, len)| {
            let start = now() + Duration::minutes(offset);
            Interval::new(start, start + Duration::minutes(len))
        })
        .collect();

    Snapshot::new("prop", tasks).with_busy(busy)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn placements_never_overlap_each_other_or_busy_time(
        specs in proptest::collection::vec(spec(), 1..12),
        busy in proptest::collection::vec((0..9_000i64, 15..240i64), 0..6),
    ) {
        let snap = build(&specs, &busy);
        let run = Scheduler::new(SchedulerConfig::default()).unwrap().run(&snap, now()).unwrap();

        let placed: Vec<Interval> = run.assignments().map(|a| a.interval()).collect();
        for (i, a) in placed.iter().enumerate() {
            prop_assert!(a.start >= now());
            prop_assert!(a.end > a.start);
            for b in &placed[i + 1..] {
                prop_assert!(!a.overlaps(b));
            }
            for b in &snap.busy {
                prop_assert!(!a.overlaps(b));
            }
        }
    }

    #[test]
    fn runs_are_deterministic(
        specs in proptest::collection::vec(spec(), 1..10),
        busy in proptest::collection::vec((0..9_000i64, 15..240i64), 0..4),
    ) {
        let snap = build(&specs, &busy);
        let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
        let first = scheduler.run(&snap, now()).unwrap();
        let second = scheduler.run(&snap, now()).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn dependents_never_start_before_their_dependency_is_satisfied(
        specs in proptest::collection::vec(spec(), 2..10),
    ) {
        let snap = build(&specs, &[]);
        let run = Scheduler::new(SchedulerConfig::default()).unwrap().run(&snap, now()).unwrap();

        for a in run.assignments() {
            let Some(task) = snap.task(&a.task_id) else { continue };
            let Some(dep) = task.dependency.as_deref().and_then(|d| snap.task(d)) else { continue };
            prop_assert!(matches!(dep.status, TaskStatus::Completed | TaskStatus::Overdue));
            if let Some(done) = dep.satisfied_at() {
                prop_assert!(a.start >= done);
            }
        }
    }
}
