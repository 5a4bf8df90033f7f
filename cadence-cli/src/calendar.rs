use cadence_core::{ScheduleRun, Snapshot};
use chrono::{DateTime, Utc};

pub struct CalendarEvent {
    pub task_id: String,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub summary: String,
    pub description: String,
}

/// One event per placed task, in snapshot order.
pub fn run_to_events(snapshot: &Snapshot, run: &ScheduleRun, prefix: &str) -> Vec<CalendarEvent> {
    run.assignments()
        .filter_map(|a| {
            let task = snapshot.task(&a.task_id)?;
            let title = if task.title.is_empty() { &task.id } else { &task.title };
            let mut description = format!(
                "TaskId: {}\nPriority: {}\nDeadline: {}\nUrgency: {:.2}\nHours: {:.2}\n",
                task.id,
                task.priority,
                task.deadline.to_rfc3339(),
                a.urgency,
                a.effective_hours
            );
            if a.at_risk {
                description.push_str("Ends after deadline\n");
            }
            Some(CalendarEvent {
                task_id: task.id.clone(),
                start_utc: a.start,
                end_utc: a.end,
                summary: format!("{prefix}{title}"),
                description,
            })
        })
        .collect()
}

/// Emit a minimal ICS calendar. DTSTART/DTEND are UTC; UIDs are stable per task.
pub fn events_to_ics(user_id: &str, events: &[CalendarEvent]) -> String {
    let mut s = String::new();
    s.push_str("BEGIN:VCALENDAR\nVERSION:2.0\nPRODID:-//Cadence//EN\n");

    for e in events {
        let dtstart = e.start_utc.format("%Y%m%dT%H%M%SZ");
        let dtend = e.end_utc.format("%Y%m%dT%H%M%SZ");

        s.push_str("BEGIN:VEVENT\n");
        s.push_str(&format!("UID:cadence-{}@{}\n", escape_ics(&e.task_id), escape_ics(user_id)));
        s.push_str(&format!("DTSTART:{}\n", dtstart));
        s.push_str(&format!("DTEND:{}\n", dtend));
        s.push_str(&format!("SUMMARY:{}\n", escape_ics(&e.summary)));
        s.push_str(&format!("DESCRIPTION:{}\n", escape_ics(&e.description)));
        s.push_str("END:VEVENT\n");
    }

    s.push_str("END:VCALENDAR\n");
    s
}

fn escape_ics(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace(',', "\\,")
        .replace(';', "\\;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{Scheduler, SchedulerConfig, Task};
    use chrono::{Duration, TimeZone};

    #[test]
    fn ics_has_one_event_per_placed_task() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let snap = Snapshot::new(
            "alice",
            vec![
                Task::new("a", "Draft, review; ship", now + Duration::days(1)),
                Task::new("b", "Blocked", now + Duration::days(1)).with_dependency("a"),
            ],
        );
        let run = Scheduler::new(SchedulerConfig::default())
            .unwrap()
            .run(&snap, now)
            .unwrap();

        let events = run_to_events(&snap, &run, "[cadence] ");
        assert_eq!(events.len(), 1);

        let ics = events_to_ics("alice", &events);
        assert!(ics.starts_with("BEGIN:VCALENDAR\n"));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 1);
        assert!(ics.contains("UID:cadence-a@alice\n"));
        assert!(ics.contains("SUMMARY:[cadence] Draft\\, review\\; ship\n"));
        assert!(ics.ends_with("END:VCALENDAR\n"));
    }
}
