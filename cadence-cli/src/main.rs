use anyhow::{Context, Result, bail};
use cadence_core::{
    DependencyReport, DependencyResolver, Eligibility, ScheduleRun, Scheduler, SchedulerConfig,
    Snapshot, TaskOutcome, parse_local_deadline_to_utc, render_report,
};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod calendar;
mod config;
mod locks;
mod snapshot;
mod state;

#[derive(Parser, Debug)]
#[command(
    name = "cadence",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CADENCE_BUILD_SHA"), ")"),
    about = "Deadline-aware task scheduler"
)]
struct Cli {
    /// Scheduler config (default: ~/.cadence/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan every pending task in a snapshot
    Schedule {
        /// Snapshot JSON file
        #[arg(long)]
        input: PathBuf,

        /// Reference time: RFC 3339, or "YYYY-MM-DD HH:MM" in the user's timezone
        #[arg(long)]
        now: Option<String>,

        /// Override the user's timezone (IANA name)
        #[arg(long)]
        tz: Option<String>,

        /// Print the run as JSON
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Write the assignments back into the snapshot file
        #[arg(long, default_value_t = false)]
        write: bool,

        /// Also export placed tasks as an ICS calendar
        #[arg(long)]
        ics: Option<PathBuf>,
    },

    /// Place one task, displacing a lower-ranked pending task if needed
    Insert {
        #[arg(long)]
        input: PathBuf,

        /// Id of the task to place
        #[arg(long)]
        task: String,

        #[arg(long)]
        now: Option<String>,

        #[arg(long, default_value_t = false)]
        json: bool,

        #[arg(long, default_value_t = false)]
        write: bool,
    },

    /// Check a snapshot and the config without scheduling
    Validate {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        now: Option<String>,
    },

    /// Run and print a summary report
    Report {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        now: Option<String>,
    },

    /// Schedule every snapshot in a directory, one run per user at a time
    Batch {
        /// Directory of snapshot JSON files
        #[arg(long)]
        dir: PathBuf,

        #[arg(long)]
        now: Option<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Write the default config to ~/.cadence/config.toml (or --config)
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Command::InitConfig => {
            config::init_config(config_path)?;
        }

        Command::Validate { input, now } => {
            let cfg = config::load_config(config_path)?;
            let snap = snapshot::read_snapshot(&input)?;
            snap.validate()
                .with_context(|| format!("invalid snapshot {}", input.display()))?;
            let tz = snap.timezone.clone().unwrap_or_else(|| cfg.timezone.clone());
            cadence_core::parse_timezone(&tz)?;
            let now = resolve_now(now.as_deref(), &snap, &cfg)?;
            let report = DependencyResolver::new(&snap.tasks).resolve(now);
            println!("{}: {} tasks, timezone {}", snap.user_id, snap.tasks.len(), tz);
            print!("{}", describe_dependencies(&report));
        }

        Command::Schedule {
            input,
            now,
            tz,
            json,
            write,
            ics,
        } => {
            let cfg = config::load_config(config_path)?;
            let mut snap = snapshot::read_snapshot(&input)?;
            if let Some(tz) = tz {
                snap.timezone = Some(tz);
            }
            let now = resolve_now(now.as_deref(), &snap, &cfg)?;
            let scheduler = Scheduler::new(cfg)?;
            let run = scheduler.run(&snap, now)?;

            print_run(&run, json)?;

            if let Some(path) = ics {
                let events = calendar::run_to_events(&snap, &run, "");
                let body = calendar::events_to_ics(&snap.user_id, &events);
                std::fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
                info!(path = %path.display(), events = events.len(), "ics exported");
            }

            if write {
                run.apply(&mut snap.tasks);
                snapshot::write_snapshot(&input, &snap)?;
                info!(path = %input.display(), "snapshot updated");
            }
        }

        Command::Insert {
            input,
            task,
            now,
            json,
            write,
        } => {
            let cfg = config::load_config(config_path)?;
            let mut snap = snapshot::read_snapshot(&input)?;
            let now = resolve_now(now.as_deref(), &snap, &cfg)?;
            let run = Scheduler::new(cfg)?.insert(&snap, &task, now)?;

            print_run(&run, json)?;

            if write {
                run.apply(&mut snap.tasks);
                snapshot::write_snapshot(&input, &snap)?;
            }
        }

        Command::Report { input, now } => {
            let cfg = config::load_config(config_path)?;
            let snap = snapshot::read_snapshot(&input)?;
            let now = resolve_now(now.as_deref(), &snap, &cfg)?;
            let run = Scheduler::new(cfg)?.run(&snap, now)?;
            print!("{}", render_report(&snap, &run));
        }

        Command::Batch { dir, now, json } => {
            let cfg = config::load_config(config_path)?;
            let snapshots = snapshot::read_snapshot_dir(&dir)?;
            if snapshots.is_empty() {
                bail!("no snapshot files in {}", dir.display());
            }
            let jobs = batch_jobs(snapshots, now.as_deref(), &cfg)?;

            let scheduler = Arc::new(Scheduler::new(cfg)?);
            let locks = locks::UserLocks::new();

            info!(snapshots = jobs.len(), users = count_users(&jobs), "batch started");
            let worker = Arc::clone(&scheduler);
            let results = locks::run_batch(
                &locks,
                jobs,
                move |(path, snap, at): (PathBuf, Snapshot, DateTime<Utc>)| {
                    let run = worker.run(&snap, at);
                    (path, run)
                },
            )
            .await?;

            let mut failed = 0;
            for (path, run) in results {
                match run {
                    Ok(run) => {
                        if !json {
                            println!("# {}", path.display());
                        }
                        print_run(&run, json)?;
                    }
                    Err(e) => {
                        failed += 1;
                        eprintln!("{}: {e}", path.display());
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} snapshot(s) failed");
            }
        }
    }

    Ok(())
}

fn count_users<T>(jobs: &[(String, T)]) -> usize {
    let mut users: Vec<&str> = jobs.iter().map(|(u, _)| u.as_str()).collect();
    users.sort_unstable();
    users.dedup();
    users.len()
}

type BatchJob = (String, (PathBuf, Snapshot, DateTime<Utc>));

/// Key each snapshot by user and fix its reference time. A local `--now` is read
/// in that snapshot's own timezone.
fn batch_jobs(
    snapshots: Vec<(PathBuf, Snapshot)>,
    now: Option<&str>,
    cfg: &SchedulerConfig,
) -> Result<Vec<BatchJob>> {
    snapshots
        .into_iter()
        .map(|(path, snap)| {
            let at = resolve_now(now, &snap, cfg).with_context(|| path.display().to_string())?;
            Ok((snap.user_id.clone(), (path, snap, at)))
        })
        .collect()
}

fn resolve_now(arg: Option<&str>, snap: &Snapshot, cfg: &SchedulerConfig) -> Result<DateTime<Utc>> {
    match arg {
        Some(s) => {
            let tz = snap.timezone.as_deref().unwrap_or(&cfg.timezone);
            parse_now(s, tz)
        }
        None => Ok(Utc::now()),
    }
}

fn parse_now(s: &str, tz: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    parse_local_deadline_to_utc(s, tz).with_context(|| format!("invalid --now '{s}'"))
}

/// Graph problems first, then every task that cannot be placed right now.
fn describe_dependencies(report: &DependencyReport) -> String {
    let mut lines = Vec::new();
    for issue in report.issues() {
        lines.push(format!("- {}: {}", issue.task_id, issue.reason));
    }
    for (id, eligibility) in report.iter() {
        if let Eligibility::Blocked { on } = eligibility {
            lines.push(format!("- {id}: waiting on {on}"));
        }
    }
    let eligible = report.eligible_ids().len();
    if lines.is_empty() {
        format!("OK, {eligible} task(s) ready to schedule\n")
    } else {
        lines.push(format!("{eligible} task(s) ready to schedule"));
        lines.join("\n") + "\n"
    }
}

fn print_run(run: &ScheduleRun, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(run)?);
        return Ok(());
    }

    for result in &run.results {
        match &result.outcome {
            TaskOutcome::Scheduled(a) => {
                let risk = if a.at_risk { "  [at risk]" } else { "" };
                println!(
                    "{:<16} {} -> {}  {:.2}h  urgency={:.2}{}",
                    result.task_id,
                    a.start.format("%Y-%m-%d %H:%M"),
                    a.end.format("%H:%M"),
                    a.effective_hours,
                    a.urgency,
                    risk
                );
            }
            TaskOutcome::Pinned { interval } => {
                println!(
                    "{:<16} {} -> {}  (pinned)",
                    result.task_id,
                    interval.start.format("%Y-%m-%d %H:%M"),
                    interval.end.format("%H:%M")
                );
            }
            TaskOutcome::Unscheduled { reason } => {
                println!("{:<16} unscheduled: {reason}", result.task_id);
            }
            TaskOutcome::Untouched { status } => {
                println!("{:<16} {status}", result.task_id);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn now_accepts_rfc3339_and_local_time() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
        assert_eq!(parse_now("2026-03-02T15:00:00Z", "UTC").unwrap(), expected);
        assert_eq!(parse_now("2026-03-02 09:00", "America/Chicago").unwrap(), expected);
        assert!(parse_now("yesterday", "UTC").is_err());
    }

    #[test]
    fn batch_now_follows_each_snapshot_timezone() {
        let cfg = SchedulerConfig::default();
        let snapshots = vec![
            (
                PathBuf::from("chicago.json"),
                Snapshot::new("c", Vec::new()).with_timezone("America/Chicago"),
            ),
            (PathBuf::from("default.json"), Snapshot::new("d", Vec::new())),
        ];
        let jobs = batch_jobs(snapshots, Some("2026-03-02 09:00"), &cfg).unwrap();
        let times: Vec<_> = jobs.iter().map(|(_, (_, _, at))| *at).collect();
        assert_eq!(
            times,
            vec![
                Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap(),
                parse_now("2026-03-02 09:00", &cfg.timezone).unwrap(),
            ]
        );
    }

    #[test]
    fn dependency_summary_lists_problems_and_waiting_tasks() {
        let deadline = Utc.with_ymd_and_hms(2026, 3, 5, 17, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let tasks = vec![
            cadence_core::Task::new("a", "a", deadline),
            cadence_core::Task::new("b", "b", deadline).with_dependency("a"),
            cadence_core::Task::new("c", "c", deadline).with_dependency("ghost"),
        ];
        let summary = describe_dependencies(&DependencyResolver::new(&tasks).resolve(now));
        assert_eq!(
            summary,
            "- c: invalid_dependency\n- b: waiting on a\n1 task(s) ready to schedule\n"
        );

        let clean = vec![cadence_core::Task::new("a", "a", deadline)];
        assert_eq!(
            describe_dependencies(&DependencyResolver::new(&clean).resolve(now)),
            "OK, 1 task(s) ready to schedule\n"
        );
    }

    #[test]
    fn counts_distinct_users() {
        let jobs = vec![("a".to_string(), ()), ("b".to_string(), ()), ("a".to_string(), ())];
        assert_eq!(count_users(&jobs), 2);
    }
}
