//! Time utilities: timezone-aware deadlines and local working windows.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{Result, SchedulerError};

/// Parse an IANA timezone name like "America/Chicago".
pub fn parse_timezone(tz: &str) -> Result<Tz> {
    tz.parse()
        .map_err(|_| SchedulerError::UnknownTimezone(tz.to_string()))
}

/// Parse a deadline like "2026-02-20 23:59" in an IANA tz like "America/Chicago",
/// returning UTC.
pub fn parse_local_deadline_to_utc(local: &str, tz: &str) -> Result<DateTime<Utc>> {
    let tz = parse_timezone(tz)?;

    let ndt = NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M").map_err(|e| {
        SchedulerError::InvalidLocalTime {
            input: local.to_string(),
            reason: e.to_string(),
        }
    })?;

    let local_dt = tz
        .from_local_datetime(&ndt)
        .single()
        .ok_or_else(|| SchedulerError::InvalidLocalTime {
            input: local.to_string(),
            reason: format!("ambiguous or invalid local time (DST?) in {tz}"),
        })?;

    Ok(local_dt.with_timezone(&Utc))
}

/// Convert a wall-clock time in `tz` to UTC without failing.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant; times skipped by a
/// spring-forward jump resolve to the first valid instant an hour later.
pub fn local_to_utc(tz: Tz, ndt: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&ndt) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => tz
            .from_local_datetime(&(ndt + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&ndt)),
    }
}

/// The UTC instant at `hour:00` local time on `date`. `hour == 24` means the
/// following midnight.
pub fn local_hour_on(tz: Tz, date: NaiveDate, hour: u32) -> DateTime<Utc> {
    let (date, hour) = if hour >= 24 {
        (date.succ_opt().unwrap_or(date), 0)
    } else {
        (date, hour)
    };
    let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    local_to_utc(tz, date.and_time(time))
}

/// Local calendar date of a UTC instant.
pub fn local_date(tz: Tz, at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

/// Fractional hours in a duration (millisecond precision).
pub fn hours_in(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 3_600_000.0
}

/// Duration for a fractional number of hours, rounded to the millisecond.
pub fn duration_from_hours(hours: f64) -> Duration {
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}
