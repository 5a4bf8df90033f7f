//! Slot finder: gap search over a user's committed intervals.
//!
//! A search is a fixed list of passes tried in order; the first pass that yields a
//! gap long enough wins. Each pass is a daily window (evaluated in the user's local
//! time), an optional preferred start hour, and an end bound.
//!
//! | pass           | window          | starts at                         |
//! |----------------|-----------------|-----------------------------------|
//! | preferred      | working hours   | daypart hour, today or next day   |
//! | earliest       | working hours   | now / not_before                  |
//! | extended hours | extended window | now / not_before (critical only)  |
//! | emergency      | whole day       | now (replaces all of the above)   |
//!
//! Passes are first bounded by the task's deadline, then repeated out to the search
//! horizon. Nothing loops beyond the horizon.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DailyWindow, SchedulerConfig};
use crate::interval::{BusySet, Interval};
use crate::time::{duration_from_hours, hours_in, local_date, local_hour_on};
use crate::urgency::{Daypart, UrgencyBand};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotRequest {
    pub duration: Duration,
    pub urgency: f64,
    pub not_before: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub emergency: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    Preferred,
    Earliest,
    ExtendedHours,
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchPass {
    pub kind: PassKind,
    pub window: DailyWindow,
    pub anchor_hour: Option<u32>,
    pub until: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotMatch {
    pub interval: Interval,
    pub pass: PassKind,
}

pub struct SlotFinder<'a> {
    config: &'a SchedulerConfig,
    tz: Tz,
}

impl<'a> SlotFinder<'a> {
    pub fn new(config: &'a SchedulerConfig, tz: Tz) -> Self {
        Self { config, tz }
    }

    pub fn daypart(&self, urgency: f64) -> Daypart {
        Daypart::for_urgency(urgency, &self.config.urgency_tiers)
    }

    /// Gap kept around existing commitments. High and critical tasks get a
    /// reduced buffer, never zero unless the configured buffer is zero.
    pub fn buffer_for(&self, urgency: f64) -> Duration {
        let base = self.config.min_buffer();
        match UrgencyBand::for_urgency(urgency, self.config) {
            UrgencyBand::Normal => base,
            UrgencyBand::High | UrgencyBand::Critical => {
                duration_from_hours(hours_in(base) * self.config.high_urgency_buffer_factor)
            }
        }
    }

    pub fn horizon_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::days(i64::from(self.config.search_horizon_days))
    }

    pub fn plan_passes(&self, request: &SlotRequest, now: DateTime<Utc>) -> Vec<SearchPass> {
        let horizon_end = self.horizon_end(now);

        if request.emergency {
            return vec![SearchPass {
                kind: PassKind::Emergency,
                window: DailyWindow::whole_day(),
                anchor_hour: None,
                until: horizon_end,
            }];
        }

        let from = request.not_before.max(now);
        let anchor = self
            .daypart(request.urgency)
            .start_hour(&self.config.daypart_hours);
        let critical = UrgencyBand::for_urgency(request.urgency, self.config) == UrgencyBand::Critical;

        let mut passes = Vec::new();
        let mut round = |until: DateTime<Utc>| {
            passes.push(SearchPass {
                kind: PassKind::Preferred,
                window: self.config.working_window,
                anchor_hour: Some(anchor),
                until,
            });
            passes.push(SearchPass {
                kind: PassKind::Earliest,
                window: self.config.working_window,
                anchor_hour: None,
                until,
            });
            if critical {
                passes.push(SearchPass {
                    kind: PassKind::ExtendedHours,
                    window: self.config.extended_window,
                    anchor_hour: None,
                    until,
                });
            }
        };

        if request.deadline > from && request.deadline < horizon_end {
            round(request.deadline);
        }
        round(horizon_end);
        passes
    }

    pub fn find_slot(
        &self,
        request: &SlotRequest,
        busy: &BusySet,
        now: DateTime<Utc>,
    ) -> Option<SlotMatch> {
        let from = request.not_before.max(now);
        if from >= self.horizon_end(now) || request.duration <= Duration::zero() {
            return None;
        }
        let buffer = self.buffer_for(request.urgency);

        for pass in self.plan_passes(request, now) {
            if let Some(interval) = self.search(&pass, from, request.duration, buffer, busy) {
                debug!(
                    pass = ?pass.kind,
                    start = %interval.start,
                    end = %interval.end,
                    "slot found"
                );
                return Some(SlotMatch {
                    interval,
                    pass: pass.kind,
                });
            }
        }
        None
    }

    fn search(
        &self,
        pass: &SearchPass,
        from: DateTime<Utc>,
        duration: Duration,
        buffer: Duration,
        busy: &BusySet,
    ) -> Option<Interval> {
        self.segments(pass, from)
            .into_iter()
            .flat_map(|segment| busy.gaps(segment.start, segment.end, buffer))
            .find(|gap| gap.can_fit(duration))
            .map(|gap| Interval::starting_at(gap.start, duration))
    }

    /// Searchable stretches of the pass, one per local day, with touching
    /// stretches merged so a whole-day window can run past midnight.
    fn segments(&self, pass: &SearchPass, from: DateTime<Utc>) -> Vec<Interval> {
        let mut segments: Vec<Interval> = Vec::new();
        if from >= pass.until {
            return segments;
        }

        let last = local_date(self.tz, pass.until);
        let mut date = local_date(self.tz, from);
        while date <= last {
            if let Some(segment) = self.day_segment(pass, from, date) {
                match segments.len().checked_sub(1) {
                    Some(last) if segments[last].end == segment.start => {
                        segments[last].end = segment.end
                    }
                    _ => segments.push(segment),
                }
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        segments
    }

    fn day_segment(&self, pass: &SearchPass, from: DateTime<Utc>, date: NaiveDate) -> Option<Interval> {
        let window_start = local_hour_on(self.tz, date, pass.window.start_hour);
        let window_end = local_hour_on(self.tz, date, pass.window.end_hour);

        let mut start = window_start.max(from);
        if let Some(hour) = pass.anchor_hour {
            let anchor = local_hour_on(self.tz, date, hour);
            // Preferred daypart already gone today: the nearest one is tomorrow.
            if anchor < from {
                return None;
            }
            start = start.max(anchor);
        }
        let end = window_end.min(pass.until);

        (start < end).then(|| Interval::new(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UrgencyTiers;
    use crate::time::parse_timezone;
    use chrono::TimeZone;

    // Monday.
    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, h, m, 0).unwrap()
    }

    fn utc() -> Tz {
        parse_timezone("UTC").unwrap()
    }

    fn request(hours: f64, urgency: f64, now: DateTime<Utc>) -> SlotRequest {
        SlotRequest {
            duration: duration_from_hours(hours),
            urgency,
            not_before: now,
            deadline: now + Duration::days(3),
            emergency: false,
        }
    }

    #[test]
    fn preferred_daypart_follows_urgency() {
        let cfg = SchedulerConfig::default();
        let finder = SlotFinder::new(&cfg, utc());
        let now = at(2, 8, 0);
        let busy = BusySet::new();

        let cases = [(0.85, 9), (0.7, 10), (0.5, 12), (0.3, 14)];
        for (urgency, hour) in cases {
            let m = finder.find_slot(&request(1.0, urgency, now), &busy, now).unwrap();
            assert_eq!(m.interval.start, at(2, hour, 0), "urgency {urgency}");
            assert_eq!(m.pass, PassKind::Preferred);
        }
    }

    #[test]
    fn passed_daypart_moves_to_next_day() {
        let cfg = SchedulerConfig::default();
        let finder = SlotFinder::new(&cfg, utc());
        let now = at(2, 15, 0);
        let m = finder
            .find_slot(&request(1.0, 0.3, now), &BusySet::new(), now)
            .unwrap();
        assert_eq!(m.interval.start, at(3, 14, 0));
    }

    #[test]
    fn scans_past_occupied_gap_with_buffer() {
        let cfg = SchedulerConfig::default();
        let finder = SlotFinder::new(&cfg, utc());
        let now = at(2, 8, 0);
        let busy = BusySet::from_intervals([Interval::new(at(2, 14, 0), at(2, 16, 0))]);
        let m = finder.find_slot(&request(1.0, 0.3, now), &busy, now).unwrap();
        assert_eq!(m.interval.start, at(2, 16, 10));
    }

    #[test]
    fn high_urgency_halves_buffer() {
        let cfg = SchedulerConfig::default();
        let finder = SlotFinder::new(&cfg, utc());
        assert_eq!(finder.buffer_for(0.5), Duration::minutes(10));
        assert_eq!(finder.buffer_for(0.75), Duration::minutes(5));
        assert_eq!(finder.buffer_for(0.95), Duration::minutes(5));
    }

    #[test]
    fn falls_back_to_earliest_gap_when_preferred_daypart_is_full() {
        let cfg = SchedulerConfig::default();
        let finder = SlotFinder::new(&cfg, utc());
        let now = at(2, 8, 0);
        // Every afternoon in the horizon is booked.
        let busy = BusySet::from_intervals((2..=10).map(|d| Interval::new(at(d, 13, 0), at(d, 18, 0))));
        let m = finder.find_slot(&request(2.0, 0.3, now), &busy, now).unwrap();
        assert_eq!(m.pass, PassKind::Earliest);
        assert_eq!(m.interval.start, at(2, 9, 0));
    }

    #[test]
    fn deadline_pulls_task_before_its_daypart() {
        let cfg = SchedulerConfig::default();
        let finder = SlotFinder::new(&cfg, utc());
        let now = at(2, 11, 0);
        let mut req = request(1.0, 0.85, now);
        req.deadline = at(2, 17, 0);
        // Early-morning daypart is gone today and tomorrow is past the deadline.
        let m = finder.find_slot(&req, &BusySet::new(), now).unwrap();
        assert_eq!(m.pass, PassKind::Earliest);
        assert_eq!(m.interval.start, now);
        assert!(m.interval.end <= req.deadline);
    }

    #[test]
    fn critical_task_uses_extended_hours_before_deadline() {
        let cfg = SchedulerConfig::default();
        let finder = SlotFinder::new(&cfg, utc());
        let now = at(2, 8, 0);
        let busy = BusySet::from_intervals([Interval::new(at(2, 9, 0), at(2, 18, 0))]);
        let mut req = request(2.0, 0.95, now);
        req.deadline = at(2, 21, 0);
        let m = finder.find_slot(&req, &busy, now).unwrap();
        assert_eq!(m.pass, PassKind::ExtendedHours);
        // 18:00 plus the reduced five-minute buffer.
        assert_eq!(m.interval.start, at(2, 18, 5));
        assert!(m.interval.end <= req.deadline);
    }

    #[test]
    fn non_critical_task_never_leaves_working_hours() {
        let cfg = SchedulerConfig::default();
        let finder = SlotFinder::new(&cfg, utc());
        let now = at(2, 8, 0);
        let busy = BusySet::from_intervals([Interval::new(at(2, 9, 0), at(2, 18, 0))]);
        let mut req = request(2.0, 0.75, now);
        req.deadline = at(2, 21, 0);
        let m = finder.find_slot(&req, &busy, now).unwrap();
        // Morning daypart on the next working day.
        assert_eq!(m.pass, PassKind::Preferred);
        assert_eq!(m.interval.start, at(3, 10, 0));
    }

    #[test]
    fn emergency_places_right_after_now_across_midnight() {
        let cfg = SchedulerConfig::default();
        let finder = SlotFinder::new(&cfg, utc());
        let now = at(2, 23, 0);
        let mut req = request(3.0, 1.0, now);
        req.emergency = true;
        let m = finder.find_slot(&req, &BusySet::new(), now).unwrap();
        assert_eq!(m.pass, PassKind::Emergency);
        assert_eq!(m.interval, Interval::new(at(2, 23, 0), at(3, 2, 0)));
    }

    #[test]
    fn fully_booked_horizon_returns_none() {
        let cfg = SchedulerConfig::default();
        let finder = SlotFinder::new(&cfg, utc());
        let now = at(2, 8, 0);
        let busy = BusySet::from_intervals([Interval::new(now - Duration::days(1), now + Duration::days(30))]);
        assert!(finder.find_slot(&request(0.5, 0.2, now), &busy, now).is_none());
    }

    #[test]
    fn not_before_beyond_horizon_returns_none() {
        let cfg = SchedulerConfig::default();
        let finder = SlotFinder::new(&cfg, utc());
        let now = at(2, 8, 0);
        let mut req = request(1.0, 0.5, now);
        req.not_before = now + Duration::days(8);
        assert!(finder.find_slot(&req, &BusySet::new(), now).is_none());
    }

    #[test]
    fn working_window_is_local_time() {
        let cfg = SchedulerConfig::default().with_timezone("Africa/Nairobi");
        let tz = cfg.tz().unwrap();
        let finder = SlotFinder::new(&cfg, tz);
        // 05:00 UTC is 08:00 in Nairobi.
        let now = at(2, 5, 0);
        let m = finder
            .find_slot(&request(1.0, 0.85, now), &BusySet::new(), now)
            .unwrap();
        // 09:00 EAT.
        assert_eq!(m.interval.start, at(2, 6, 0));
    }

    #[test]
    fn custom_tiers_change_daypart() {
        let cfg = SchedulerConfig::default().with_urgency_tiers(UrgencyTiers {
            early_morning: 0.7,
            morning: 0.6,
            midday: 0.4,
        });
        let finder = SlotFinder::new(&cfg, utc());
        assert_eq!(finder.daypart(0.71), Daypart::EarlyMorning);
    }

    #[test]
    fn search_is_deterministic() {
        let cfg = SchedulerConfig::default();
        let finder = SlotFinder::new(&cfg, utc());
        let now = at(2, 8, 0);
        let busy = BusySet::from_intervals([
            Interval::new(at(2, 10, 0), at(2, 11, 30)),
            Interval::new(at(2, 12, 0), at(2, 13, 0)),
        ]);
        let req = request(1.5, 0.55, now);
        let a = finder.find_slot(&req, &busy, now);
        let b = finder.find_slot(&req, &busy, now);
        assert_eq!(a, b);
    }
}
