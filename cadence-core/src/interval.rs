//! Half-open time intervals and the per-run busy set.
//!
//! `BusySet` is the accumulator threaded through a run: it starts with the user's
//! fixed commitments and grows by one interval per placed task.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn starting_at(start: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            start,
            end: start + duration,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn can_fit(&self, duration: Duration) -> bool {
        self.duration() >= duration
    }
}

/// Sorted collection of committed intervals for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusySet {
    intervals: Vec<Interval>,
}

impl BusySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_intervals(intervals: impl IntoIterator<Item = Interval>) -> Self {
        let mut set = Self::new();
        for iv in intervals {
            set.insert(iv);
        }
        set
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.iter()
    }

    pub fn insert(&mut self, interval: Interval) {
        let pos = self.intervals.partition_point(|iv| iv <= &interval);
        self.intervals.insert(pos, interval);
    }

    /// Remove one occurrence of `interval`. Returns whether it was present.
    pub fn remove(&mut self, interval: &Interval) -> bool {
        match self.intervals.iter().position(|iv| iv == interval) {
            Some(pos) => {
                self.intervals.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Free gaps inside `[from, until)`, in chronological order.
    ///
    /// Every busy interval is widened by `buffer` on both sides before gaps are cut,
    /// so anything placed inside a returned gap keeps at least `buffer` away from
    /// existing commitments. Overlapping busy intervals are merged on the fly.
    pub fn gaps(&self, from: DateTime<Utc>, until: DateTime<Utc>, buffer: Duration) -> Vec<Interval> {
        let mut gaps = Vec::new();
        if from >= until {
            return gaps;
        }

        let mut cursor = from;
        for busy in &self.intervals {
            let blocked_start = busy.start - buffer;
            let blocked_end = busy.end + buffer;

            // Entirely behind the cursor.
            if blocked_end <= cursor {
                continue;
            }
            if blocked_start >= until {
                break;
            }

            if blocked_start > cursor {
                gaps.push(Interval::new(cursor, blocked_start));
            }
            cursor = cursor.max(blocked_end);
            if cursor >= until {
                break;
            }
        }

        if cursor < until {
            gaps.push(Interval::new(cursor, until));
        }
        gaps
    }
}
