//! Lookback windows and time buckets used by the aggregations.

use std::fmt;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Serialize, Serializer};

/// A named lookback range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Window {
    Last24Hours,
    Last7Days,
    Last30Days,
    #[default]
    Last90Days,
}

impl Window {
    pub const ALL: [Window; 4] = [
        Window::Last24Hours,
        Window::Last7Days,
        Window::Last30Days,
        Window::Last90Days,
    ];

    /// Parse a window key such as `"7d"`. Absent or unrecognized keys yield
    /// the 90 day default.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        let candidate = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|window| window.key() == candidate)
            .unwrap_or_default()
    }

    pub fn key(self) -> &'static str {
        match self {
            Window::Last24Hours => "24h",
            Window::Last7Days => "7d",
            Window::Last30Days => "30d",
            Window::Last90Days => "90d",
        }
    }

    pub fn hours(self) -> i64 {
        match self {
            Window::Last24Hours => 24,
            Window::Last7Days => 7 * 24,
            Window::Last30Days => 30 * 24,
            Window::Last90Days => 90 * 24,
        }
    }

    pub fn duration(self) -> TimeDelta {
        TimeDelta::hours(self.hours())
    }

    /// Hourly buckets for the short windows, daily for the long ones.
    pub fn bucket(self) -> Bucket {
        match self {
            Window::Last24Hours | Window::Last7Days => Bucket::Hour,
            Window::Last30Days | Window::Last90Days => Bucket::Day,
        }
    }

    pub fn bucket_count(self) -> usize {
        (self.hours() / self.bucket().hours()) as usize
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl Serialize for Window {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

/// Width of one time-series bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Hour,
    Day,
}

impl Bucket {
    pub fn hours(self) -> i64 {
        match self {
            Bucket::Hour => 1,
            Bucket::Day => 24,
        }
    }

    pub fn step(self) -> TimeDelta {
        TimeDelta::hours(self.hours())
    }

    /// Start of the bucket containing `ts`.
    pub fn floor(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        // Only fails for instants outside the nanosecond-representable range.
        ts.duration_trunc(self.step()).unwrap_or(ts)
    }
}

/// Right-aligned, contiguous bucket boundaries ending at the bucket holding `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketRange {
    pub bucket: Bucket,
    pub count: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BucketRange {
    pub fn ending_at(window: Window, now: DateTime<Utc>) -> Self {
        let bucket = window.bucket();
        let count = window.bucket_count();
        let end = bucket.floor(now);
        let start = end - bucket.step() * (count as i32 - 1);
        Self {
            bucket,
            count,
            start,
            end,
        }
    }

    /// Bucket starts, oldest first.
    pub fn starts(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        (0..self.count).map(|i| self.start + self.bucket.step() * i as i32)
    }

    /// Index of the bucket holding `ts`, or `None` outside the range.
    pub fn index_of(&self, ts: DateTime<Utc>) -> Option<usize> {
        let bucket_start = self.bucket.floor(ts);
        if bucket_start < self.start || bucket_start > self.end {
            return None;
        }
        let offset = (bucket_start - self.start).num_hours() / self.bucket.hours();
        usize::try_from(offset).ok().filter(|i| *i < self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn parse_known_keys() {
        assert_eq!(Window::parse(Some("24h")), Window::Last24Hours);
        assert_eq!(Window::parse(Some(" 7D ")), Window::Last7Days);
        assert_eq!(Window::parse(Some("30d")), Window::Last30Days);
        assert_eq!(Window::parse(Some("90d")), Window::Last90Days);
    }

    #[test]
    fn parse_defaults_to_ninety_days() {
        assert_eq!(Window::parse(None), Window::Last90Days);
        assert_eq!(Window::parse(Some("1y")), Window::Last90Days);
        assert_eq!(Window::parse(Some("")), Window::Last90Days);
    }

    #[test]
    fn bucket_counts_per_window() {
        let counts: Vec<_> = Window::ALL.iter().map(|w| w.bucket_count()).collect();
        assert_eq!(counts, vec![24, 168, 30, 90]);
        assert_eq!(Window::Last7Days.bucket(), Bucket::Hour);
        assert_eq!(Window::Last30Days.bucket(), Bucket::Day);
    }

    #[test]
    fn floor_truncates_to_bucket() {
        let ts = at(2026, 5, 10, 15, 42, 17);
        assert_eq!(Bucket::Hour.floor(ts), at(2026, 5, 10, 15, 0, 0));
        assert_eq!(Bucket::Day.floor(ts), at(2026, 5, 10, 0, 0, 0));
    }

    #[test]
    fn hourly_range_is_right_aligned() {
        let range = BucketRange::ending_at(Window::Last24Hours, at(2026, 5, 10, 15, 30, 0));
        assert_eq!(range.end, at(2026, 5, 10, 15, 0, 0));
        assert_eq!(range.start, at(2026, 5, 9, 16, 0, 0));
        let starts: Vec<_> = range.starts().collect();
        assert_eq!(starts.len(), 24);
        assert_eq!(starts.last(), Some(&range.end));
    }

    #[test]
    fn daily_range_is_right_aligned() {
        let range = BucketRange::ending_at(Window::Last30Days, at(2026, 5, 10, 15, 30, 0));
        assert_eq!(range.end, at(2026, 5, 10, 0, 0, 0));
        assert_eq!(range.start, at(2026, 4, 11, 0, 0, 0));
        assert_eq!(range.starts().count(), 30);
    }

    #[test]
    fn index_of_covers_edges_and_excludes_outside() {
        let range = BucketRange::ending_at(Window::Last24Hours, at(2026, 5, 10, 15, 30, 0));
        assert_eq!(range.index_of(at(2026, 5, 9, 16, 0, 0)), Some(0));
        assert_eq!(range.index_of(at(2026, 5, 9, 16, 59, 59)), Some(0));
        assert_eq!(range.index_of(at(2026, 5, 10, 15, 29, 0)), Some(23));
        assert_eq!(range.index_of(at(2026, 5, 9, 15, 59, 59)), None);
        assert_eq!(range.index_of(at(2026, 5, 10, 16, 0, 0)), None);
    }

    #[test]
    fn every_hour_in_range_maps_to_one_bucket() {
        let range = BucketRange::ending_at(Window::Last7Days, at(2026, 5, 10, 15, 30, 0));
        for (i, start) in range.starts().enumerate() {
            assert_eq!(range.index_of(start), Some(i));
            assert_eq!(range.index_of(start + TimeDelta::minutes(59)), Some(i));
        }
    }
}
