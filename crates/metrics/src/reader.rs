//! Windowed aggregations for the dashboard.
//!
//! A missing database file, or one without the events table, is an empty
//! store: every query returns a zero-valued response of the full shape
//! instead of an error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::event::{format_timestamp, parse_timestamp, serialize_timestamp};
use crate::store::open_existing;
use crate::window::{Bucket, BucketRange};
use crate::{EventRecord, Result, Status, Window};

pub const DEFAULT_EVENT_LIMIT: i64 = 50;
pub const MAX_EVENT_LIMIT: i64 = 200;

/// Clamp a requested event count to `[1, 200]`, defaulting to 50.
pub fn clamp_event_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_EVENT_LIMIT).clamp(1, MAX_EVENT_LIMIT)
}

/// Attempt counts for one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub attempts: u64,
    pub successes: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryWindow {
    pub key: Window,
    pub hours: i64,
    #[serde(serialize_with = "serialize_timestamp")]
    pub start_utc: DateTime<Utc>,
}

/// Totals over a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub window: SummaryWindow,
    pub attempts: u64,
    pub successes: u64,
    pub errors: u64,
    /// `100 * errors / attempts`, two decimals; zero without attempts.
    pub error_rate_percent: f64,
    pub by_source: BTreeMap<String, SourceCounts>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub generated_at: DateTime<Utc>,
}

impl Summary {
    fn empty(window: Window, now: DateTime<Utc>) -> Self {
        Self {
            window: SummaryWindow {
                key: window,
                hours: window.hours(),
                start_utc: now - window.duration(),
            },
            attempts: 0,
            successes: 0,
            errors: 0,
            error_rate_percent: 0.0,
            by_source: BTreeMap::new(),
            generated_at: now,
        }
    }

    fn add(&mut self, source: String, status: Option<Status>, count: u64) {
        let per_source = self.by_source.entry(source).or_default();
        self.attempts += count;
        per_source.attempts += count;
        match status {
            Some(Status::Success) => {
                self.successes += count;
                per_source.successes += count;
            }
            Some(_) => {
                self.errors += count;
                per_source.errors += count;
            }
            // Rows written outside this crate may carry other values; they
            // still count as attempts.
            None => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesWindow {
    pub key: Window,
    pub hours: i64,
    pub bucket: Bucket,
    pub bucket_count: usize,
    #[serde(serialize_with = "serialize_timestamp")]
    pub start_utc: DateTime<Utc>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub end_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesTotals {
    pub attempts: Vec<u64>,
    pub successes: Vec<u64>,
    pub errors: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorsByStatus {
    pub timeout: Vec<u64>,
    pub compile_error: Vec<u64>,
    pub internal_error: Vec<u64>,
}

impl ErrorsByStatus {
    fn series_mut(&mut self, status: Status) -> Option<&mut Vec<u64>> {
        match status {
            Status::Success => None,
            Status::Timeout => Some(&mut self.timeout),
            Status::CompileError => Some(&mut self.compile_error),
            Status::InternalError => Some(&mut self.internal_error),
        }
    }
}

/// Per-bucket counts over a window.
///
/// Every array holds exactly `window.bucket_count` entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeSeries {
    pub window: SeriesWindow,
    pub labels: Vec<String>,
    pub totals: SeriesTotals,
    pub errors_by_status: ErrorsByStatus,
    pub by_source: BTreeMap<String, Vec<u64>>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub generated_at: DateTime<Utc>,
}

impl TimeSeries {
    fn empty(window: Window, range: &BucketRange, now: DateTime<Utc>) -> Self {
        let zeros = vec![0; range.count];
        Self {
            window: SeriesWindow {
                key: window,
                hours: window.hours(),
                bucket: range.bucket,
                bucket_count: range.count,
                start_utc: range.start,
                end_utc: range.end,
            },
            labels: range.starts().map(format_timestamp).collect(),
            totals: SeriesTotals {
                attempts: zeros.clone(),
                successes: zeros.clone(),
                errors: zeros.clone(),
            },
            errors_by_status: ErrorsByStatus {
                timeout: zeros.clone(),
                compile_error: zeros.clone(),
                internal_error: zeros,
            },
            by_source: BTreeMap::new(),
            generated_at: now,
        }
    }

    fn add(&mut self, index: usize, source: String, status: Option<Status>) {
        let count = self.window.bucket_count;
        self.totals.attempts[index] += 1;
        match status {
            Some(Status::Success) => self.totals.successes[index] += 1,
            Some(status) => {
                self.totals.errors[index] += 1;
                if let Some(series) = self.errors_by_status.series_mut(status) {
                    series[index] += 1;
                }
            }
            None => {}
        }
        self.by_source.entry(source).or_insert_with(|| vec![0; count])[index] += 1;
    }
}

/// Read-only view over a metrics database.
///
/// Does not create the file; a reader may be built before the store exists.
#[derive(Debug, Clone)]
pub struct MetricsReader {
    path: PathBuf,
}

impl MetricsReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when there is nothing to read: no file, or a file the store
    /// has not initialized yet.
    fn connect(&self) -> Result<Option<Connection>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let conn = open_existing(&self.path)?;
        let tables: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'latex_events'",
            [],
            |row| row.get(0),
        )?;
        Ok((tables > 0).then_some(conn))
    }

    pub fn summary(&self, window: Window) -> Result<Summary> {
        self.summary_at(window, Utc::now())
    }

    /// Summary of events with `created_at >= now - window`.
    pub fn summary_at(&self, window: Window, now: DateTime<Utc>) -> Result<Summary> {
        let mut summary = Summary::empty(window, now);
        let Some(conn) = self.connect()? else {
            return Ok(summary);
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT source, status, COUNT(*)
            FROM latex_events
            WHERE created_at >= ?1
            GROUP BY source, status
            "#,
        )?;
        let rows = stmt.query_map(params![format_timestamp(summary.window.start_utc)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        for row in rows {
            let (source, status, count) = row?;
            let count = u64::try_from(count).unwrap_or(0);
            summary.add(source, status.parse().ok(), count);
        }

        if summary.attempts > 0 {
            let rate = summary.errors as f64 / summary.attempts as f64 * 100.0;
            summary.error_rate_percent = (rate * 100.0).round() / 100.0;
        }
        Ok(summary)
    }

    pub fn time_series(&self, window: Window) -> Result<TimeSeries> {
        self.time_series_at(window, Utc::now())
    }

    /// Per-bucket counts for the buckets ending at the one holding `now`.
    pub fn time_series_at(&self, window: Window, now: DateTime<Utc>) -> Result<TimeSeries> {
        let range = BucketRange::ending_at(window, now);
        let mut series = TimeSeries::empty(window, &range, now);
        let Some(conn) = self.connect()? else {
            return Ok(series);
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT created_at, source, status
            FROM latex_events
            WHERE created_at >= ?1
            ORDER BY created_at ASC
            "#,
        )?;
        let rows = stmt.query_map(params![format_timestamp(range.start)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (created_at, source, status) = row?;
            let Some(ts) = parse_timestamp(&created_at) else {
                tracing::warn!(%created_at, "skipping event with unparsable timestamp");
                continue;
            };
            if let Some(index) = range.index_of(ts) {
                series.add(index, source, status.parse().ok());
            }
        }
        Ok(series)
    }

    /// The most recent events, newest first.
    ///
    /// `limit` is clamped with [`clamp_event_limit`].
    pub fn recent_events(&self, limit: Option<i64>) -> Result<Vec<EventRecord>> {
        let Some(conn) = self.connect()? else {
            return Ok(Vec::new());
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT id, created_at, source, status, dpi, user_id, error_message
            FROM latex_events
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;
        let rows = stmt.query_map(params![clamp_event_limit(limit)], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<i64>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, created_at, source, status, dpi, user_id, error_message) = row?;
            let Some(created_at) = parse_timestamp(&created_at) else {
                tracing::warn!(id, %created_at, "skipping event with unparsable timestamp");
                continue;
            };
            events.push(EventRecord {
                id,
                created_at,
                source,
                status,
                dpi,
                user_id,
                error_message,
            });
        }
        Ok(events)
    }
}
