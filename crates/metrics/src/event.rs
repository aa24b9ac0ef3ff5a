//! Event types for the metrics log.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Longest error message kept on a stored event, in characters.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// Outcome of one rendering/request attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Timeout,
    CompileError,
    InternalError,
}

impl Status {
    /// Every status, in storage order.
    pub const ALL: [Status; 4] = [
        Status::Success,
        Status::Timeout,
        Status::CompileError,
        Status::InternalError,
    ];

    /// The statuses counted as errors by the aggregations.
    pub const ERRORS: [Status; 3] = [Status::Timeout, Status::CompileError, Status::InternalError];

    /// The value stored in the `status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Timeout => "timeout",
            Status::CompileError => "compile_error",
            Status::InternalError => "internal_error",
        }
    }

    pub fn is_error(self) -> bool {
        !matches!(self, Status::Success)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::InvalidStatus(s.to_string()))
    }
}

/// An outcome about to be recorded.
///
/// The timestamp is assigned by the store at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub source: String,
    pub status: Status,
    pub dpi: Option<i64>,
    pub user_id: Option<String>,
    pub error_message: Option<String>,
}

impl NewEvent {
    pub fn new(source: impl Into<String>, status: Status) -> Self {
        Self {
            source: source.into(),
            status,
            dpi: None,
            user_id: None,
            error_message: None,
        }
    }

    pub fn with_dpi(mut self, dpi: i64) -> Self {
        self.dpi = Some(dpi);
        self
    }

    pub fn with_user_id(mut self, user_id: impl ToString) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    /// Attach an error message, truncated to [`MAX_ERROR_MESSAGE_CHARS`].
    /// An empty message is treated as absent.
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = normalize_error_message(Some(message));
        self
    }
}

pub(crate) fn normalize_error_message(message: Option<&str>) -> Option<String> {
    let truncated: String = message?.chars().take(MAX_ERROR_MESSAGE_CHARS).collect();
    if truncated.is_empty() {
        None
    } else {
        Some(truncated)
    }
}

/// A stored event as returned by
/// [`MetricsReader::recent_events`](crate::MetricsReader::recent_events).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    pub id: i64,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created_at: DateTime<Utc>,
    pub source: String,
    /// The stored value, which rows written by other tools may leave outside
    /// the known statuses.
    pub status: String,
    pub dpi: Option<i64>,
    pub user_id: Option<String>,
    pub error_message: Option<String>,
}

impl EventRecord {
    /// The status, if it is one of the known values.
    pub fn known_status(&self) -> Option<Status> {
        self.status.parse().ok()
    }
}

/// Render a timestamp the way `created_at` is stored: UTC, second precision,
/// explicit `+00:00` offset. All stored values share this shape, so SQL string
/// comparison orders them chronologically.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Parse a stored timestamp, normalizing any offset to UTC.
///
/// Values without an offset are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

pub(crate) fn serialize_timestamp<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format_timestamp(*ts))
}
