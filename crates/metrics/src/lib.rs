//! SQLite-backed outcome metrics for the TeX rendering bot.
//!
//! Every rendering attempt, whatever surface it came from, ends in one
//! [`Status`]. This crate keeps an append-only log of those outcomes and
//! answers the handful of windowed questions the operations dashboard asks.
//!
//! # Overview
//!
//! The log is bounded two ways:
//!
//! 1. **Retention** — events older than the configured number of days are
//!    deleted.
//!
//! 2. **Size cap** — when the database plus its WAL and shared-memory files
//!    exceed the cap, the oldest events are evicted in batches and the file is
//!    compacted until it fits.
//!
//! Both run in a maintenance pass executed inline by writers, at most once per
//! interval per database (see [`MaintenanceThrottle`]), and once at open.
//!
//! # Core Concepts
//!
//! ## MetricsStore
//!
//! The [`MetricsStore`] owns the schema and the write path. Maintenance
//! failures are logged and never fail the write that triggered them.
//!
//! ## MetricsReader
//!
//! The [`MetricsReader`] computes a [`Summary`] or a [`TimeSeries`] over a
//! [`Window`], and lists recent events. A database that does not exist yet
//! reads as an empty one.
//!
//! # Example
//!
//! ```no_run
//! use metrics::{MetricsStore, NewEvent, Status, StoreConfig, Window};
//!
//! let store = MetricsStore::open(StoreConfig::from_env())?;
//!
//! store.record(&NewEvent::new("slash", Status::Success).with_dpi(275))?;
//! store.record_event("legacy", "compile_error", None, Some("1001"), Some("! Missing $ inserted."))?;
//!
//! let summary = store.reader().summary(Window::parse(Some("24h")))?;
//! println!("{} attempts, {}% errors", summary.attempts, summary.error_rate_percent);
//! # Ok::<(), metrics::Error>(())
//! ```

mod config;
mod error;
mod event;
mod footprint;
mod maintenance;
mod reader;
mod store;
mod throttle;
mod window;

pub use config::{
    DEFAULT_DB_PATH, DEFAULT_MAINTENANCE_INTERVAL_SECS, DEFAULT_MAX_SIZE_BYTES,
    DEFAULT_RETENTION_DAYS, ENV_DB_PATH, ENV_MAINTENANCE_INTERVAL_SECONDS, ENV_MAX_SIZE_BYTES,
    ENV_RETENTION_DAYS, StoreConfig,
};
pub use error::{Error, MaintenanceError, Result};
pub use event::{
    EventRecord, MAX_ERROR_MESSAGE_CHARS, NewEvent, Status, format_timestamp, parse_timestamp,
};
pub use footprint::{DiskFootprint, FootprintProbe, storage_files};
pub use maintenance::{DEFAULT_PRUNE_BATCH_SIZE, MaintenanceReport, Maintainer};
pub use reader::{
    DEFAULT_EVENT_LIMIT, ErrorsByStatus, MAX_EVENT_LIMIT, MetricsReader, SeriesTotals,
    SeriesWindow, SourceCounts, Summary, SummaryWindow, TimeSeries, clamp_event_limit,
};
pub use store::MetricsStore;
pub use throttle::MaintenanceThrottle;
pub use window::{Bucket, BucketRange, Window};
