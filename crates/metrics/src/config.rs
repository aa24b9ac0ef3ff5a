//! Store configuration from defaults, a TOML file, and the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

pub const DEFAULT_DB_PATH: &str = "/data/metrics.db";
pub const DEFAULT_RETENTION_DAYS: u32 = 90;
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 512 * 1024 * 1024;
pub const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 60;

const MIN_RETENTION_DAYS: u32 = 1;
const MIN_MAX_SIZE_BYTES: u64 = 1024 * 1024;
const MIN_MAINTENANCE_INTERVAL_SECS: u64 = 1;

pub const ENV_DB_PATH: &str = "METRICS_DB_PATH";
pub const ENV_RETENTION_DAYS: &str = "METRICS_RETENTION_DAYS";
pub const ENV_MAX_SIZE_BYTES: &str = "METRICS_MAX_SIZE_BYTES";
pub const ENV_MAINTENANCE_INTERVAL_SECONDS: &str = "METRICS_MAINTENANCE_INTERVAL_SECONDS";

/// Settings for one metrics database.
///
/// Numeric settings that are missing, malformed, or below their minimum fall
/// back to the default rather than being clamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Location of the SQLite database file.
    pub path: PathBuf,

    /// Events older than this many days are pruned.
    pub retention_days: u32,

    /// Upper bound on the database plus its WAL and shared-memory files.
    pub max_size_bytes: u64,

    /// Minimum time between two throttled maintenance passes.
    pub maintenance_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
            retention_days: DEFAULT_RETENTION_DAYS,
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            maintenance_interval: Duration::from_secs(DEFAULT_MAINTENANCE_INTERVAL_SECS),
        }
    }
}

/// On-disk shape of the configuration file.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    store: StoreSection,
}

#[derive(Debug, Default, Deserialize)]
struct StoreSection {
    path: Option<PathBuf>,
    retention_days: Option<i64>,
    max_size_bytes: Option<i64>,
    maintenance_interval_seconds: Option<i64>,
}

impl StoreConfig {
    /// Default settings for the database at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        let file: FileConfig = toml::from_str(toml).map_err(|e| Error::Config(e.to_string()))?;
        let section = file.store;
        let mut config = Self::default();
        if let Some(path) = section.path {
            config.path = path;
        }
        config.retention_days =
            positive_or_default(section.retention_days, DEFAULT_RETENTION_DAYS, MIN_RETENTION_DAYS);
        config.max_size_bytes =
            positive_or_default(section.max_size_bytes, DEFAULT_MAX_SIZE_BYTES, MIN_MAX_SIZE_BYTES);
        config.maintenance_interval = Duration::from_secs(positive_or_default(
            section.maintenance_interval_seconds,
            DEFAULT_MAINTENANCE_INTERVAL_SECS,
            MIN_MAINTENANCE_INTERVAL_SECS,
        ));
        Ok(config)
    }

    /// Apply `METRICS_*` overrides resolved through `lookup`.
    ///
    /// A numeric variable that is set but invalid resets that setting to its
    /// default, even if an earlier source had provided a valid value.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(ENV_DB_PATH).filter(|p| !p.trim().is_empty()) {
            self.path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_RETENTION_DAYS) {
            self.retention_days =
                positive_or_default(parse_int(&raw), DEFAULT_RETENTION_DAYS, MIN_RETENTION_DAYS);
        }
        if let Some(raw) = lookup(ENV_MAX_SIZE_BYTES) {
            self.max_size_bytes =
                positive_or_default(parse_int(&raw), DEFAULT_MAX_SIZE_BYTES, MIN_MAX_SIZE_BYTES);
        }
        if let Some(raw) = lookup(ENV_MAINTENANCE_INTERVAL_SECONDS) {
            self.maintenance_interval = Duration::from_secs(positive_or_default(
                parse_int(&raw),
                DEFAULT_MAINTENANCE_INTERVAL_SECS,
                MIN_MAINTENANCE_INTERVAL_SECS,
            ));
        }
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = if days < MIN_RETENTION_DAYS {
            DEFAULT_RETENTION_DAYS
        } else {
            days
        };
        self
    }

    pub fn with_max_size_bytes(mut self, bytes: u64) -> Self {
        self.max_size_bytes = if bytes < MIN_MAX_SIZE_BYTES {
            DEFAULT_MAX_SIZE_BYTES
        } else {
            bytes
        };
        self
    }

    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = if interval.as_secs() < MIN_MAINTENANCE_INTERVAL_SECS {
            Duration::from_secs(DEFAULT_MAINTENANCE_INTERVAL_SECS)
        } else {
            interval
        };
        self
    }
}

fn parse_int(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

fn positive_or_default<T>(raw: Option<i64>, default: T, minimum: T) -> T
where
    T: TryFrom<i64> + PartialOrd,
{
    match raw.and_then(|value| T::try_from(value).ok()) {
        Some(value) if value >= minimum => value,
        _ => default,
    }
}
