//! SQLite metrics store implementation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, params};

use crate::event::format_timestamp;
use crate::{
    MaintenanceError, MaintenanceReport, MaintenanceThrottle, Maintainer, MetricsReader, NewEvent,
    Result, Status, StoreConfig,
};

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Append-only store of rendering outcomes.
///
/// Every call opens its own connection, so a store can be shared across
/// threads freely. SQLite in WAL mode serializes writers and lets readers run
/// alongside them.
#[derive(Debug, Clone)]
pub struct MetricsStore {
    config: StoreConfig,
    throttle: Arc<MaintenanceThrottle>,
    maintainer: Maintainer,
}

impl MetricsStore {
    /// Open or create the store described by `config`.
    ///
    /// Creates the parent directory and schema if needed, then runs one
    /// maintenance pass. Safe to call against an existing store.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let throttle = Arc::new(MaintenanceThrottle::new(config.maintenance_interval));
        Self::open_with_throttle(config, throttle)
    }

    /// Like [`open`](Self::open), sharing `throttle` with other store handles.
    pub fn open_with_throttle(
        config: StoreConfig,
        throttle: Arc<MaintenanceThrottle>,
    ) -> Result<Self> {
        let store = Self {
            maintainer: Maintainer::from_config(&config),
            config,
            throttle,
        };
        store.init_schema()?;
        store.run_maintenance("db init");
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let path = self.path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = open_connection(path)?;
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            tracing::warn!(path = %path.display(), %mode, "metrics store did not switch to WAL");
        }
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS latex_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL,
                source TEXT NOT NULL,
                status TEXT NOT NULL,
                dpi INTEGER,
                user_id TEXT,
                error_message TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_latex_events_created_at
                ON latex_events(created_at);
            CREATE INDEX IF NOT EXISTS idx_latex_events_created_at_status
                ON latex_events(created_at, status);
            CREATE INDEX IF NOT EXISTS idx_latex_events_created_at_source
                ON latex_events(created_at, source);
            "#,
        )?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn throttle(&self) -> &Arc<MaintenanceThrottle> {
        &self.throttle
    }

    /// Record one outcome, timestamped now.
    ///
    /// May run a maintenance pass inline when the throttle allows it. A
    /// failing pass is logged and does not fail the write.
    pub fn record(&self, event: &NewEvent) -> Result<()> {
        {
            let conn = open_connection(self.path())?;
            insert_at(&conn, event, Utc::now())?;
        }

        if self.throttle.should_run(self.path()) {
            self.run_maintenance("event write");
        } else {
            tracing::trace!(path = %self.path().display(), "metrics maintenance throttled");
        }
        Ok(())
    }

    /// Record one outcome from loosely typed inputs.
    ///
    /// Fails with [`Error::InvalidStatus`](crate::Error::InvalidStatus) before
    /// touching the database if `status` is not a known status.
    pub fn record_event(
        &self,
        source: &str,
        status: &str,
        dpi: Option<i64>,
        user_id: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let status: Status = status.parse()?;
        let mut event = NewEvent::new(source, status);
        event.dpi = dpi;
        event.user_id = user_id.map(str::to_string);
        if let Some(message) = error_message {
            event = event.with_error_message(message);
        }
        self.record(&event)
    }

    /// Run a maintenance pass now, bypassing the throttle.
    pub fn maintain(&self) -> std::result::Result<MaintenanceReport, MaintenanceError> {
        self.maintainer.run(self.path())
    }

    /// A reader over the same database file.
    pub fn reader(&self) -> MetricsReader {
        MetricsReader::new(self.path())
    }

    fn run_maintenance(&self, trigger: &'static str) {
        if let Err(e) = self.maintain() {
            tracing::error!(
                path = %self.path().display(),
                trigger,
                error = %e,
                "metrics maintenance failed"
            );
        }
    }
}

/// Open a read-write connection, creating the file if needed.
pub(crate) fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    Ok(conn)
}

/// Open an existing database without creating it.
pub(crate) fn open_existing(path: &Path) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags)?;
    configure(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
    Ok(())
}

pub(crate) fn insert_at(conn: &Connection, event: &NewEvent, at: DateTime<Utc>) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO latex_events (created_at, source, status, dpi, user_id, error_message)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            format_timestamp(at),
            event.source,
            event.status.as_str(),
            event.dpi,
            event.user_id,
            crate::event::normalize_error_message(event.error_message.as_deref()),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}
