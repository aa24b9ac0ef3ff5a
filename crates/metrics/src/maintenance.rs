//! Retention and size-cap eviction.
//!
//! A pass runs age-based pruning first, then evicts the oldest rows in
//! batches until the on-disk footprint fits under the cap. Each batch is
//! followed by a WAL checkpoint and a `VACUUM`, since deleting rows alone
//! never shrinks an SQLite file.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::{Connection, params};

use crate::event::format_timestamp;
use crate::footprint::{DiskFootprint, FootprintProbe};
use crate::store::open_connection;
use crate::{MaintenanceError, Result, StoreConfig};

/// Rows deleted per size-cap batch.
pub const DEFAULT_PRUNE_BATCH_SIZE: u32 = 5000;

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MaintenanceReport {
    /// Rows removed because they fell outside the retention period.
    pub pruned_by_age: u64,
    /// Rows removed to bring the footprint under the size cap.
    pub pruned_by_size: u64,
    /// Footprint measured before anything was deleted.
    pub bytes_before: u64,
    /// Footprint measured at the end of the pass.
    pub bytes_after: u64,
}

impl MaintenanceReport {
    pub fn pruned(&self) -> u64 {
        self.pruned_by_age + self.pruned_by_size
    }
}

/// Enforces the retention period and the size cap on one database.
#[derive(Clone)]
pub struct Maintainer {
    retention_days: u32,
    max_size_bytes: u64,
    batch_size: u32,
    probe: Arc<dyn FootprintProbe>,
}

impl fmt::Debug for Maintainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Maintainer")
            .field("retention_days", &self.retention_days)
            .field("max_size_bytes", &self.max_size_bytes)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl Maintainer {
    /// A maintainer with exactly these bounds.
    ///
    /// Unlike [`StoreConfig`], no minimums are applied here.
    pub fn new(retention_days: u32, max_size_bytes: u64) -> Self {
        Self {
            retention_days,
            max_size_bytes,
            batch_size: DEFAULT_PRUNE_BATCH_SIZE,
            probe: Arc::new(DiskFootprint),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.retention_days, config.max_size_bytes)
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_probe(mut self, probe: impl FootprintProbe + 'static) -> Self {
        self.probe = Arc::new(probe);
        self
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Run one pass against the database at `path`.
    pub fn run(&self, path: &Path) -> std::result::Result<MaintenanceReport, MaintenanceError> {
        self.run_at(path, Utc::now())
    }

    /// Run one pass, measuring the retention cutoff from `now`.
    pub fn run_at(
        &self,
        path: &Path,
        now: DateTime<Utc>,
    ) -> std::result::Result<MaintenanceReport, MaintenanceError> {
        let report = self.pass(path, now).map_err(|source| MaintenanceError {
            path: path.to_path_buf(),
            source,
        })?;

        if report.pruned() > 0 {
            tracing::info!(
                path = %path.display(),
                pruned_by_age = report.pruned_by_age,
                pruned_by_size = report.pruned_by_size,
                bytes_before = report.bytes_before,
                bytes_after = report.bytes_after,
                "metrics maintenance pruned events"
            );
        } else {
            tracing::debug!(
                path = %path.display(),
                bytes = report.bytes_after,
                "metrics maintenance found nothing to prune"
            );
        }
        Ok(report)
    }

    fn pass(&self, path: &Path, now: DateTime<Utc>) -> Result<MaintenanceReport> {
        let bytes_before = self.probe.measure(path)?;
        let conn = open_connection(path)?;

        let pruned_by_age = match retention_cutoff(now, self.retention_days) {
            Some(cutoff) => conn.execute(
                "DELETE FROM latex_events WHERE created_at < ?1",
                params![format_timestamp(cutoff)],
            )? as u64,
            None => 0,
        };

        let mut footprint = self.probe.measure(path)?;
        let mut pruned_by_size = 0;
        while footprint > self.max_size_bytes {
            let deleted = delete_oldest_batch(&conn, self.batch_size)?;
            pruned_by_size += deleted;
            reclaim(&conn)?;
            footprint = self.probe.measure(path)?;

            if deleted == 0 {
                tracing::warn!(
                    path = %path.display(),
                    bytes = footprint,
                    max_size_bytes = self.max_size_bytes,
                    "metrics store is empty but still over its size cap"
                );
                break;
            }
        }

        Ok(MaintenanceReport {
            pruned_by_age,
            pruned_by_size,
            bytes_before,
            bytes_after: footprint,
        })
    }
}

/// Oldest `created_at` kept by the age pass, or `None` when the retention
/// period reaches past the earliest representable instant.
fn retention_cutoff(now: DateTime<Utc>, retention_days: u32) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(TimeDelta::days(i64::from(retention_days)))
}

/// Delete up to `batch_size` of the oldest rows. Equal timestamps evict in
/// insertion order.
fn delete_oldest_batch(conn: &Connection, batch_size: u32) -> Result<u64> {
    let deleted = conn.execute(
        r#"
        DELETE FROM latex_events
        WHERE id IN (
            SELECT id FROM latex_events
            ORDER BY created_at ASC, id ASC
            LIMIT ?1
        )
        "#,
        params![i64::from(batch_size)],
    )?;
    Ok(deleted as u64)
}

/// Fold the WAL into the main file and rewrite it so freed pages leave the disk.
fn reclaim(conn: &Connection) -> Result<()> {
    checkpoint(conn)?;
    conn.execute_batch("VACUUM")?;
    // VACUUM in WAL mode writes the rebuilt pages through the log.
    checkpoint(conn)?;
    Ok(())
}

fn checkpoint(conn: &Connection) -> Result<()> {
    conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
    Ok(())
}
