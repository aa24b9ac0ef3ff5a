use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use metrics::{
    DiskFootprint, ENV_RETENTION_DAYS, Error, FootprintProbe, MaintenanceThrottle, Maintainer,
    MetricsReader, MetricsStore, NewEvent, Status, StoreConfig, Window, format_timestamp,
};
use rusqlite::{Connection, params};

fn open(dir: &tempfile::TempDir) -> MetricsStore {
    MetricsStore::open(StoreConfig::new(dir.path().join("metrics.db"))).unwrap()
}

fn insert_row(path: &Path, created_at: DateTime<Utc>, source: &str, status: &str) {
    let conn = Connection::open(path).unwrap();
    conn.execute(
        "INSERT INTO latex_events (created_at, source, status, dpi, user_id, error_message) \
         VALUES (?1, ?2, ?3, 275, '42', NULL)",
        params![format_timestamp(created_at), source, status],
    )
    .unwrap();
}

fn total_rows(path: &Path) -> i64 {
    let conn = Connection::open(path).unwrap();
    conn.query_row("SELECT COUNT(*) FROM latex_events", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn every_valid_status_is_retrievable() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);

    for status in Status::ALL {
        store
            .record_event("slash", status.as_str(), Some(300), Some("7"), None)
            .unwrap();
    }

    let events = store.reader().recent_events(None).unwrap();
    let mut statuses: Vec<_> = events.iter().filter_map(|e| e.known_status()).collect();
    statuses.reverse();
    assert_eq!(statuses, Status::ALL.to_vec());
    assert!(events.iter().all(|e| e.dpi == Some(300)));
    assert!(events.iter().all(|e| e.user_id.as_deref() == Some("7")));
}

#[test]
fn invalid_status_persists_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);

    let err = store
        .record_event("slash", "SUCCESS", None, None, None)
        .unwrap_err();

    assert!(matches!(err, Error::InvalidStatus(_)));
    assert!(store.reader().recent_events(None).unwrap().is_empty());
}

#[test]
fn expired_row_is_excluded_from_every_window() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let now = Utc::now();
    insert_row(store.path(), now - TimeDelta::hours(2), "slash", "success");
    insert_row(store.path(), now - TimeDelta::days(95), "legacy", "compile_error");

    for window in Window::ALL {
        let summary = store.reader().summary_at(window, now).unwrap();
        assert_eq!(summary.attempts, 1, "window {window}");
        assert_eq!(summary.successes, 1, "window {window}");
        assert_eq!(summary.errors, 0, "window {window}");
        assert_eq!(summary.error_rate_percent, 0.0);
    }

    store.maintain().unwrap();
    assert_eq!(total_rows(store.path()), 1);
}

#[test]
fn retention_prunes_rows_older_than_configured_days() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let now = Utc::now();
    insert_row(store.path(), now - TimeDelta::days(120), "legacy", "compile_error");
    insert_row(store.path(), now - TimeDelta::days(2), "slash", "success");

    let report = store.maintain().unwrap();

    assert_eq!(report.pruned_by_age, 1);
    let events = store.reader().recent_events(None).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source, "slash");
    assert_eq!(events[0].known_status(), Some(Status::Success));
}

#[test]
fn open_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    store.record(&NewEvent::new("slash", Status::Timeout)).unwrap();
    let before = store.reader().recent_events(None).unwrap();

    let again = open(&dir);
    let after = again.reader().recent_events(None).unwrap();

    assert_eq!(before, after);
    let conn = Connection::open(again.path()).unwrap();
    let indexes: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND tbl_name = 'latex_events'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(indexes, 3);
}

#[test]
fn open_runs_maintenance() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    insert_row(store.path(), Utc::now() - TimeDelta::days(365), "legacy", "timeout");

    let reopened = MetricsStore::open(store.config().clone().with_retention_days(30)).unwrap();

    assert_eq!(total_rows(reopened.path()), 0);
}

#[test]
fn huge_retention_period_keeps_every_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.db");
    let config = StoreConfig::new(&path)
        .with_overrides(|key| (key == ENV_RETENTION_DAYS).then(|| "100000000".to_string()));
    assert_eq!(config.retention_days, 100_000_000);

    let store = MetricsStore::open(config).unwrap();
    insert_row(store.path(), Utc::now() - TimeDelta::days(3650), "legacy", "timeout");
    store.record(&NewEvent::new("slash", Status::Success)).unwrap();

    let report = store.maintain().unwrap();
    assert_eq!(report.pruned_by_age, 0);
    assert_eq!(total_rows(store.path()), 2);
}

#[test]
fn summary_and_series_agree_on_totals() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let now = Utc::now();
    let statuses = ["success", "timeout", "compile_error", "internal_error", "success"];
    for (i, status) in statuses.iter().enumerate() {
        let source = if i % 2 == 0 { "slash" } else { "legacy" };
        insert_row(store.path(), now - TimeDelta::hours(i as i64 * 3), source, status);
    }

    let reader = MetricsReader::new(store.path());
    let summary = reader.summary_at(Window::Last7Days, now).unwrap();
    let series = reader.time_series_at(Window::Last7Days, now).unwrap();

    assert_eq!(summary.attempts, 5);
    assert_eq!(summary.successes, 2);
    assert_eq!(summary.errors, 3);
    assert_eq!(summary.error_rate_percent, 60.0);
    let by_source_attempts: u64 = summary.by_source.values().map(|c| c.attempts).sum();
    assert_eq!(by_source_attempts, summary.attempts);

    assert_eq!(series.totals.attempts.len(), 168);
    assert_eq!(series.totals.attempts.iter().sum::<u64>(), summary.attempts);
    assert_eq!(series.totals.successes.iter().sum::<u64>(), summary.successes);
    assert_eq!(series.totals.errors.iter().sum::<u64>(), summary.errors);
    let per_status: u64 = [
        &series.errors_by_status.timeout,
        &series.errors_by_status.compile_error,
        &series.errors_by_status.internal_error,
    ]
    .iter()
    .map(|s| s.iter().sum::<u64>())
    .sum();
    assert_eq!(per_status, summary.errors);
    for counts in series.by_source.values() {
        assert_eq!(counts.len(), 168);
    }
}

#[test]
fn reads_against_missing_store_are_empty() {
    let dir = tempfile::tempdir().unwrap();
    let reader = MetricsReader::new(dir.path().join("never-created.db"));

    let summary = reader.summary(Window::parse(None)).unwrap();
    let series = reader.time_series(Window::parse(Some("30d"))).unwrap();
    let events = reader.recent_events(Some(10)).unwrap();

    assert_eq!(summary.window.key, Window::Last90Days);
    assert_eq!(summary.attempts, 0);
    assert_eq!(series.labels.len(), 30);
    assert!(series.totals.attempts.iter().all(|n| *n == 0));
    assert!(events.is_empty());
    assert!(!reader.path().exists());
}

#[test]
fn concurrent_writers_keep_every_event() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(dir.path().join("metrics.db"));
    let throttle = Arc::new(MaintenanceThrottle::new(Duration::from_secs(60)));
    let store = MetricsStore::open_with_throttle(config, throttle).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    store
                        .record(&NewEvent::new(format!("worker-{worker}"), Status::Success))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(total_rows(store.path()), 100);
    let summary = store.reader().summary(Window::Last24Hours).unwrap();
    assert_eq!(summary.attempts, 100);
    assert_eq!(summary.by_source.len(), 4);
}

#[test]
fn size_cap_keeps_newest_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let now = Utc::now();
    {
        let mut conn = Connection::open(store.path()).unwrap();
        let tx = conn.transaction().unwrap();
        let padding = "p".repeat(450);
        for i in 0..3000i64 {
            tx.execute(
                "INSERT INTO latex_events (created_at, source, status, error_message) \
                 VALUES (?1, 'bulk', 'internal_error', ?2)",
                params![format_timestamp(now - TimeDelta::seconds(3000 - i)), padding],
            )
            .unwrap();
        }
        tx.commit().unwrap();
    }
    let before = DiskFootprint.measure(store.path()).unwrap();
    let newest_id: i64 = Connection::open(store.path())
        .unwrap()
        .query_row("SELECT MAX(id) FROM latex_events", [], |row| row.get(0))
        .unwrap();

    let report = Maintainer::new(3650, before / 3)
        .with_batch_size(250)
        .run(store.path())
        .unwrap();

    assert!(report.pruned_by_size > 0);
    assert!(report.bytes_after <= before / 3);
    let remaining = store.reader().recent_events(Some(1)).unwrap();
    assert_eq!(remaining[0].id, newest_id);
}
