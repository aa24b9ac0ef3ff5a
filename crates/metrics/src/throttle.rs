//! Per-database cooldown for maintenance passes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Debounces maintenance so it runs at most once per interval per database.
///
/// This is not a scheduler: if writes stop arriving, no further pass runs.
#[derive(Debug)]
pub struct MaintenanceThrottle {
    interval: Duration,
    last_run: Mutex<HashMap<PathBuf, Instant>>,
}

impl MaintenanceThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: Mutex::new(HashMap::new()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a pass for `path` may run now. A `true` answer claims the slot.
    pub fn should_run(&self, path: &Path) -> bool {
        self.should_run_at(path, Instant::now())
    }

    /// [`should_run`](Self::should_run) against an explicit monotonic instant.
    pub fn should_run_at(&self, path: &Path, now: Instant) -> bool {
        // The map holds no invariant a panicking holder could break.
        let mut last_run = self.last_run.lock().unwrap_or_else(PoisonError::into_inner);
        let cooling_down = last_run
            .get(path)
            .is_some_and(|previous| now.saturating_duration_since(*previous) < self.interval);
        if cooling_down {
            return false;
        }
        last_run.insert(path.to_path_buf(), now);
        true
    }

    /// Forget every recorded run.
    pub fn reset(&self) {
        self.last_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
