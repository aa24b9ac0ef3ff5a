//! On-disk footprint measurement.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// Measures how many bytes a database occupies on disk.
pub trait FootprintProbe: Send + Sync {
    fn measure(&self, db_path: &Path) -> io::Result<u64>;
}

/// Sums the database file and its `-wal` and `-shm` companions.
///
/// Missing files count as zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFootprint;

impl FootprintProbe for DiskFootprint {
    fn measure(&self, db_path: &Path) -> io::Result<u64> {
        let mut total = 0;
        for path in storage_files(db_path) {
            match std::fs::metadata(&path) {
                Ok(meta) => total += meta.len(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }
}

/// The main file plus the WAL and shared-memory files SQLite may create beside it.
pub fn storage_files(db_path: &Path) -> [PathBuf; 3] {
    [
        db_path.to_path_buf(),
        with_suffix(db_path, "-wal"),
        with_suffix(db_path, "-shm"),
    ]
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
