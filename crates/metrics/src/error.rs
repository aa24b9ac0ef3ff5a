use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the metrics store.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller passed a status outside the closed set.
    #[error("invalid status '{0}'")]
    InvalidStatus(String),

    /// The embedded engine rejected an operation.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Filesystem access around the database file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration source could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A failed retention/eviction pass.
///
/// Returned by [`Maintainer`](crate::Maintainer) so direct callers can inspect
/// it; the store itself only logs it.
#[derive(Debug, Error)]
#[error("maintenance failed for {}: {source}", path.display())]
pub struct MaintenanceError {
    pub path: PathBuf,
    #[source]
    pub source: Error,
}
