//! CLI error types.

use std::path::PathBuf;
use thiserror::Error;

/// CLI errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The database file does not exist.
    ///
    /// This typically means the store was never initialized.
    #[error("database not found at {path}. Run 'metricsctl init' first")]
    DatabaseNotFound { path: PathBuf },

    /// An error occurred in the metrics store.
    #[error(transparent)]
    Metrics(#[from] metrics::Error),

    /// A forced maintenance pass failed.
    #[error(transparent)]
    Maintenance(#[from] metrics::MaintenanceError),

    /// Output could not be encoded.
    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
