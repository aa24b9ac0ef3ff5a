//! Store settings resolution for the CLI.
//!
//! Precedence, lowest to highest: built-in defaults, the TOML file, the
//! `METRICS_*` environment, the `--db` flag.

use std::path::{Path, PathBuf};

use metrics::StoreConfig;

use crate::error::Result;

/// Config file read when `--config` is not given, if present.
pub const CONFIG_FILE: &str = "metrics.toml";

pub fn resolve(config_path: Option<&Path>, db: Option<PathBuf>) -> Result<StoreConfig> {
    resolve_with(config_path, db, |key| std::env::var(key).ok())
}

fn resolve_with(
    config_path: Option<&Path>,
    db: Option<PathBuf>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<StoreConfig> {
    let base = match config_path {
        Some(path) => StoreConfig::load(path)?,
        None if Path::new(CONFIG_FILE).exists() => StoreConfig::load(CONFIG_FILE)?,
        None => StoreConfig::default(),
    };

    let mut config = base.with_overrides(lookup);
    if let Some(db) = db {
        config = config.with_path(db);
    }
    Ok(config)
}
