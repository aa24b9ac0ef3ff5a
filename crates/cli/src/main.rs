mod config;
mod error;

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use metrics::{
    EventRecord, Maintainer, MetricsReader, MetricsStore, NewEvent, Status, StoreConfig, Window,
    clamp_event_limit,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use error::{Error, Result};

#[derive(Parser)]
#[command(name = "metricsctl")]
#[command(about = "Inspect and maintain the rendering outcome metrics store", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the metrics database (overrides METRICS_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store if needed and run one maintenance pass
    Init,
    /// Record one rendering outcome
    Record {
        /// Calling surface, e.g. "slash" or "legacy"
        #[arg(short, long)]
        source: String,
        /// success, timeout, compile_error or internal_error
        #[arg(long)]
        status: String,
        #[arg(long)]
        dpi: Option<i64>,
        #[arg(long)]
        user_id: Option<String>,
        /// Error text, truncated to 500 characters
        #[arg(long)]
        error: Option<String>,
    },
    /// Print attempt and error totals for a window
    Summary {
        /// 24h, 7d, 30d or 90d
        #[arg(short, long)]
        range: Option<String>,
    },
    /// Print bucketed counts for a window
    Timeseries {
        /// 24h, 7d, 30d or 90d
        #[arg(short, long)]
        range: Option<String>,
    },
    /// Print the most recent events
    Events {
        /// Number of events, 1 to 200
        #[arg(short, long)]
        limit: Option<i64>,
    },
    /// Run a maintenance pass now, ignoring the throttle
    Maintain,
}

fn main() {
    init_logging();
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Log to stderr so stdout stays parseable JSON.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| {
            let level = std::env::var("LOG_LEVEL").ok()?;
            let level = level.trim();
            if level.is_empty() {
                return None;
            }
            EnvFilter::try_new(level.to_lowercase()).ok()
        })
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::resolve(cli.config.as_deref(), cli.db)?;

    match cli.command {
        Commands::Init => cmd_init(config),
        Commands::Record {
            source,
            status,
            dpi,
            user_id,
            error,
        } => cmd_record(config, &source, &status, dpi, user_id, error),
        Commands::Summary { range } => {
            let window = Window::parse(range.as_deref());
            print_json(&MetricsReader::new(&config.path).summary(window)?)
        }
        Commands::Timeseries { range } => {
            let window = Window::parse(range.as_deref());
            print_json(&MetricsReader::new(&config.path).time_series(window)?)
        }
        Commands::Events { limit } => cmd_events(&config, limit),
        Commands::Maintain => cmd_maintain(config),
    }
}

fn cmd_init(config: StoreConfig) -> Result<()> {
    let store = MetricsStore::open(config)?;
    tracing::info!(path = %store.path().display(), "metrics store ready");
    Ok(())
}

fn cmd_record(
    config: StoreConfig,
    source: &str,
    status: &str,
    dpi: Option<i64>,
    user_id: Option<String>,
    error: Option<String>,
) -> Result<()> {
    // Validate before touching the filesystem.
    let status: Status = status.parse()?;
    let mut event = NewEvent::new(source, status);
    event.dpi = dpi;
    event.user_id = user_id;
    if let Some(message) = error.as_deref() {
        event = event.with_error_message(message);
    }

    let store = MetricsStore::open(config)?;
    store.record(&event)?;
    Ok(())
}

#[derive(Serialize)]
struct EventsOutput {
    events: Vec<EventRecord>,
    limit: i64,
}

fn cmd_events(config: &StoreConfig, limit: Option<i64>) -> Result<()> {
    let limit = clamp_event_limit(limit);
    let events = MetricsReader::new(&config.path).recent_events(Some(limit))?;
    print_json(&EventsOutput { events, limit })
}

fn cmd_maintain(config: StoreConfig) -> Result<()> {
    if !config.path.exists() {
        return Err(Error::DatabaseNotFound { path: config.path });
    }
    let report = Maintainer::from_config(&config).run(&config.path)?;
    print_json(&report)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
