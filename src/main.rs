/// Main entry point for the streak engine
///
/// This file sets up logging, parses command line arguments, and either runs
/// the engine as a long-lived service or performs one maintenance command.

use clap::{Parser, Subcommand};
use chrono::{NaiveDate, TimeZone, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use streak_engine::{EngineConfig, JobId, QueueOptions, StreakEngine};

/// Get the default database path with robust fallback strategy
fn get_default_database_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    // Try various locations in order of preference
    let potential_paths = [
        dirs::home_dir().map(|mut p| {
            p.push(".streak_engine");
            p
        }),
        dirs::data_dir().map(|mut p| {
            p.push("streak_engine");
            p
        }),
        std::env::current_dir().ok().map(|mut p| {
            p.push(".streak_engine");
            p
        }),
    ];

    for potential_path in potential_paths.iter().flatten() {
        if std::fs::create_dir_all(potential_path).is_ok() {
            let test_file = potential_path.join(".test_write");
            if std::fs::write(&test_file, "test").is_ok() {
                let _ = std::fs::remove_file(&test_file);
                return Ok(potential_path.join("streaks.db"));
            }
        }
    }

    let mut temp_path = std::env::temp_dir();
    temp_path.push("streak_engine");
    std::fs::create_dir_all(&temp_path)?;
    temp_path.push("streaks.db");

    tracing::warn!("Using temporary directory for database: {}", temp_path.display());
    Ok(temp_path)
}

/// Command line arguments for the streak engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    /// If not provided, uses a default location in the user's home directory
    #[arg(long, env = "STREAK_ENGINE_DATABASE")]
    database: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose output (implies debug)
    #[arg(short, long)]
    verbose: bool,

    /// Local time of the daily reset batch, HH:MM
    #[arg(long, env = "STREAK_ENGINE_RUN_AT", default_value = "00:00")]
    run_at: String,

    /// Offset of the local day from UTC, in minutes
    #[arg(long, env = "STREAK_ENGINE_UTC_OFFSET_MINUTES", default_value_t = 0, allow_hyphen_values = true)]
    utc_offset_minutes: i32,

    /// Number of concurrent reset job workers
    #[arg(long, env = "STREAK_ENGINE_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Idle worker poll interval in milliseconds
    #[arg(long, env = "STREAK_ENGINE_POLL_INTERVAL_MS", default_value_t = 500)]
    poll_interval_ms: u64,

    /// Delivery attempts per reset job before it is parked
    #[arg(long, env = "STREAK_ENGINE_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daily trigger and workers until interrupted (default)
    Serve,
    /// Run the reset batch once and process the resulting jobs
    RunBatch {
        /// Evaluate as of local midnight of this date instead of now
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Print parked reset jobs as JSON
    FailedJobs,
    /// Move a parked reset job back to the queue
    RetryFailed {
        id: i64,
    },
}

impl Args {
    fn engine_config(&self, database_path: PathBuf) -> Result<EngineConfig, Box<dyn std::error::Error>> {
        Ok(EngineConfig {
            database_path: Some(database_path),
            run_at: EngineConfig::parse_run_at(&self.run_at)?,
            utc_offset: EngineConfig::offset_from_minutes(self.utc_offset_minutes)?,
            workers: self.workers,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            queue: QueueOptions {
                max_attempts: self.max_attempts,
                ..QueueOptions::default()
            },
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Set up logging based on command line flags
    let log_level = if args.verbose {
        "debug"
    } else if args.debug {
        "info"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!("streak_engine={}", log_level))
        .with_writer(std::io::stderr) // Keep stdout for command output
        .init();

    let db_path = match &args.database {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            path.clone()
        }
        None => get_default_database_path()?,
    };
    info!("Using database at: {}", db_path.display());

    let config = args.engine_config(db_path)?;
    let engine = StreakEngine::new(config).await?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for ctrl-c: {}", e);
                }
                info!("Shutdown requested");
                let _ = shutdown_tx.send(true);
            });
            engine.run(shutdown_rx).await?;
        }
        Command::RunBatch { date } => {
            let now = match date {
                Some(date) => engine
                    .config()
                    .utc_offset
                    .from_local_datetime(&date.and_time(engine.config().run_at))
                    .single()
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok_or_else(|| format!("Cannot resolve {} in the configured offset", date))?,
                None => Utc::now(),
            };
            engine.requeue_stale()?;
            let report = engine.run_batch(now)?;
            let summary = engine.drain().await?;
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                "batch": report,
                "processed": summary,
            }))?);
        }
        Command::FailedJobs => {
            println!("{}", serde_json::to_string_pretty(&engine.failed_jobs()?)?);
        }
        Command::RetryFailed { id } => {
            engine.retry_failed(JobId(id), Utc::now())?;
            println!("Requeued job {}", id);
        }
    }

    info!("Streak engine shutdown complete");
    Ok(())
}
