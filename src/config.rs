/// Engine configuration
///
/// Built by the binary from command line flags (with environment fallbacks).
/// Library users can start from `EngineConfig::default()`.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, NaiveTime, Offset, Utc};
use thiserror::Error;

use crate::queue::QueueOptions;

/// Errors raised while turning raw settings into an `EngineConfig`
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid trigger time {0:?}, expected HH:MM")]
    InvalidRunAt(String),

    #[error("UTC offset of {0} minutes is out of range")]
    InvalidOffset(i32),

    #[error("Worker count must be at least 1")]
    NoWorkers,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// SQLite database file, `None` for a private in-memory database
    pub database_path: Option<PathBuf>,
    /// Local wall-clock time of the daily batch
    pub run_at: NaiveTime,
    /// Offset used to normalize timestamps to local midnight
    pub utc_offset: FixedOffset,
    pub workers: usize,
    /// How long an idle worker waits before polling the queue again
    pub poll_interval: Duration,
    /// Options attached to every reset job the batch enqueues
    pub queue: QueueOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            run_at: NaiveTime::MIN,
            utc_offset: Utc.fix(),
            workers: 4,
            poll_interval: Duration::from_millis(500),
            queue: QueueOptions::default(),
        }
    }
}

impl EngineConfig {
    /// Parse an `HH:MM` trigger time
    pub fn parse_run_at(s: &str) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|_| ConfigError::InvalidRunAt(s.to_string()))
    }

    /// Offset east of UTC, in minutes
    pub fn offset_from_minutes(minutes: i32) -> Result<FixedOffset, ConfigError> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::InvalidOffset(minutes))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }
}
