/// Applies queued reset jobs to streak records

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::domain::{should_break, EvaluationOutcome};
use crate::queue::ResetJob;
use crate::storage::{HabitStorage, StorageError};

/// Why a job could not be processed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// Worth another delivery after backoff (storage hiccup, lost write race)
    #[error("transient failure: {0}")]
    Transient(String),

    /// Retrying cannot help (the streak or habit no longer exists)
    #[error("terminal failure: {0}")]
    Terminal(String),
}

impl From<StorageError> for ProcessError {
    fn from(e: StorageError) -> Self {
        if e.is_not_found() {
            ProcessError::Terminal(e.to_string())
        } else {
            ProcessError::Transient(e.to_string())
        }
    }
}

/// What processing a job did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// The streak was reset to zero
    Broken,
    /// Nothing to do, either within grace or already broken
    Unchanged,
    /// The user completed the habit after the job was enqueued
    Superseded,
}

/// Handles one job delivery
///
/// Workers are generic over this so the retry machinery can be exercised
/// without a real store.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &ResetJob, now: DateTime<Utc>) -> Result<ProcessOutcome, ProcessError>;
}

/// Re-derives the break decision for a reset job and writes it back
#[derive(Clone)]
pub struct JobProcessor {
    storage: Arc<dyn HabitStorage>,
}

impl JobProcessor {
    pub fn new(storage: Arc<dyn HabitStorage>) -> Self {
        Self { storage }
    }

    /// Process a job synchronously
    ///
    /// Safe to run twice for the same job: a second run finds the streak
    /// already at zero (unchanged) or with a newer completion (superseded).
    pub fn process(&self, job: &ResetJob, now: DateTime<Utc>) -> Result<ProcessOutcome, ProcessError> {
        let key = job.key();
        if !should_break(job.current_streak, job.days_since_last_completion) {
            tracing::debug!(
                "Streak for {} within grace ({} days since last completion)",
                key, job.days_since_last_completion
            );
            return Ok(ProcessOutcome::Unchanged);
        }

        let streak = self
            .storage
            .get_streak(&key)?
            .ok_or_else(|| ProcessError::Terminal(format!("Streak not found for {}", key)))?;

        if streak.last_completion_date != job.last_completion_date {
            tracing::debug!("Streak for {} completed after the batch ran, skipping reset", key);
            return Ok(ProcessOutcome::Superseded);
        }

        let (next, outcome) = streak.on_scheduled_evaluation(job.days_since_last_completion, now);
        if outcome == EvaluationOutcome::Unchanged {
            return Ok(ProcessOutcome::Unchanged);
        }

        let mut habit = self.storage.get_habit(&key.habit_id)?;
        let missed_days = u32::try_from(job.days_since_last_completion - 1).unwrap_or(u32::MAX);
        habit.record_miss(job.evaluation_date, missed_days);

        self.storage.save_progress(&next, &habit)?;
        tracing::debug!(
            "Reset streak for {} (was {}, last completion: {} days ago)",
            key, job.current_streak, job.days_since_last_completion
        );
        Ok(ProcessOutcome::Broken)
    }
}

#[async_trait]
impl JobHandler for JobProcessor {
    /// Runs `process` on the blocking pool, SQLite calls hold a mutex and do disk I/O
    async fn handle(&self, job: &ResetJob, now: DateTime<Utc>) -> Result<ProcessOutcome, ProcessError> {
        let processor = self.clone();
        let job = job.clone();
        tokio::task::spawn_blocking(move || processor.process(&job, now))
            .await
            .map_err(|e| ProcessError::Transient(format!("Reset job task failed: {}", e)))?
    }
}
