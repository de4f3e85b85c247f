/// Reset jobs and their queue envelope

use std::fmt;

use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveDate, Utc};
use crate::domain::{HabitId, RecurrenceRule, StreakKey, UserId};
use crate::queue::QueueOptions;

/// Row id of a job inside the durable queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One streak's pending break evaluation
///
/// Everything here is a snapshot taken when the batch ran. The elapsed day
/// count in particular is not recomputed when a backlog delays processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetJob {
    pub user_id: UserId,
    pub habit_id: HabitId,
    pub frequency: RecurrenceRule,
    pub current_streak: u32,
    pub last_completion_date: DateTime<Utc>,
    pub days_since_last_completion: i64,
    /// Local day the batch evaluated
    pub evaluation_date: NaiveDate,
}

impl ResetJob {
    pub fn key(&self) -> StreakKey {
        StreakKey::new(self.user_id.clone(), self.habit_id.clone())
    }
}

/// Lifecycle state of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for `run_after`
    Pending,
    /// Claimed by a worker
    Active,
    /// Finished, only kept when `remove_on_success` is off
    Completed,
    /// Retries exhausted or terminal error, kept for inspection
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "active" => Some(JobStatus::Active),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// A job as stored in the queue, with its delivery bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: JobId,
    pub job: ResetJob,
    pub options: QueueOptions,
    pub status: JobStatus,
    /// Deliveries so far, including the current one
    pub attempts: u32,
    pub run_after: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn attempts_left(&self) -> u32 {
        self.options.max_attempts.saturating_sub(self.attempts)
    }
}

/// Where a failed delivery ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum FailureDisposition {
    /// Back to pending, runnable again after the backoff delay
    Retrying { attempt: u32, run_after: DateTime<Utc> },
    /// Moved to the failed set
    Parked,
    /// Dropped because the job was enqueued without `retain_on_failure`
    Discarded,
}

/// Job counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}
