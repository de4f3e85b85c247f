/// Durable work queue carrying reset jobs from the nightly batch to the workers
///
/// Delivery is at-least-once: a job claimed by a worker that dies stays
/// `active` until [`JobQueue::requeue_stale`] puts it back. Every job
/// carries its own retry policy, there is no queue-wide default at
/// delivery time.

pub mod job;
pub mod retry;
pub mod sqlite;

pub use job::*;
pub use retry::*;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during queue operations
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[error("Queue query error: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Job payload error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {id} is {status:?}, expected {expected:?}")]
    InvalidState { id: JobId, status: JobStatus, expected: JobStatus },
}

/// Interface of the durable queue
pub trait JobQueue: Send + Sync {
    /// Enqueue every job in one atomic step, either all are queued or none
    fn enqueue_all(
        &self,
        jobs: &[ResetJob],
        options: &QueueOptions,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobId>, QueueError>;

    /// Claim the oldest pending job whose `run_after` has passed
    fn claim(&self, now: DateTime<Utc>) -> Result<Option<QueuedJob>, QueueError>;

    /// Acknowledge a successfully processed job
    fn complete(&self, id: JobId) -> Result<(), QueueError>;

    /// Record a failed delivery and reschedule or park it
    fn fail(&self, id: JobId, reason: &str, now: DateTime<Utc>) -> Result<FailureDisposition, QueueError>;

    /// Move a job straight to the failed set, skipping any retries left
    fn park(&self, id: JobId, reason: &str) -> Result<(), QueueError>;

    /// Return jobs left `active` by a crashed worker to `pending`
    fn requeue_stale(&self) -> Result<usize, QueueError>;

    fn failed_jobs(&self) -> Result<Vec<QueuedJob>, QueueError>;

    /// Give a parked job a fresh set of attempts
    fn retry_failed(&self, id: JobId, now: DateTime<Utc>) -> Result<(), QueueError>;

    fn stats(&self) -> Result<QueueStats, QueueError>;
}
