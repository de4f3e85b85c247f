/// Public library interface for the streak engine
///
/// This module exports the engine facade and the public types used by the
/// binary, by tests, and by applications embedding the engine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;

pub mod domain;
pub mod storage;
pub mod queue;
pub mod engine;
pub mod analytics;
pub mod config;

pub use domain::*;
pub use storage::{SqliteStorage, StorageError, HabitStorage};
pub use queue::{JobId, JobQueue, QueueError, QueueOptions, QueueStats, QueuedJob, ResetJob};
pub use engine::{
    BatchReport, BatchScheduler, CompletionReport, CompletionService, DailyTrigger, DrainSummary,
    JobProcessor, JobReport, ProcessOutcome, WorkerPool,
};
pub use analytics::{AnalyticsEngine, RecoveryReport, UserAnalytics};
pub use config::{ConfigError, EngineConfig};

/// Errors that can occur during engine operation
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Domain validation error: {0}")]
    Domain(#[from] DomainError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Habit {0} is deactivated")]
    HabitInactive(HabitId),

    #[error("Gave up after repeated write conflicts on streak for {0}")]
    Contention(StreakKey),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Streak engine wiring storage, queue, scheduler and workers together
///
/// One SQLite database backs both the habit/streak tables and the reset job
/// queue. Every operation that depends on the clock takes `now` explicitly;
/// only `run` and `drain` read the wall clock.
pub struct StreakEngine {
    storage: Arc<SqliteStorage>,
    config: EngineConfig,
    completions: CompletionService,
    scheduler: Arc<BatchScheduler>,
    workers: WorkerPool,
    analytics: AnalyticsEngine,
}

impl StreakEngine {
    /// Create a new engine from `config`
    ///
    /// Opens (and migrates) the configured database file, or a private
    /// in-memory database when no path is set.
    pub async fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let storage = match &config.database_path {
            Some(path) => {
                tracing::info!("Initializing streak engine with database: {:?}", path);
                SqliteStorage::new(path.clone())?
            }
            None => {
                tracing::info!("Initializing streak engine with in-memory database");
                SqliteStorage::open_in_memory()?
            }
        };
        let storage = Arc::new(storage);

        let completions = CompletionService::new(storage.clone(), config.utc_offset);
        let scheduler = Arc::new(BatchScheduler::new(
            storage.clone(),
            storage.clone(),
            config.queue.clone(),
            config.utc_offset,
        ));
        let processor = Arc::new(JobProcessor::new(storage.clone()));
        let workers = WorkerPool::new(storage.clone(), processor, config.workers, config.poll_interval);

        Ok(Self {
            storage,
            config,
            completions,
            scheduler,
            workers,
            analytics: AnalyticsEngine::new(),
        })
    }

    pub fn create_habit(
        &self,
        user_id: UserId,
        title: String,
        description: Option<String>,
        frequency: RecurrenceRule,
        now: DateTime<Utc>,
    ) -> Result<Habit, EngineError> {
        let habit = Habit::new(user_id, title, description, frequency, now)?;
        self.storage.create_habit(&habit)?;
        tracing::info!("Created habit '{}' ({})", habit.title, habit.id);
        Ok(habit)
    }

    /// Change a habit's recurrence rule, validated strictly
    pub fn set_habit_frequency(&self, habit_id: &HabitId, frequency: RecurrenceRule) -> Result<Habit, EngineError> {
        let mut habit = self.storage.get_habit(habit_id)?;
        habit.set_frequency(frequency)?;
        self.storage.update_habit(&habit)?;
        Ok(habit)
    }

    pub fn deactivate_habit(&self, habit_id: &HabitId) -> Result<(), EngineError> {
        self.storage.deactivate_habit(habit_id)?;
        Ok(())
    }

    /// Record a completion on the live path
    pub fn complete_habit(
        &self,
        user_id: &UserId,
        habit_id: &HabitId,
        now: DateTime<Utc>,
    ) -> Result<CompletionReport, EngineError> {
        self.completions.complete(user_id, habit_id, now)
    }

    /// Run the nightly batch once, as if the trigger fired at `now`
    pub fn run_batch(&self, now: DateTime<Utc>) -> Result<BatchReport, EngineError> {
        self.scheduler.run_once(now)
    }

    /// Claim and process a single reset job
    pub async fn process_next(&self, now: DateTime<Utc>) -> Result<Option<JobReport>, EngineError> {
        self.workers.process_next(now).await
    }

    /// Process queued reset jobs until the queue is idle
    pub async fn drain(&self) -> Result<DrainSummary, EngineError> {
        self.workers.drain().await
    }

    /// Jobs parked after exhausting retries or failing terminally
    pub fn failed_jobs(&self) -> Result<Vec<QueuedJob>, EngineError> {
        Ok(self.storage.failed_jobs()?)
    }

    /// Put a parked job back in the queue with a fresh attempt budget
    pub fn retry_failed(&self, id: JobId, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.storage.retry_failed(id, now)?;
        tracing::info!("Requeued failed job {}", id);
        Ok(())
    }

    /// Return jobs left active by a dead process to the queue
    pub fn requeue_stale(&self) -> Result<usize, EngineError> {
        Ok(self.storage.requeue_stale()?)
    }

    pub fn queue_stats(&self) -> Result<QueueStats, EngineError> {
        Ok(self.storage.stats()?)
    }

    pub fn user_analytics(&self, user_id: &UserId) -> Result<UserAnalytics, EngineError> {
        let habits = self.storage.list_habits(Some(user_id), true)?;
        let streaks = self.storage.list_streaks(user_id)?;
        Ok(self.analytics.user_analytics(&habits, &streaks))
    }

    pub fn recovery_report(&self, user_id: &UserId, habit_id: &HabitId) -> Result<RecoveryReport, EngineError> {
        let habit = self.storage.get_habit(habit_id)?;
        let streak = self.storage.get_streak(&StreakKey::new(user_id.clone(), habit_id.clone()))?;
        Ok(self.analytics.recovery_report(&habit, streak.as_ref()))
    }

    /// Run the daily trigger and the worker pool until `shutdown` flips to true
    ///
    /// Jobs left active by a previous process are returned to the queue first.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), EngineError> {
        self.requeue_stale()?;

        let trigger = DailyTrigger::new(self.scheduler.clone(), self.config.run_at, self.config.utc_offset);
        tracing::info!(
            run_at = %self.config.run_at,
            utc_offset = %self.config.utc_offset,
            "Streak engine started"
        );
        tokio::join!(trigger.run(shutdown.clone()), self.workers.run(shutdown));
        Ok(())
    }

    /// Get a reference to the storage layer (useful for testing)
    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    /// Get a reference to the analytics engine (useful for testing)
    pub fn analytics(&self) -> &AnalyticsEngine {
        &self.analytics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
