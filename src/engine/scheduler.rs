/// Nightly batch that turns running streaks into reset jobs
///
/// The batch only decides which streaks need a look, it never writes a
/// streak itself. Jobs for one run are enqueued in a single transaction, so
/// a failed run leaves nothing behind and the next trigger starts clean.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;

use crate::domain::{days_between, is_due_today, local_date, Habit, HabitId};
use crate::queue::{JobQueue, QueueOptions, ResetJob};
use crate::storage::{HabitStorage, StorageError};
use crate::EngineError;

/// Summary of one batch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub evaluation_date: Option<NaiveDate>,
    /// Active streaks loaded
    pub scanned: usize,
    /// Streaks whose habit was due today
    pub due: usize,
    pub enqueued: usize,
    /// Streaks whose habit is not due today
    pub not_due: usize,
    /// Streaks whose habit is deactivated
    pub inactive: usize,
    /// Streaks whose habit record is gone
    pub missing_habit: usize,
    /// Streaks whose habit row exists but cannot be decoded
    pub unreadable_habit: usize,
}

/// Cached outcome of loading a streak's habit
enum HabitLookup {
    Found(Habit),
    Missing,
    Unreadable,
}

pub struct BatchScheduler {
    storage: Arc<dyn HabitStorage>,
    queue: Arc<dyn JobQueue>,
    options: QueueOptions,
    offset: FixedOffset,
}

impl BatchScheduler {
    pub fn new(
        storage: Arc<dyn HabitStorage>,
        queue: Arc<dyn JobQueue>,
        options: QueueOptions,
        offset: FixedOffset,
    ) -> Self {
        Self { storage, queue, options, offset }
    }

    /// Scan active streaks and enqueue a reset job for every one that is due
    pub fn run_once(&self, now: DateTime<Utc>) -> Result<BatchReport, EngineError> {
        let today = local_date(now, self.offset);
        tracing::info!(%today, "Running daily streak reset batch");

        let streaks = self.storage.list_active_streaks()?;
        let mut habits: HashMap<HabitId, HabitLookup> = HashMap::new();
        let mut report = BatchReport {
            evaluation_date: Some(today),
            scanned: streaks.len(),
            ..BatchReport::default()
        };
        let mut jobs = Vec::new();

        for streak in streaks {
            let habit_id = &streak.key.habit_id;
            if !habits.contains_key(habit_id) {
                let lookup = match self.storage.get_habit(habit_id) {
                    Ok(habit) => HabitLookup::Found(habit),
                    Err(StorageError::HabitNotFound { .. }) => HabitLookup::Missing,
                    Err(e) if e.is_unreadable_row() => {
                        tracing::warn!("Habit {} cannot be decoded: {}", habit_id, e);
                        HabitLookup::Unreadable
                    }
                    Err(e) => return Err(e.into()),
                };
                habits.insert(habit_id.clone(), lookup);
            }

            let habit = match habits.get(habit_id) {
                Some(HabitLookup::Found(habit)) => habit,
                Some(HabitLookup::Unreadable) => {
                    tracing::warn!("Skipping streak for {}: habit row unreadable", streak.key);
                    report.unreadable_habit += 1;
                    continue;
                }
                Some(HabitLookup::Missing) | None => {
                    tracing::warn!("Skipping streak for {}: habit not found", streak.key);
                    report.missing_habit += 1;
                    continue;
                }
            };
            if !habit.is_active {
                report.inactive += 1;
                continue;
            }

            let last_completion = local_date(streak.last_completion_date, self.offset);
            if !is_due_today(&habit.frequency, last_completion, today) {
                tracing::debug!("Habit not due today for {}, skipping", streak.key);
                report.not_due += 1;
                continue;
            }

            report.due += 1;
            jobs.push(ResetJob {
                user_id: streak.key.user_id.clone(),
                habit_id: streak.key.habit_id.clone(),
                frequency: habit.frequency.clone(),
                current_streak: streak.current_streak,
                last_completion_date: streak.last_completion_date,
                days_since_last_completion: days_between(last_completion, today),
                evaluation_date: today,
            });
        }

        if !jobs.is_empty() {
            report.enqueued = self.queue.enqueue_all(&jobs, &self.options, now)?.len();
        }

        tracing::info!(
            scanned = report.scanned,
            due = report.due,
            enqueued = report.enqueued,
            not_due = report.not_due,
            inactive = report.inactive,
            missing_habit = report.missing_habit,
            unreadable_habit = report.unreadable_habit,
            "Streak reset batch enqueued {} jobs", report.enqueued
        );
        Ok(report)
    }
}
