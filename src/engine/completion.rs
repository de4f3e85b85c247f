/// Live completion path
///
/// Never waits on the nightly batch. The batch and this path meet only at
/// the streak's version column: whoever writes second re-reads and
/// re-applies its transition.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use crate::domain::{apply_completion, local_date, CompletionOutcome, HabitId, Streak, StreakKey, UserId};
use crate::storage::{HabitStorage, StorageError};
use crate::EngineError;

/// How many times a completion re-applies after losing a write race
const MAX_COMPLETION_ATTEMPTS: u32 = 3;

/// Result of one completion request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionReport {
    pub outcome: CompletionOutcome,
    pub streak: Streak,
}

pub struct CompletionService {
    storage: Arc<dyn HabitStorage>,
    offset: FixedOffset,
}

impl CompletionService {
    pub fn new(storage: Arc<dyn HabitStorage>, offset: FixedOffset) -> Self {
        Self { storage, offset }
    }

    /// Record that `user_id` completed `habit_id` at `now`
    pub fn complete(
        &self,
        user_id: &UserId,
        habit_id: &HabitId,
        now: DateTime<Utc>,
    ) -> Result<CompletionReport, EngineError> {
        let key = StreakKey::new(user_id.clone(), habit_id.clone());

        for attempt in 1..=MAX_COMPLETION_ATTEMPTS {
            let mut habit = self.storage.get_habit(habit_id)?;
            if habit.user_id != *user_id {
                // Someone else's habit looks exactly like a missing one
                return Err(StorageError::HabitNotFound { habit_id: habit_id.to_string() }.into());
            }
            if !habit.is_active {
                return Err(EngineError::HabitInactive(habit_id.clone()));
            }

            let existing = self.storage.get_streak(&key)?;
            let (next, outcome) = apply_completion(existing.as_ref(), &key, now, self.offset);
            if !outcome.is_change() {
                tracing::debug!("Habit already completed today for {}", key);
                return Ok(CompletionReport { outcome, streak: next });
            }

            habit.record_completion(local_date(now, self.offset));
            match self.storage.save_progress(&next, &habit) {
                Ok(stored) => {
                    tracing::debug!(
                        "Completion for {} {} streak (now {}, longest {})",
                        key, outcome.label(), stored.current_streak, stored.longest_streak
                    );
                    return Ok(CompletionReport { outcome, streak: stored });
                }
                Err(e) if e.is_conflict() => {
                    tracing::debug!(attempt, "Completion for {} lost a write race, re-reading: {}", key, e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(EngineError::Contention(key))
    }
}
