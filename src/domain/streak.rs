/// Streak record and the transitions that move it
///
/// Two entry points exist and both are pure: [`Streak::on_completion`] (plus
/// [`apply_completion`] for the lazy-create case) is the only way a streak
/// grows, and [`Streak::on_scheduled_evaluation`] is the only way it drops
/// to zero. Since one only moves away from zero and the other only towards
/// it, running both against the same record at the same time can at worst
/// produce a redundant write.

use serde::{Deserialize, Serialize};
use chrono::{DateTime, FixedOffset, Utc};
use crate::domain::{days_between, local_date, StreakKey};

/// Gap, in whole days since the last completion, that breaks a streak
///
/// A gap of one day is the grace window: the user still has today.
pub const BREAK_AFTER_DAYS: i64 = 2;

/// Persisted streak state for one (user, habit) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Streak {
    pub key: StreakKey,
    /// Current consecutive completions
    pub current_streak: u32,
    /// Best streak ever achieved, never below `current_streak`
    pub longest_streak: u32,
    pub last_completion_date: DateTime<Utc>,
    pub streak_start_date: DateTime<Utc>,
    pub total_resets: u32,
    pub last_reset_date: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, 0 means the record was never stored
    pub version: u64,
}

/// What a completion did to the streak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// No record existed, a new one starts at 1
    Created,
    /// Habit was already completed today, nothing changed
    AlreadyCompleted,
    /// Completed the day after the previous completion
    Continued,
    /// Completed after a missed window, starts over at 1
    Restarted,
}

impl CompletionOutcome {
    /// Whether the outcome needs to be written back
    pub fn is_change(self) -> bool {
        !matches!(self, CompletionOutcome::AlreadyCompleted)
    }

    pub fn label(self) -> &'static str {
        match self {
            CompletionOutcome::Created => "created",
            CompletionOutcome::AlreadyCompleted => "already completed",
            CompletionOutcome::Continued => "continued",
            CompletionOutcome::Restarted => "restarted",
        }
    }
}

/// What a scheduled evaluation did to the streak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationOutcome {
    Broken,
    Unchanged,
}

impl EvaluationOutcome {
    pub fn label(self) -> &'static str {
        match self {
            EvaluationOutcome::Broken => "broken",
            EvaluationOutcome::Unchanged => "unchanged",
        }
    }
}

/// Decide whether a streak of `current_streak` should break after `days_since_last_completion`
pub fn should_break(current_streak: u32, days_since_last_completion: i64) -> bool {
    current_streak > 0 && days_since_last_completion >= BREAK_AFTER_DAYS
}

/// Apply a completion to an optional existing record
///
/// A missing record is created with current = longest = 1.
pub fn apply_completion(
    existing: Option<&Streak>,
    key: &StreakKey,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> (Streak, CompletionOutcome) {
    match existing {
        Some(streak) => streak.on_completion(now, offset),
        None => (Streak::start(key.clone(), now), CompletionOutcome::Created),
    }
}

impl Streak {
    /// A fresh, unsaved streak of length 1 starting at `now`
    pub fn start(key: StreakKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            current_streak: 1,
            longest_streak: 1,
            last_completion_date: now,
            streak_start_date: now,
            total_resets: 0,
            last_reset_date: None,
            version: 0,
        }
    }

    /// Whole local days between the last completion and `now`
    pub fn days_since_last_completion(&self, now: DateTime<Utc>, offset: FixedOffset) -> i64 {
        days_between(local_date(self.last_completion_date, offset), local_date(now, offset))
    }

    /// Compute the state after the user completes the habit at `now`
    ///
    /// A completion timestamped before the last one (clock skew between
    /// writers) is treated like a same-day completion.
    pub fn on_completion(&self, now: DateTime<Utc>, offset: FixedOffset) -> (Streak, CompletionOutcome) {
        let days = self.days_since_last_completion(now, offset);
        if days <= 0 {
            return (self.clone(), CompletionOutcome::AlreadyCompleted);
        }

        let mut next = self.clone();
        let outcome = if days == 1 {
            next.current_streak = next.current_streak.saturating_add(1);
            CompletionOutcome::Continued
        } else {
            // The nightly evaluator may not have zeroed the streak yet.
            next.current_streak = 1;
            next.streak_start_date = now;
            CompletionOutcome::Restarted
        };
        next.longest_streak = next.longest_streak.max(next.current_streak);
        next.last_completion_date = now;

        (next, outcome)
    }

    /// Compute the state after the nightly evaluation decided the habit was due
    ///
    /// Never increases `current_streak`. Re-applying with the same input to
    /// an already broken streak is a no-op.
    pub fn on_scheduled_evaluation(
        &self,
        days_since_last_completion: i64,
        evaluated_at: DateTime<Utc>,
    ) -> (Streak, EvaluationOutcome) {
        if !should_break(self.current_streak, days_since_last_completion) {
            return (self.clone(), EvaluationOutcome::Unchanged);
        }

        let mut next = self.clone();
        next.current_streak = 0;
        next.total_resets = next.total_resets.saturating_add(1);
        next.last_reset_date = Some(evaluated_at);
        (next, EvaluationOutcome::Broken)
    }

    /// Current streak as a percentage of the longest one (0 when longest is 0)
    pub fn percentage_of_longest(&self) -> f64 {
        if self.longest_streak == 0 {
            0.0
        } else {
            f64::from(self.current_streak) / f64::from(self.longest_streak) * 100.0
        }
    }
}
