/// Analytics engine for consistency and risk scoring
///
/// Everything here is a pure function of habit counters and streak records.
/// All rates are percentages in [0, 100].

use serde::Serialize;
use chrono::{DateTime, NaiveDate, Utc};
use crate::domain::{Habit, HabitId, Streak};

/// Per-habit scores used to pick the strongest and weakest habit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HabitScore {
    pub habit_id: HabitId,
    pub title: String,
    pub completion_rate: f64,
    pub risk_score: f64,
    pub current_streak: u32,
    pub longest_streak: u32,
}

/// Totals over all of a user's streaks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreakSummary {
    pub total_current_streak: u64,
    pub longest_active_streak: u32,
    pub all_time_longest_streak: u32,
    pub active_streaks_count: usize,
}

/// How often a habit breaks relative to how often it gets done
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryReport {
    pub total_resets: u32,
    pub last_reset_date: Option<DateTime<Utc>>,
    pub last_recovery_date: Option<NaiveDate>,
    /// Resets per completion, as a percentage
    pub recovery_rate: f64,
    pub has_recovered: bool,
}

/// Everything the engine reports for one user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserAnalytics {
    pub overall_success_rate: f64,
    pub consistency_score: f64,
    pub total_active_habits: usize,
    pub streak_summary: StreakSummary,
    pub strongest_habit: Option<HabitScore>,
    pub weakest_habit: Option<HabitScore>,
}

/// Analytics engine for processing habit data
#[derive(Debug, Default)]
pub struct AnalyticsEngine {}

impl AnalyticsEngine {
    /// Create a new analytics engine
    pub fn new() -> Self {
        Self {}
    }

    /// `completions / (completions + missed_days) * 100`, 0 with no data
    pub fn completion_rate(&self, completions: u32, missed_days: u32) -> f64 {
        let total = u64::from(completions) + u64::from(missed_days);
        if total == 0 {
            0.0
        } else {
            completions as f64 / total as f64 * 100.0
        }
    }

    /// Risk of abandoning a habit, higher means more at risk
    ///
    /// 60% weight on the run of consecutive misses (25 points each, capped
    /// at 100) and 40% on the missing share of completions.
    pub fn risk_score(&self, consecutive_misses: u32, completion_rate: f64) -> f64 {
        let miss_risk = (f64::from(consecutive_misses) * 25.0).min(100.0);
        let completion_risk = 100.0 - completion_rate;
        miss_risk * 0.6 + completion_risk * 0.4
    }

    /// Success rate pooled across the user's active habits
    pub fn overall_success_rate(&self, habits: &[Habit]) -> f64 {
        let (completions, missed) = habits
            .iter()
            .filter(|h| h.is_active)
            .fold((0u64, 0u64), |(c, m), h| {
                (c + u64::from(h.counters.total_completions), m + u64::from(h.counters.total_missed_days))
            });
        let total = completions + missed;
        if total == 0 {
            0.0
        } else {
            completions as f64 / total as f64 * 100.0
        }
    }

    /// Mean of current/longest across streaks
    pub fn avg_streak_percentage(&self, streaks: &[Streak]) -> f64 {
        if streaks.is_empty() {
            return 0.0;
        }
        streaks.iter().map(Streak::percentage_of_longest).sum::<f64>() / streaks.len() as f64
    }

    /// Share of active habits that have ever recovered from a miss
    pub fn recovery_rate(&self, habits: &[Habit]) -> f64 {
        let active: Vec<&Habit> = habits.iter().filter(|h| h.is_active).collect();
        if active.is_empty() {
            return 0.0;
        }
        let recovered = active.iter().filter(|h| h.counters.last_recovery_date.is_some()).count();
        recovered as f64 / active.len() as f64 * 100.0
    }

    /// Weighted consistency score, clamped to [0, 100]
    ///
    /// 50% overall success rate, 30% average streak maintenance, 20%
    /// recovery. A user without active habits scores 0.
    pub fn consistency_score(&self, habits: &[Habit], streaks: &[Streak]) -> f64 {
        if !habits.iter().any(|h| h.is_active) {
            return 0.0;
        }
        let score = self.overall_success_rate(habits) * 0.5
            + self.avg_streak_percentage(streaks) * 0.3
            + self.recovery_rate(habits) * 0.2;
        score.clamp(0.0, 100.0)
    }

    pub fn streak_summary(&self, streaks: &[Streak]) -> StreakSummary {
        StreakSummary {
            total_current_streak: streaks.iter().map(|s| u64::from(s.current_streak)).sum(),
            longest_active_streak: streaks.iter().map(|s| s.current_streak).max().unwrap_or(0),
            all_time_longest_streak: streaks.iter().map(|s| s.longest_streak).max().unwrap_or(0),
            active_streaks_count: streaks.iter().filter(|s| s.current_streak > 0).count(),
        }
    }

    /// Score every active habit, pairing it with its streak when there is one
    pub fn habit_scores(&self, habits: &[Habit], streaks: &[Streak]) -> Vec<HabitScore> {
        habits
            .iter()
            .filter(|h| h.is_active)
            .map(|habit| {
                let streak = streaks.iter().find(|s| s.key.habit_id == habit.id);
                let completion_rate = self.completion_rate(
                    habit.counters.total_completions,
                    habit.counters.total_missed_days,
                );
                HabitScore {
                    habit_id: habit.id.clone(),
                    title: habit.title.clone(),
                    completion_rate,
                    risk_score: self.risk_score(habit.counters.consecutive_misses, completion_rate),
                    current_streak: streak.map_or(0, |s| s.current_streak),
                    longest_streak: streak.map_or(0, |s| s.longest_streak),
                }
            })
            .collect()
    }

    /// Highest completion rate, ties go to the longer current streak
    pub fn strongest_habit(&self, scores: &[HabitScore]) -> Option<HabitScore> {
        scores
            .iter()
            .reduce(|best, current| {
                if current.completion_rate > best.completion_rate
                    || (current.completion_rate == best.completion_rate
                        && current.current_streak > best.current_streak)
                {
                    current
                } else {
                    best
                }
            })
            .cloned()
    }

    /// Lowest completion rate, ties go to the higher risk
    pub fn weakest_habit(&self, scores: &[HabitScore]) -> Option<HabitScore> {
        scores
            .iter()
            .reduce(|worst, current| {
                if current.completion_rate < worst.completion_rate
                    || (current.completion_rate == worst.completion_rate
                        && current.risk_score > worst.risk_score)
                {
                    current
                } else {
                    worst
                }
            })
            .cloned()
    }

    pub fn recovery_report(&self, habit: &Habit, streak: Option<&Streak>) -> RecoveryReport {
        let total_resets = streak.map_or(0, |s| s.total_resets);
        let recovery_rate = if habit.counters.total_completions > 0 {
            f64::from(total_resets) / f64::from(habit.counters.total_completions) * 100.0
        } else {
            0.0
        };

        RecoveryReport {
            total_resets,
            last_reset_date: streak.and_then(|s| s.last_reset_date),
            last_recovery_date: habit.counters.last_recovery_date,
            recovery_rate,
            has_recovered: habit.counters.last_recovery_date.is_some(),
        }
    }

    /// Full summary for one user, scores rounded to two decimals
    pub fn user_analytics(&self, habits: &[Habit], streaks: &[Streak]) -> UserAnalytics {
        let scores = self.habit_scores(habits, streaks);

        UserAnalytics {
            overall_success_rate: round2(self.overall_success_rate(habits)),
            consistency_score: round2(self.consistency_score(habits, streaks)),
            total_active_habits: scores.len(),
            streak_summary: self.streak_summary(streaks),
            strongest_habit: self.strongest_habit(&scores),
            weakest_habit: self.weakest_habit(&scores),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
