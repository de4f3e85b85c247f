/// Habit entity and its lifetime counters
///
/// This module defines the Habit struct that represents something a user
/// wants to do on a recurring schedule, along with the counters that the
/// completion path and the nightly break path keep up to date.

use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveDate, Utc};
use crate::domain::{DomainError, HabitId, RecurrenceRule, UserId};

/// Lifetime counters carried on a habit
///
/// These are only ever mutated together with the owning streak record, so a
/// redelivered reset job cannot count the same miss twice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitCounters {
    pub total_completions: u32,
    pub total_missed_days: u32,
    pub consecutive_misses: u32,
    pub last_missed_date: Option<NaiveDate>,
    /// Set the first time the habit is completed after one or more misses
    pub last_recovery_date: Option<NaiveDate>,
}

/// A habit owned by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    /// Unique identifier for this habit
    pub id: HabitId,
    /// Owning user
    pub user_id: UserId,
    /// Display title (e.g., "Morning Run", "Read for 30min")
    pub title: String,
    /// Optional detailed description
    pub description: Option<String>,
    /// Which days this habit is expected
    pub frequency: RecurrenceRule,
    /// When this habit was created
    pub created_at: DateTime<Utc>,
    /// Soft-deactivation flag, habits are never purged while streaks reference them
    pub is_active: bool,
    pub counters: HabitCounters,
}

impl Habit {
    /// Create a new habit with validation
    pub fn new(
        user_id: UserId,
        title: String,
        description: Option<String>,
        frequency: RecurrenceRule,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        Self::validate_title(&title)?;
        Self::validate_description(&description)?;
        frequency.validate()?;

        Ok(Self {
            id: HabitId::new(),
            user_id,
            title: title.trim().to_string(),
            description,
            frequency,
            created_at,
            is_active: true,
            counters: HabitCounters::default(),
        })
    }

    /// Replace the recurrence rule, validating the new one first
    pub fn set_frequency(&mut self, frequency: RecurrenceRule) -> Result<(), DomainError> {
        frequency.validate()?;
        self.frequency = frequency;
        Ok(())
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    /// Count a completion made on `today`
    ///
    /// A completion after one or more misses marks the habit as recovered.
    pub fn record_completion(&mut self, today: NaiveDate) {
        let counters = &mut self.counters;
        counters.total_completions = counters.total_completions.saturating_add(1);
        if counters.consecutive_misses > 0 {
            counters.last_recovery_date = Some(today);
        }
        counters.consecutive_misses = 0;
    }

    /// Count `missed_days` missed occurrences detected on `today`
    pub fn record_miss(&mut self, today: NaiveDate, missed_days: u32) {
        let counters = &mut self.counters;
        counters.total_missed_days = counters.total_missed_days.saturating_add(missed_days.max(1));
        counters.consecutive_misses = counters.consecutive_misses.saturating_add(1);
        counters.last_missed_date = Some(today);
    }

    /// Validate habit title according to business rules
    fn validate_title(title: &str) -> Result<(), DomainError> {
        let trimmed = title.trim();

        if trimmed.is_empty() {
            return Err(DomainError::InvalidHabitTitle(
                "Habit title cannot be empty".to_string()
            ));
        }

        if trimmed.chars().count() > 100 {
            return Err(DomainError::InvalidHabitTitle(
                "Habit title cannot be longer than 100 characters".to_string()
            ));
        }

        Ok(())
    }

    fn validate_description(description: &Option<String>) -> Result<(), DomainError> {
        if let Some(desc) = description {
            if desc.len() > 500 {
                return Err(DomainError::Validation {
                    message: "Description cannot be longer than 500 characters".to_string()
                });
            }
        }
        Ok(())
    }
}
