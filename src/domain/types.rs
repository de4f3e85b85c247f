/// Core types used throughout the domain layer
///
/// This module defines the identifier types, the recurrence rule that
/// decides which days a habit is expected, and the calendar helpers that
/// turn timestamps into whole-day differences.

use std::fmt;

use serde::{Deserialize, Serialize};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc, Weekday};
use uuid::Uuid;

use crate::domain::DomainError;

/// Unique identifier for a habit
///
/// This is a wrapper around UUID to provide type safety - you can't accidentally
/// pass a habit ID where a user ID is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HabitId(pub Uuid);

impl HabitId {
    /// Generate a new random habit ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a habit ID from a string (useful for database loading)
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for HabitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HabitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of the user owning habits and streaks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The (user, habit) pair that owns exactly one streak record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreakKey {
    pub user_id: UserId,
    pub habit_id: HabitId,
}

impl StreakKey {
    pub fn new(user_id: UserId, habit_id: HabitId) -> Self {
        Self { user_id, habit_id }
    }
}

impl fmt::Display for StreakKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user {}, habit {}", self.user_id, self.habit_id)
    }
}

/// Which calendar days a habit is expected to be performed
///
/// Constructed through [`RecurrenceRule::parse`] at the boundary, which
/// rejects an interval below two days and an empty weekday set. Rows that
/// were persisted before validation existed are decoded with
/// [`RecurrenceRule::from_stored`], which fails open to `Daily`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecurrenceRule {
    /// Every single day
    Daily,
    /// Every N days, N >= 2
    Interval { interval_days: u32 },
    /// Specific days of the week (e.g., Monday, Wednesday, Friday)
    Custom { days: Vec<Weekday> },
}

impl RecurrenceRule {
    /// Smallest interval that is not simply "daily"
    pub const MIN_INTERVAL_DAYS: u32 = 2;
    pub const MAX_INTERVAL_DAYS: u32 = 365;

    /// Strictly parse the three-column shape a habit is created with
    pub fn parse(
        frequency_type: &str,
        interval_days: Option<i64>,
        custom_days: Option<&[String]>,
    ) -> Result<Self, DomainError> {
        match frequency_type.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(RecurrenceRule::Daily),
            "interval" => {
                let days = interval_days.ok_or_else(|| {
                    DomainError::InvalidFrequency("Interval frequency requires interval_days".to_string())
                })?;
                let rule = RecurrenceRule::Interval {
                    interval_days: u32::try_from(days).map_err(|_| {
                        DomainError::InvalidFrequency(format!("Interval must be positive, got {}", days))
                    })?,
                };
                rule.validate()?;
                Ok(rule)
            }
            "custom" => {
                let names = custom_days.unwrap_or_default();
                let mut days = Vec::with_capacity(names.len());
                for name in names {
                    let day = parse_weekday(name).ok_or_else(|| {
                        DomainError::InvalidFrequency(format!("Unknown weekday: {}", name))
                    })?;
                    if !days.contains(&day) {
                        days.push(day);
                    }
                }
                let rule = RecurrenceRule::Custom { days };
                rule.validate()?;
                Ok(rule)
            }
            other => Err(DomainError::InvalidFrequency(format!("Unknown frequency type: {}", other))),
        }
    }

    /// Decode a persisted rule, resolving malformed data to `Daily`
    pub fn from_stored(
        frequency_type: &str,
        interval_days: Option<i64>,
        custom_days: Option<&[String]>,
    ) -> Self {
        match Self::parse(frequency_type, interval_days, custom_days) {
            Ok(rule) => rule,
            Err(e) => {
                tracing::warn!(
                    frequency_type,
                    ?interval_days,
                    "Malformed recurrence rule, treating as daily: {}",
                    e
                );
                RecurrenceRule::Daily
            }
        }
    }

    /// Validate that a rule value is reasonable
    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            RecurrenceRule::Daily => {}
            RecurrenceRule::Interval { interval_days } => {
                if *interval_days < Self::MIN_INTERVAL_DAYS {
                    return Err(DomainError::InvalidFrequency(format!(
                        "Interval must be at least {} days, got {}",
                        Self::MIN_INTERVAL_DAYS, interval_days
                    )));
                }
                if *interval_days > Self::MAX_INTERVAL_DAYS {
                    return Err(DomainError::InvalidFrequency(
                        "Interval cannot be longer than 365 days".to_string()
                    ));
                }
            }
            RecurrenceRule::Custom { days } => {
                if days.is_empty() {
                    return Err(DomainError::InvalidFrequency(
                        "Custom frequency must specify at least one day".to_string()
                    ));
                }
                if days.len() > 7 {
                    return Err(DomainError::InvalidFrequency(
                        "Custom frequency cannot have more than 7 days".to_string()
                    ));
                }
            }
        }
        Ok(())
    }

    /// Storage tag for the `frequency_type` column
    pub fn type_name(&self) -> &'static str {
        match self {
            RecurrenceRule::Daily => "daily",
            RecurrenceRule::Interval { .. } => "interval",
            RecurrenceRule::Custom { .. } => "custom",
        }
    }

    pub fn interval_days(&self) -> Option<u32> {
        match self {
            RecurrenceRule::Interval { interval_days } => Some(*interval_days),
            _ => None,
        }
    }

    /// Lowercase weekday names for the `custom_days` column
    pub fn custom_day_names(&self) -> Option<Vec<String>> {
        match self {
            RecurrenceRule::Custom { days } => {
                Some(days.iter().map(|d| weekday_name(*d).to_string()).collect())
            }
            _ => None,
        }
    }
}

/// Parse a weekday from its full or three-letter English name
pub fn parse_weekday(name: &str) -> Option<Weekday> {
    match name.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Calendar date of a timestamp in the given local offset (midnight normalization)
pub fn local_date(at: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    at.with_timezone(&offset).date_naive()
}

/// Whole days from `from` to `to`, negative if `to` is earlier
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}
