/// Storage layer for persisting habits and streaks
///
/// This module handles all database operations using SQLite. It provides
/// the point reads, compare-and-set writes, and the active-streak scan the
/// engine needs. The durable job queue lives in the same database, see
/// `crate::queue::sqlite`.

pub mod sqlite;
pub mod migrations;

// Re-export the main storage types
pub use sqlite::*;

use thiserror::Error;
use crate::domain::{Habit, HabitId, Streak, StreakKey, UserId};

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database query error: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Habit not found: {habit_id}")]
    HabitNotFound { habit_id: String },

    #[error("Streak not found for {key}")]
    StreakNotFound { key: StreakKey },

    #[error("Duplicate streak: {key} already has a streak record")]
    DuplicateStreak { key: StreakKey },

    #[error("Streak for {key} changed concurrently (expected version {expected})")]
    VersionConflict { key: StreakKey, expected: u64 },

    #[error("Migration error: {0}")]
    Migration(String),
}

impl StorageError {
    /// Whether the operation lost a race and may succeed on a fresh read
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::VersionConflict { .. } | StorageError::DuplicateStreak { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::HabitNotFound { .. } | StorageError::StreakNotFound { .. })
    }

    /// Whether a stored row exists but can never be decoded
    ///
    /// Retrying cannot fix these, unlike connection or locking failures.
    pub fn is_unreadable_row(&self) -> bool {
        matches!(
            self,
            StorageError::Serialization(_)
                | StorageError::Query(
                    rusqlite::Error::InvalidColumnType(..)
                        | rusqlite::Error::FromSqlConversionFailure(..)
                        | rusqlite::Error::IntegralValueOutOfRange(..)
                )
        )
    }
}

/// Trait defining the storage interface for habits and streaks
///
/// Streak writes go through [`HabitStorage::save_progress`] only, which is
/// the single serialization point for a (user, habit) key.
pub trait HabitStorage: Send + Sync {
    /// Create a new habit
    fn create_habit(&self, habit: &Habit) -> Result<(), StorageError>;

    /// Get a habit by ID
    fn get_habit(&self, habit_id: &HabitId) -> Result<Habit, StorageError>;

    /// Update an existing habit's definition
    ///
    /// Counters are left alone, they are written by `save_progress` only.
    fn update_habit(&self, habit: &Habit) -> Result<(), StorageError>;

    /// Soft delete a habit (mark as inactive)
    fn deactivate_habit(&self, habit_id: &HabitId) -> Result<(), StorageError>;

    /// List habits, optionally for one user
    fn list_habits(&self, user_id: Option<&UserId>, active_only: bool) -> Result<Vec<Habit>, StorageError>;

    /// Point read of one streak record
    fn get_streak(&self, key: &StreakKey) -> Result<Option<Streak>, StorageError>;

    /// All streak records of a user
    fn list_streaks(&self, user_id: &UserId) -> Result<Vec<Streak>, StorageError>;

    /// Every streak with `current_streak > 0`
    fn list_active_streaks(&self) -> Result<Vec<Streak>, StorageError>;

    /// Atomically write a streak and its habit's counters
    ///
    /// A streak with version 0 is inserted and rejected with
    /// `DuplicateStreak` if the key already exists. Otherwise the update only
    /// applies if the stored version still matches, else `VersionConflict`.
    /// Returns the streak as stored, with its new version.
    fn save_progress(&self, streak: &Streak, habit: &Habit) -> Result<Streak, StorageError>;
}
