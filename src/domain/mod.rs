/// Domain module containing core business logic and data types
///
/// This module defines the core entities (Habit, Streak), the recurrence rule
/// and the pure rules deciding when a habit is due and how a streak moves.
/// Nothing in here touches storage or reads the wall clock.

pub mod habit;
pub mod frequency;
pub mod streak;
pub mod types;

// Re-export public types for easy access
pub use habit::*;
pub use frequency::*;
pub use streak::*;
pub use types::*;

use thiserror::Error;

/// Errors that can occur during domain operations
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Invalid habit title: {0}")]
    InvalidHabitTitle(String),

    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),
}
