/// SQLite implementation of the habit storage interface
///
/// This module provides the concrete SQLite implementation for storing
/// and retrieving habits and streaks. It handles all SQL queries and data
/// conversion. A single connection is shared behind a mutex, so every
/// statement (and every transaction) is serialized.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::domain::{
    Habit, HabitCounters, HabitId, RecurrenceRule, Streak, StreakKey, UserId,
};
use crate::storage::{migrations, HabitStorage, StorageError};

const HABIT_COLUMNS: &str = "id, user_id, title, description, frequency_type, interval_days, custom_days,
    created_at, is_active, total_completions, total_missed_days, consecutive_misses,
    last_missed_date, last_recovery_date";

const STREAK_COLUMNS: &str = "user_id, habit_id, current_streak, longest_streak, last_completion_date,
    streak_start_date, total_resets, last_reset_date, version";

/// SQLite-based storage implementation
///
/// This struct holds a connection to the SQLite database and implements
/// the HabitStorage trait and the job queue.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    ///
    /// This opens the database file and runs any necessary migrations
    /// to ensure the schema is up to date.
    pub fn new(db_path: PathBuf) -> Result<Self, StorageError> {
        let conn = Connection::open(&db_path)
            .map_err(|e| StorageError::Connection(format!("Failed to open database: {}", e)))?;

        let storage = Self::from_connection(conn)?;
        tracing::info!("SQLite storage initialized at: {:?}", db_path);
        Ok(storage)
    }

    /// Open a private in-memory database (used by tests and dry runs)
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Connection(format!("Failed to open in-memory database: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute("PRAGMA foreign_keys = ON", [])
            .map_err(|e| StorageError::Connection(format!("Failed to enable foreign keys: {}", e)))?;
        // WAL reports the new mode as a row, so query instead of execute
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
            .map_err(|e| StorageError::Connection(format!("Failed to set journal mode: {}", e)))?;

        migrations::initialize_database(&conn)?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Lock the shared connection
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Connection("Connection mutex poisoned".to_string()))
    }

    fn habit_from_row(row: &Row) -> rusqlite::Result<Habit> {
        let id_str: String = row.get(0)?;
        let id = HabitId::from_string(&id_str).map_err(|_| {
            rusqlite::Error::InvalidColumnType(0, "Invalid UUID".to_string(), rusqlite::types::Type::Text)
        })?;

        let user_str: String = row.get(1)?;
        let user_id = UserId::from_string(&user_str).map_err(|_| {
            rusqlite::Error::InvalidColumnType(1, "Invalid UUID".to_string(), rusqlite::types::Type::Text)
        })?;

        let frequency_type: String = row.get(4)?;
        let interval_days: Option<i64> = row.get(5)?;
        let custom_days_json: Option<String> = row.get(6)?;
        let custom_days: Option<Vec<String>> = custom_days_json
            .and_then(|json| serde_json::from_str(&json).ok());
        let frequency = RecurrenceRule::from_stored(&frequency_type, interval_days, custom_days.as_deref());

        let created_at_str: String = row.get(7)?;

        Ok(Habit {
            id,
            user_id,
            title: row.get(2)?,
            description: row.get(3)?,
            frequency,
            created_at: parse_timestamp(7, &created_at_str)?,
            is_active: row.get(8)?,
            counters: HabitCounters {
                total_completions: row.get(9)?,
                total_missed_days: row.get(10)?,
                consecutive_misses: row.get(11)?,
                last_missed_date: parse_optional_date(12, row.get(12)?)?,
                last_recovery_date: parse_optional_date(13, row.get(13)?)?,
            },
        })
    }

    fn streak_from_row(row: &Row) -> rusqlite::Result<Streak> {
        let user_str: String = row.get(0)?;
        let user_id = UserId::from_string(&user_str).map_err(|_| {
            rusqlite::Error::InvalidColumnType(0, "Invalid UUID".to_string(), rusqlite::types::Type::Text)
        })?;

        let habit_str: String = row.get(1)?;
        let habit_id = HabitId::from_string(&habit_str).map_err(|_| {
            rusqlite::Error::InvalidColumnType(1, "Invalid UUID".to_string(), rusqlite::types::Type::Text)
        })?;

        let last_completion: String = row.get(4)?;
        let streak_start: String = row.get(5)?;
        let last_reset: Option<String> = row.get(7)?;
        let version: i64 = row.get(8)?;

        Ok(Streak {
            key: StreakKey::new(user_id, habit_id),
            current_streak: row.get(2)?,
            longest_streak: row.get(3)?,
            last_completion_date: parse_timestamp(4, &last_completion)?,
            streak_start_date: parse_timestamp(5, &streak_start)?,
            total_resets: row.get(6)?,
            last_reset_date: last_reset.map(|s| parse_timestamp(7, &s)).transpose()?,
            version: version.max(0) as u64,
        })
    }

    fn query_streaks(
        conn: &Connection,
        filter: &str,
        args: &[String],
    ) -> Result<Vec<Streak>, StorageError> {
        let sql = format!("SELECT {} FROM streaks {} ORDER BY id", STREAK_COLUMNS, filter);
        let mut stmt = conn.prepare(&sql)?;
        let streak_iter = stmt.query_map(params_from_iter(args.iter()), Self::streak_from_row)?;

        let mut streaks = Vec::new();
        for streak in streak_iter {
            streaks.push(streak?);
        }
        Ok(streaks)
    }
}

impl HabitStorage for SqliteStorage {
    /// Create a new habit in the database
    fn create_habit(&self, habit: &Habit) -> Result<(), StorageError> {
        let custom_days = habit
            .frequency
            .custom_day_names()
            .map(|days| serde_json::to_string(&days))
            .transpose()?;
        let counters = &habit.counters;

        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO habits ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                HABIT_COLUMNS
            ),
            params![
                habit.id.to_string(),
                habit.user_id.to_string(),
                habit.title,
                habit.description,
                habit.frequency.type_name(),
                habit.frequency.interval_days(),
                custom_days,
                format_timestamp(habit.created_at),
                habit.is_active,
                counters.total_completions,
                counters.total_missed_days,
                counters.consecutive_misses,
                counters.last_missed_date.map(|d| d.to_string()),
                counters.last_recovery_date.map(|d| d.to_string()),
            ],
        )?;

        tracing::debug!("Created habit: {} ({})", habit.title, habit.id);
        Ok(())
    }

    /// Get a habit by its ID
    fn get_habit(&self, habit_id: &HabitId) -> Result<Habit, StorageError> {
        let conn = self.lock()?;
        let habit = conn
            .query_row(
                &format!("SELECT {} FROM habits WHERE id = ?1", HABIT_COLUMNS),
                params![habit_id.to_string()],
                Self::habit_from_row,
            )
            .optional()?;

        habit.ok_or_else(|| StorageError::HabitNotFound {
            habit_id: habit_id.to_string(),
        })
    }

    /// Update an existing habit
    fn update_habit(&self, habit: &Habit) -> Result<(), StorageError> {
        let custom_days = habit
            .frequency
            .custom_day_names()
            .map(|days| serde_json::to_string(&days))
            .transpose()?;

        let conn = self.lock()?;
        let rows_affected = conn.execute(
            "UPDATE habits SET
                title = ?2,
                description = ?3,
                frequency_type = ?4,
                interval_days = ?5,
                custom_days = ?6,
                is_active = ?7
             WHERE id = ?1",
            params![
                habit.id.to_string(),
                habit.title,
                habit.description,
                habit.frequency.type_name(),
                habit.frequency.interval_days(),
                custom_days,
                habit.is_active,
            ],
        )?;

        if rows_affected == 0 {
            return Err(StorageError::HabitNotFound {
                habit_id: habit.id.to_string(),
            });
        }

        tracing::debug!("Updated habit: {} ({})", habit.title, habit.id);
        Ok(())
    }

    /// Soft delete a habit (mark as inactive)
    fn deactivate_habit(&self, habit_id: &HabitId) -> Result<(), StorageError> {
        let conn = self.lock()?;
        let rows_affected = conn.execute(
            "UPDATE habits SET is_active = 0 WHERE id = ?1",
            params![habit_id.to_string()],
        )?;

        if rows_affected == 0 {
            return Err(StorageError::HabitNotFound {
                habit_id: habit_id.to_string(),
            });
        }

        tracing::debug!("Deactivated habit: {}", habit_id);
        Ok(())
    }

    /// List habits with optional filtering
    fn list_habits(&self, user_id: Option<&UserId>, active_only: bool) -> Result<Vec<Habit>, StorageError> {
        let mut sql = format!("SELECT {} FROM habits WHERE 1 = 1", HABIT_COLUMNS);
        let mut args = Vec::new();

        if let Some(user_id) = user_id {
            sql.push_str(" AND user_id = ?1");
            args.push(user_id.to_string());
        }
        if active_only {
            sql.push_str(" AND is_active = 1");
        }
        sql.push_str(" ORDER BY created_at DESC");

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let habit_iter = stmt.query_map(params_from_iter(args.iter()), Self::habit_from_row)?;

        let mut habits = Vec::new();
        for habit in habit_iter {
            habits.push(habit?);
        }

        Ok(habits)
    }

    fn get_streak(&self, key: &StreakKey) -> Result<Option<Streak>, StorageError> {
        let conn = self.lock()?;
        let streak = conn
            .query_row(
                &format!("SELECT {} FROM streaks WHERE user_id = ?1 AND habit_id = ?2", STREAK_COLUMNS),
                params![key.user_id.to_string(), key.habit_id.to_string()],
                Self::streak_from_row,
            )
            .optional()?;
        Ok(streak)
    }

    fn list_streaks(&self, user_id: &UserId) -> Result<Vec<Streak>, StorageError> {
        let conn = self.lock()?;
        Self::query_streaks(&conn, "WHERE user_id = ?1", &[user_id.to_string()])
    }

    fn list_active_streaks(&self) -> Result<Vec<Streak>, StorageError> {
        let conn = self.lock()?;
        Self::query_streaks(&conn, "WHERE current_streak > 0", &[])
    }

    fn save_progress(&self, streak: &Streak, habit: &Habit) -> Result<Streak, StorageError> {
        let now = format_timestamp(Utc::now());
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        if streak.version == 0 {
            let inserted = tx.execute(
                "INSERT INTO streaks (
                    user_id, habit_id, current_streak, longest_streak, last_completion_date,
                    streak_start_date, total_resets, last_reset_date, version, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9)",
                params![
                    streak.key.user_id.to_string(),
                    streak.key.habit_id.to_string(),
                    streak.current_streak,
                    streak.longest_streak,
                    format_timestamp(streak.last_completion_date),
                    format_timestamp(streak.streak_start_date),
                    streak.total_resets,
                    streak.last_reset_date.map(format_timestamp),
                    now,
                ],
            );
            if let Err(e) = inserted {
                if is_unique_violation(&e) {
                    return Err(StorageError::DuplicateStreak { key: streak.key.clone() });
                }
                return Err(e.into());
            }
        } else {
            let rows_affected = tx.execute(
                "UPDATE streaks SET
                    current_streak = ?3,
                    longest_streak = ?4,
                    last_completion_date = ?5,
                    streak_start_date = ?6,
                    total_resets = ?7,
                    last_reset_date = ?8,
                    version = version + 1,
                    updated_at = ?9
                 WHERE user_id = ?1 AND habit_id = ?2 AND version = ?10",
                params![
                    streak.key.user_id.to_string(),
                    streak.key.habit_id.to_string(),
                    streak.current_streak,
                    streak.longest_streak,
                    format_timestamp(streak.last_completion_date),
                    format_timestamp(streak.streak_start_date),
                    streak.total_resets,
                    streak.last_reset_date.map(format_timestamp),
                    now,
                    streak.version as i64,
                ],
            )?;
            if rows_affected == 0 {
                return Err(StorageError::VersionConflict {
                    key: streak.key.clone(),
                    expected: streak.version,
                });
            }
        }

        write_counters(&tx, habit)?;
        tx.commit()?;

        let mut stored = streak.clone();
        stored.version += 1;
        tracing::debug!(
            "Saved streak for {} (current {}, version {})",
            stored.key, stored.current_streak, stored.version
        );
        Ok(stored)
    }
}

fn write_counters(conn: &Connection, habit: &Habit) -> Result<(), StorageError> {
    let counters = &habit.counters;
    let rows_affected = conn.execute(
        "UPDATE habits SET
            total_completions = ?2,
            total_missed_days = ?3,
            consecutive_misses = ?4,
            last_missed_date = ?5,
            last_recovery_date = ?6
         WHERE id = ?1",
        params![
            habit.id.to_string(),
            counters.total_completions,
            counters.total_missed_days,
            counters.consecutive_misses,
            counters.last_missed_date.map(|d| d.to_string()),
            counters.last_recovery_date.map(|d| d.to_string()),
        ],
    )?;

    if rows_affected == 0 {
        return Err(StorageError::HabitNotFound {
            habit_id: habit.id.to_string(),
        });
    }
    Ok(())
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Fixed-width RFC 3339 so timestamps compare correctly as text
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(idx, "Invalid datetime".to_string(), rusqlite::types::Type::Text)
        })
}

fn parse_optional_date(idx: usize, s: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    s.map(|s| {
        NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|_| {
            rusqlite::Error::InvalidColumnType(idx, "Invalid date".to_string(), rusqlite::types::Type::Text)
        })
    })
    .transpose()
}
