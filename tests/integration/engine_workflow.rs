/// End to end workflows: completions, the nightly batch, and the reset job queue
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc, Weekday};
use streak_engine::*;
use tempfile::TempDir;

#[cfg(test)]
mod engine_workflow_tests {
    use super::*;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, hour, 0, 0).unwrap()
    }

    async fn in_memory_engine() -> StreakEngine {
        StreakEngine::new(EngineConfig::default())
            .await
            .expect("Failed to create engine")
    }

    async fn file_engine(dir: &TempDir) -> StreakEngine {
        let config = EngineConfig {
            database_path: Some(dir.path().join("streaks.db")),
            ..EngineConfig::default()
        };
        StreakEngine::new(config).await.expect("Failed to create engine")
    }

    /// Create a habit and complete it once a day for `days` days starting on `first_day`
    fn habit_with_streak(
        engine: &StreakEngine,
        user: &UserId,
        frequency: RecurrenceRule,
        first_day: u32,
        days: u32,
    ) -> Habit {
        let habit = engine
            .create_habit(user.clone(), "Read".to_string(), None, frequency, at(1, 8))
            .expect("Failed to create habit");
        for day in first_day..first_day + days {
            engine
                .complete_habit(user, &habit.id, at(day, 9))
                .expect("Failed to complete habit");
        }
        habit
    }

    fn stored_streak(engine: &StreakEngine, user: &UserId, habit: &Habit) -> Streak {
        engine
            .storage()
            .get_streak(&StreakKey::new(user.clone(), habit.id.clone()))
            .expect("Failed to read streak")
            .expect("Streak should exist")
    }

    #[tokio::test]
    async fn test_missed_days_break_streak_and_completion_restarts_it() {
        let engine = in_memory_engine().await;
        let user = UserId::new();
        let habit = habit_with_streak(&engine, &user, RecurrenceRule::Daily, 1, 5);
        assert_eq!(stored_streak(&engine, &user, &habit).current_streak, 5);

        // Last completion on the 5th, batch at midnight of the 8th
        let report = engine.run_batch(at(8, 0)).expect("Batch failed");
        assert_eq!(report.evaluation_date, NaiveDate::from_ymd_opt(2026, 1, 8));
        assert_eq!(report.due, 1);
        assert_eq!(report.enqueued, 1);

        let processed = engine.process_next(at(8, 0)).await.expect("Processing failed");
        assert!(matches!(
            processed,
            Some(JobReport::Completed { outcome: ProcessOutcome::Broken, .. })
        ));

        let broken = stored_streak(&engine, &user, &habit);
        assert_eq!(broken.current_streak, 0);
        assert_eq!(broken.longest_streak, 5);
        assert_eq!(broken.total_resets, 1);

        let counters = engine.storage().get_habit(&habit.id).expect("Habit missing").counters;
        assert_eq!(counters.total_completions, 5);
        assert_eq!(counters.total_missed_days, 2);
        assert_eq!(counters.consecutive_misses, 1);

        let restarted = engine
            .complete_habit(&user, &habit.id, at(8, 10))
            .expect("Failed to complete habit");
        assert_eq!(restarted.outcome, CompletionOutcome::Restarted);
        assert_eq!(restarted.streak.current_streak, 1);
        assert_eq!(restarted.streak.longest_streak, 5);

        let counters = engine.storage().get_habit(&habit.id).expect("Habit missing").counters;
        assert_eq!(counters.consecutive_misses, 0);
        assert_eq!(counters.last_recovery_date, NaiveDate::from_ymd_opt(2026, 1, 8));
    }

    #[tokio::test]
    async fn test_grace_day_keeps_streak() {
        let engine = in_memory_engine().await;
        let user = UserId::new();
        let habit = habit_with_streak(&engine, &user, RecurrenceRule::Daily, 1, 3);

        // One missed day only
        engine.run_batch(at(4, 0)).expect("Batch failed");
        let summary = engine.drain().await.expect("Drain failed");
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.broken, 0);

        let continued = engine
            .complete_habit(&user, &habit.id, at(4, 7))
            .expect("Failed to complete habit");
        assert_eq!(continued.outcome, CompletionOutcome::Continued);
        assert_eq!(continued.streak.current_streak, 4);
    }

    #[tokio::test]
    async fn test_batch_skips_habits_not_due_today() {
        let engine = in_memory_engine().await;
        let user = UserId::new();

        // 2026-01-12 is a Monday, the batch runs on Tuesday the 13th
        let custom = RecurrenceRule::Custom { days: vec![Weekday::Mon] };
        let weekly = habit_with_streak(&engine, &user, custom, 12, 1);
        // Interval of three days, last completed two days before the batch
        let interval = habit_with_streak(&engine, &user, RecurrenceRule::Interval { interval_days: 3 }, 11, 1);

        let report = engine.run_batch(at(13, 0)).expect("Batch failed");
        assert_eq!(report.scanned, 2);
        assert_eq!(report.not_due, 2);
        assert_eq!(report.enqueued, 0);
        assert_eq!(engine.queue_stats().expect("Stats failed"), QueueStats::default());

        assert_eq!(stored_streak(&engine, &user, &weekly).current_streak, 1);
        assert_eq!(stored_streak(&engine, &user, &interval).current_streak, 1);
    }

    #[tokio::test]
    async fn test_inactive_habits_are_skipped_and_reject_completions() {
        let engine = in_memory_engine().await;
        let user = UserId::new();
        let habit = habit_with_streak(&engine, &user, RecurrenceRule::Daily, 1, 2);
        engine.deactivate_habit(&habit.id).expect("Failed to deactivate");

        let report = engine.run_batch(at(10, 0)).expect("Batch failed");
        assert_eq!(report.inactive, 1);
        assert_eq!(report.enqueued, 0);

        let err = engine.complete_habit(&user, &habit.id, at(10, 9)).unwrap_err();
        assert!(matches!(err, EngineError::HabitInactive(_)));
    }

    #[tokio::test]
    async fn test_completion_after_enqueue_supersedes_the_reset() {
        let engine = in_memory_engine().await;
        let user = UserId::new();
        let habit = habit_with_streak(&engine, &user, RecurrenceRule::Daily, 1, 4);

        engine.run_batch(at(7, 0)).expect("Batch failed");
        engine
            .complete_habit(&user, &habit.id, at(7, 6))
            .expect("Failed to complete habit");

        let processed = engine.process_next(at(7, 7)).await.expect("Processing failed");
        assert!(matches!(
            processed,
            Some(JobReport::Completed { outcome: ProcessOutcome::Superseded, .. })
        ));

        let streak = stored_streak(&engine, &user, &habit);
        assert_eq!(streak.current_streak, 1);
        assert_eq!(streak.total_resets, 0);
        assert_eq!(streak.last_completion_date, at(7, 6));
    }

    #[tokio::test]
    async fn test_duplicate_batch_runs_reset_once() {
        let engine = in_memory_engine().await;
        let user = UserId::new();
        let habit = habit_with_streak(&engine, &user, RecurrenceRule::Daily, 1, 3);

        engine.run_batch(at(9, 0)).expect("Batch failed");
        engine.run_batch(at(9, 0) + Duration::minutes(1)).expect("Batch failed");

        let summary = engine.drain().await.expect("Drain failed");
        assert_eq!(summary.broken, 1);
        assert_eq!(summary.unchanged, 1);

        let streak = stored_streak(&engine, &user, &habit);
        assert_eq!(streak.total_resets, 1);
        let counters = engine.storage().get_habit(&habit.id).expect("Habit missing").counters;
        assert_eq!(counters.consecutive_misses, 1);
    }

    #[tokio::test]
    async fn test_missing_streak_job_is_parked_and_can_be_retried() {
        let engine = in_memory_engine().await;
        let ghost = ResetJob {
            user_id: UserId::new(),
            habit_id: HabitId::new(),
            frequency: RecurrenceRule::Daily,
            current_streak: 4,
            last_completion_date: at(1, 9),
            days_since_last_completion: 4,
            evaluation_date: NaiveDate::from_ymd_opt(2026, 1, 5).expect("valid date"),
        };
        engine
            .storage()
            .enqueue_all(&[ghost], &QueueOptions::default(), at(5, 0))
            .expect("Enqueue failed");

        let processed = engine.process_next(at(5, 0)).await.expect("Processing failed");
        assert!(matches!(processed, Some(JobReport::Parked { .. })));

        let failed = engine.failed_jobs().expect("Failed to list jobs");
        assert_eq!(failed.len(), 1);
        assert!(failed[0].last_error.is_some());

        engine.retry_failed(failed[0].id, at(5, 1)).expect("Retry failed");
        let stats = engine.queue_stats().expect("Stats failed");
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_malformed_stored_rule_is_evaluated_as_daily() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let engine = file_engine(&dir).await;
        let user = UserId::new();
        let habit = habit_with_streak(&engine, &user, RecurrenceRule::Interval { interval_days: 7 }, 1, 1);

        // Simulate a legacy row whose interval was never written
        let conn = rusqlite::Connection::open(dir.path().join("streaks.db")).expect("Failed to open db");
        conn.execute(
            "UPDATE habits SET interval_days = NULL WHERE id = ?1",
            [habit.id.to_string()],
        )
        .expect("Failed to corrupt rule");
        drop(conn);

        let stored = engine.storage().get_habit(&habit.id).expect("Habit missing");
        assert_eq!(stored.frequency, RecurrenceRule::Daily);

        // Three days later a weekly habit would not be due, a daily one is
        let report = engine.run_batch(at(4, 0)).expect("Batch failed");
        assert_eq!(report.enqueued, 1);
    }

    #[tokio::test]
    async fn test_database_persistence() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let user = UserId::new();

        let habit = {
            let engine = file_engine(&dir).await;
            habit_with_streak(&engine, &user, RecurrenceRule::Daily, 1, 2)
        };

        let engine = file_engine(&dir).await;
        let streak = stored_streak(&engine, &user, &habit);
        assert_eq!(streak.current_streak, 2);
        assert_eq!(streak.version, 2);

        let habits = engine
            .storage()
            .list_habits(Some(&user), true)
            .expect("Failed to list habits");
        assert_eq!(habits.len(), 1);
        assert_eq!(habits[0].counters.total_completions, 2);
    }

    #[tokio::test]
    async fn test_user_analytics() {
        let engine = in_memory_engine().await;
        let user = UserId::new();
        habit_with_streak(&engine, &user, RecurrenceRule::Daily, 1, 4);
        engine.run_batch(at(7, 0)).expect("Batch failed");
        engine.drain().await.expect("Drain failed");

        let analytics = engine.user_analytics(&user).expect("Analytics failed");
        assert_eq!(analytics.total_active_habits, 1);
        // 4 completions, 2 missed days
        assert_eq!(analytics.overall_success_rate, 66.67);
        assert_eq!(analytics.streak_summary.all_time_longest_streak, 4);
        assert_eq!(analytics.streak_summary.active_streaks_count, 0);
        assert!(analytics.strongest_habit.is_some());
    }

    #[test]
    fn test_storage_interface() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let storage = SqliteStorage::new(dir.path().join("streaks.db")).expect("Failed to create storage");

        let _: &dyn HabitStorage = &storage;
        let _: &dyn JobQueue = &storage;
    }

    #[test]
    fn test_engine_rejects_zero_workers() {
        let config = EngineConfig {
            workers: 0,
            ..EngineConfig::default()
        };
        let result = tokio_test::block_on(StreakEngine::new(config));
        assert!(matches!(result, Err(EngineError::Config(ConfigError::NoWorkers))));
    }

    #[test]
    fn test_stale_active_jobs_are_requeued_on_startup() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let user = UserId::new();

        {
            let engine = tokio_test::block_on(file_engine(&dir));
            habit_with_streak(&engine, &user, RecurrenceRule::Daily, 1, 2);
            engine.run_batch(at(6, 0)).expect("Batch failed");
            // Claimed but never acknowledged, as if the process died mid-job
            let claimed = engine.storage().claim(at(6, 0)).expect("Claim failed");
            assert!(claimed.is_some());
        }

        let engine = tokio_test::block_on(file_engine(&dir));
        assert_eq!(engine.queue_stats().expect("Stats failed").active, 1);
        assert_eq!(engine.storage().requeue_stale().expect("Requeue failed"), 1);

        let stats = engine.queue_stats().expect("Stats failed");
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.active, 0);
    }

    #[tokio::test]
    async fn test_drain_returns_while_another_process_holds_a_job() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let engine = file_engine(&dir).await;
        let user = UserId::new();
        let habit = habit_with_streak(&engine, &user, RecurrenceRule::Daily, 1, 3);
        engine.run_batch(at(9, 0)).expect("Batch failed");

        // Claimed and never acknowledged, as by a crashed or concurrent server
        let held = engine.storage().claim(at(9, 0)).expect("Claim failed");
        assert!(held.is_some());

        let summary = tokio::time::timeout(std::time::Duration::from_secs(3), engine.drain())
            .await
            .expect("drain should not wait on a job it did not claim")
            .expect("Drain failed");
        assert_eq!(summary, DrainSummary::default());

        // The run-batch path puts the job back before draining
        assert_eq!(engine.requeue_stale().expect("Requeue failed"), 1);
        let summary = engine.drain().await.expect("Drain failed");
        assert_eq!(summary.broken, 1);
        assert_eq!(stored_streak(&engine, &user, &habit).current_streak, 0);
    }

    #[tokio::test]
    async fn test_frequency_change_keeps_counters_from_a_concurrent_completion() {
        let engine = in_memory_engine().await;
        let user = UserId::new();
        let habit = habit_with_streak(&engine, &user, RecurrenceRule::Daily, 1, 1);
        let mut snapshot = engine.storage().get_habit(&habit.id).expect("Habit missing");

        engine
            .complete_habit(&user, &habit.id, at(2, 9))
            .expect("Failed to complete habit");

        snapshot
            .set_frequency(RecurrenceRule::Interval { interval_days: 3 })
            .expect("Valid rule");
        engine.storage().update_habit(&snapshot).expect("Failed to update habit");

        let stored = engine.storage().get_habit(&habit.id).expect("Habit missing");
        assert_eq!(stored.frequency, RecurrenceRule::Interval { interval_days: 3 });
        assert_eq!(stored.counters.total_completions, 2);
        assert_eq!(stored_streak(&engine, &user, &habit).current_streak, 2);
    }

    #[tokio::test]
    async fn test_frequency_change_and_recovery_report() {
        let engine = in_memory_engine().await;
        let user = UserId::new();
        let habit = habit_with_streak(&engine, &user, RecurrenceRule::Daily, 1, 4);

        let invalid = engine.set_habit_frequency(&habit.id, RecurrenceRule::Custom { days: vec![] });
        assert!(matches!(invalid, Err(EngineError::Domain(_))));

        engine
            .set_habit_frequency(&habit.id, RecurrenceRule::Interval { interval_days: 4 })
            .expect("Failed to update frequency");
        let stored = engine.storage().get_habit(&habit.id).expect("Habit missing");
        assert_eq!(stored.frequency, RecurrenceRule::Interval { interval_days: 4 });

        // Four days after the last completion the interval is due and the streak breaks
        engine.run_batch(at(8, 0)).expect("Batch failed");
        engine.drain().await.expect("Drain failed");
        engine
            .complete_habit(&user, &habit.id, at(8, 12))
            .expect("Failed to complete habit");

        let report = engine.recovery_report(&user, &habit.id).expect("Report failed");
        assert_eq!(report.total_resets, 1);
        assert!(report.has_recovered);
        assert_eq!(report.recovery_rate, 20.0);
    }
}
