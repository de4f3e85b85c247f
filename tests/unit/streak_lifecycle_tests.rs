/// Streak transitions and due-date rules exercised through the public API
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc, Weekday};
use streak_engine::*;

#[cfg(test)]
mod streak_lifecycle_tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, hour, 0, 0).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, day).unwrap()
    }

    fn streak(current: u32, longest: u32, last_completion: DateTime<Utc>) -> Streak {
        let mut streak = Streak::start(StreakKey::new(UserId::new(), HabitId::new()), last_completion);
        streak.current_streak = current;
        streak.longest_streak = longest;
        streak.version = 4;
        streak
    }

    #[test]
    fn test_completion_the_next_day_continues_the_streak() {
        let s = streak(5, 7, at(14, 9));
        let (next, outcome) = s.on_completion(at(15, 20), utc());

        assert_eq!(outcome, CompletionOutcome::Continued);
        assert_eq!(next.current_streak, 6);
        assert_eq!(next.longest_streak, 7);
        assert_eq!(next.last_completion_date, at(15, 20));
    }

    #[test]
    fn test_evaluation_after_missed_days_breaks_the_streak() {
        let s = streak(5, 7, at(13, 9));
        let (next, outcome) = s.on_scheduled_evaluation(3, at(16, 0));

        assert_eq!(outcome, EvaluationOutcome::Broken);
        assert_eq!(next.current_streak, 0);
        assert_eq!(next.total_resets, 1);
        assert_eq!(next.longest_streak, 7);
        assert_eq!(next.last_reset_date, Some(at(16, 0)));
    }

    #[test]
    fn test_custom_rule_is_not_due_off_schedule() {
        // 2026-01-12 is a Monday
        let rule = RecurrenceRule::Custom { days: vec![Weekday::Mon] };
        assert!(!is_due_today(&rule, date(12), date(13)));
        assert!(is_due_today(&rule, date(12), date(19)));
    }

    #[test]
    fn test_interval_rule_waits_for_the_full_interval() {
        let rule = RecurrenceRule::Interval { interval_days: 3 };
        assert!(!is_due_today(&rule, date(10), date(12)));
        assert!(is_due_today(&rule, date(10), date(13)));
    }

    #[test]
    fn test_malformed_interval_is_read_as_daily() {
        let rule = RecurrenceRule::from_stored("interval", None, None);
        assert_eq!(rule, RecurrenceRule::Daily);
        assert!(is_due_today(&rule, date(10), date(10)));
        assert!(is_due_today(&rule, date(10), date(11)));

        // Strict parsing still rejects it
        assert!(RecurrenceRule::parse("interval", None, None).is_err());
    }

    #[test]
    fn test_completion_after_a_gap_restarts_before_the_batch_runs() {
        let s = streak(5, 5, at(10, 9));
        let (next, outcome) = s.on_completion(at(13, 9), utc());

        assert_eq!(outcome, CompletionOutcome::Restarted);
        assert_eq!(next.current_streak, 1);
        assert_eq!(next.longest_streak, 5);
        assert_eq!(next.streak_start_date, at(13, 9));
        assert_eq!(next.total_resets, 0);
    }

    #[test]
    fn test_same_day_completion_is_idempotent() {
        let s = streak(3, 3, at(10, 9));
        let (next, outcome) = s.on_completion(at(10, 23), utc());

        assert_eq!(outcome, CompletionOutcome::AlreadyCompleted);
        assert_eq!(next, s);
    }

    #[test]
    fn test_local_day_boundary_follows_the_offset() {
        // 23:30 UTC is already the next day at UTC+1
        let plus_one = FixedOffset::east_opt(3600).unwrap();
        let s = streak(2, 2, at(10, 12));

        assert_eq!(s.days_since_last_completion(at(11, 23) - Duration::minutes(30), utc()), 1);
        assert_eq!(s.days_since_last_completion(at(11, 23) + Duration::minutes(30), plus_one), 2);
    }

    #[test]
    fn test_first_completion_creates_the_record() {
        let key = StreakKey::new(UserId::new(), HabitId::new());
        let (created, outcome) = apply_completion(None, &key, at(5, 8), utc());

        assert_eq!(outcome, CompletionOutcome::Created);
        assert_eq!(created.current_streak, 1);
        assert_eq!(created.longest_streak, 1);
        assert_eq!(created.version, 0);
    }

    #[test]
    fn test_grace_day_never_breaks() {
        assert!(!should_break(5, 1));
        assert!(should_break(5, 2));
        assert!(!should_break(0, 30));
    }
}
