/// Decides whether a habit is due on a given day
///
/// Pure: the reference day is always passed in, never read from the clock.

use chrono::{Datelike, NaiveDate};
use crate::domain::{days_between, RecurrenceRule};

/// Check if a habit with `rule`, last completed on `last_completion`, is due on `today`
///
/// Both dates are already normalized to local midnight. Rules that slipped
/// past validation (an interval below two days, an empty weekday set) are
/// treated as daily and logged.
pub fn is_due_today(rule: &RecurrenceRule, last_completion: NaiveDate, today: NaiveDate) -> bool {
    match rule {
        RecurrenceRule::Daily => true,
        RecurrenceRule::Interval { interval_days } => {
            if *interval_days < RecurrenceRule::MIN_INTERVAL_DAYS {
                tracing::warn!(interval_days, "Malformed interval rule, treating as daily");
                return true;
            }
            days_between(last_completion, today) >= i64::from(*interval_days)
        }
        RecurrenceRule::Custom { days } => {
            if days.is_empty() {
                tracing::warn!("Custom rule without weekdays, treating as daily");
                return true;
            }
            days.contains(&today.weekday())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_daily_is_always_due() {
        let today = date(2026, 1, 16);
        for offset in 0..5 {
            let last = today - chrono::Duration::days(offset);
            assert!(is_due_today(&RecurrenceRule::Daily, last, today));
        }
    }

    #[test]
    fn test_interval_due_once_elapsed() {
        let rule = RecurrenceRule::Interval { interval_days: 3 };
        let today = date(2026, 1, 16);

        assert!(!is_due_today(&rule, date(2026, 1, 15), today));
        assert!(!is_due_today(&rule, date(2026, 1, 14), today));
        assert!(is_due_today(&rule, date(2026, 1, 13), today));
        assert!(is_due_today(&rule, date(2026, 1, 1), today));
    }

    #[test]
    fn test_custom_due_on_listed_weekdays() {
        // 2026-01-19 is a Monday
        let rule = RecurrenceRule::Custom { days: vec![Weekday::Mon, Weekday::Wed] };
        let monday = date(2026, 1, 19);

        assert!(is_due_today(&rule, date(2026, 1, 14), monday));
        assert!(!is_due_today(&rule, monday, monday.succ_opt().unwrap()));
        assert!(is_due_today(&rule, monday, date(2026, 1, 21)));
    }

    #[test]
    fn test_malformed_rules_fail_open() {
        let today = date(2026, 1, 16);
        let zero = RecurrenceRule::Interval { interval_days: 0 };
        let empty = RecurrenceRule::Custom { days: vec![] };

        assert!(is_due_today(&zero, today, today));
        assert!(is_due_today(&empty, today, today));
    }

    #[test]
    fn test_is_deterministic() {
        let rule = RecurrenceRule::Interval { interval_days: 4 };
        let last = date(2026, 5, 1);
        let today = date(2026, 5, 4);
        assert_eq!(is_due_today(&rule, last, today), is_due_today(&rule, last, today));
    }
}
