/// Daily trigger firing the batch scheduler at a pinned local time
///
/// A run that fails is logged and not retried: the next day's run re-scans
/// every active streak, and re-evaluation is idempotent.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone, Utc};
use tokio::sync::watch;

use crate::domain::local_date;
use crate::engine::BatchScheduler;

pub struct DailyTrigger {
    scheduler: Arc<BatchScheduler>,
    run_at: NaiveTime,
    offset: FixedOffset,
}

impl DailyTrigger {
    pub fn new(scheduler: Arc<BatchScheduler>, run_at: NaiveTime, offset: FixedOffset) -> Self {
        Self { scheduler, run_at, offset }
    }

    /// Sleep until each fire time and run the batch, until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let now = Utc::now();
            let fire_at = next_fire_after(now, self.run_at, self.offset);
            let wait = (fire_at - now).to_std().unwrap_or_default();
            tracing::info!(%fire_at, "Next streak reset batch scheduled");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    // A dropped sender means nobody can stop us anymore, treat as shutdown
                    if changed.is_err() {
                        return;
                    }
                }
            }
            if *shutdown.borrow() {
                tracing::info!("Daily trigger stopped");
                return;
            }

            if let Err(e) = self.scheduler.run_once(Utc::now()) {
                tracing::error!("Streak reset batch failed, next run supersedes it: {}", e);
            }
        }
    }
}

/// Next instant strictly after `now` at which the local clock reads `run_at`
pub fn next_fire_after(now: DateTime<Utc>, run_at: NaiveTime, offset: FixedOffset) -> DateTime<Utc> {
    let local_today = local_date(now, offset);
    let candidate = offset
        .from_local_datetime(&local_today.and_time(run_at))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now);

    if candidate > now {
        candidate
    } else {
        candidate + Duration::days(1)
    }
}
