/// Per-job delivery options and backoff policy

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay policy between delivery attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    Fixed { delay_ms: u64 },
    /// `start_delay_ms * 2^(attempt - 1)`
    Exponential { start_delay_ms: u64 },
}

impl Backoff {
    /// Longest delay ever produced, attempts past this point stop doubling
    const MAX_DELAY_MS: u64 = 60 * 60 * 1000;

    pub fn exponential(start: Duration) -> Self {
        Backoff::Exponential {
            start_delay_ms: u64::try_from(start.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Delay before the next delivery, after `attempt` failed deliveries (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ms = match *self {
            Backoff::Fixed { delay_ms } => delay_ms,
            Backoff::Exponential { start_delay_ms } => {
                let shift = attempt.saturating_sub(1).min(32);
                start_delay_ms.saturating_mul(1u64 << shift)
            }
        };
        Duration::from_millis(ms.min(Self::MAX_DELAY_MS))
    }
}

/// Options carried on every enqueued job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOptions {
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Keep exhausted jobs in the failed set instead of deleting them
    pub retain_on_failure: bool,
    pub remove_on_success: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::exponential(Duration::from_secs(2)),
            retain_on_failure: true,
            remove_on_success: true,
        }
    }
}
