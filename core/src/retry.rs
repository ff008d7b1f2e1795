//! Retry decisions.
//!
//! `should_retry` is the whole policy: keep going until the attempt count is
//! used up. `Backoff` optionally spaces attempts out; the default adds no
//! delay, so a request makes exactly `max_attempts` back-to-back attempts.

use std::time::Duration;

/// True iff another attempt may follow attempt number `attempt` (1-based).
/// `max_attempts` below one counts as one.
pub fn should_retry(attempt: u32, max_attempts: u32) -> bool {
    attempt < max_attempts.max(1)
}

/// Delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    #[default]
    None,
    /// `base * 2^(attempt - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Backoff::Exponential { base, max }
    }

    /// Delay to wait after attempt number `attempt` failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Exponential { base, max } => {
                let shift = attempt.saturating_sub(1).min(31);
                base.checked_mul(1u32 << shift).unwrap_or(max).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(backoff: Backoff) -> Self {
        Self { backoff }
    }

    pub fn should_retry(&self, attempt: u32, max_attempts: u32) -> bool {
        should_retry(attempt, max_attempts)
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}
