use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Retry on the next poll cycle.
    #[default]
    None,
    /// `base * 2^(attempts - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAt(DateTime<Utc>),
    DeadLetter,
}

/// What happens to a reminder after a failed delivery attempt.
///
/// The default keeps retrying forever with no backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    pub max_attempts: Option<u32>,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// `attempts` counts the attempt that just failed.
    pub fn after_failure(&self, attempts: u32, now: DateTime<Utc>) -> RetryDecision {
        if let Some(max_attempts) = self.max_attempts {
            if attempts >= max_attempts {
                return RetryDecision::DeadLetter;
            }
        }

        RetryDecision::RetryAt(
            now.checked_add_signed(self.delay_after(attempts))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }

    fn delay_after(&self, attempts: u32) -> Duration {
        match self.backoff {
            Backoff::None => Duration::zero(),
            Backoff::Exponential { base, max } => {
                let exponent = attempts.saturating_sub(1).min(30);
                base.checked_mul(1_i32 << exponent)
                    .map(|delay| delay.min(max))
                    .unwrap_or(max)
            }
        }
    }
}
