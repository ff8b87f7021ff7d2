//! Retry policy for overloaded classification requests.
//!
//! A 429 or 503 response is retried after a delay that starts at
//! `initial_delay` and is multiplied by `multiplier` after every wait, up to
//! `max_attempts` requests in total. No wait follows the final attempt.
//! Waiting goes through the [`Sleeper`] trait so tests can observe the
//! schedule without real time passing.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Backoff schedule for a single classification call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total requests allowed, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(5),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Whether an HTTP status signals overload worth retrying.
    pub fn is_retryable(status: u16) -> bool {
        matches!(status, 429 | 503)
    }

    /// Delay to wait after the given 1-based attempt failed with an overload
    /// status, or `None` if that was the last attempt.
    ///
    /// Delays that overflow saturate at [`Duration::MAX`], so every policy
    /// makes exactly `max_attempts` requests.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        if self.initial_delay.is_zero() {
            return Some(Duration::ZERO);
        }
        let delay = self
            .multiplier
            .checked_pow(attempt - 1)
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX);
        Some(delay)
    }

    /// Every wait a fully overloaded call goes through, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts)
            .filter_map(|attempt| self.delay_after(attempt))
            .collect()
    }
}

/// Something that can pause the current task.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_doubles_from_five_seconds() {
        let schedule = RetryPolicy::default().schedule();
        assert_eq!(
            schedule,
            vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(20),
                Duration::from_secs(40),
            ]
        );
    }

    #[test]
    fn successive_delays_strictly_double() {
        let schedule = RetryPolicy::default().schedule();
        for pair in schedule.windows(2) {
            assert_eq!(pair[1], pair[0] * 2);
        }
    }

    #[test]
    fn no_delay_after_last_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(4), Some(Duration::from_secs(40)));
        assert_eq!(policy.delay_after(5), None);
        assert_eq!(policy.delay_after(6), None);
        assert_eq!(policy.delay_after(0), None);
    }

    #[test]
    fn single_attempt_never_waits() {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        assert!(policy.schedule().is_empty());
    }

    #[test]
    fn custom_multiplier() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_delay: Duration::from_millis(100),
            multiplier: 3,
        };
        assert_eq!(
            policy.schedule(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(300),
                Duration::from_millis(900),
            ]
        );
    }

    #[test]
    fn overflowing_delays_saturate_instead_of_ending_schedule() {
        let policy = RetryPolicy {
            max_attempts: 200,
            initial_delay: Duration::from_secs(1),
            multiplier: 2,
        };
        assert_eq!(policy.delay_after(32), Some(Duration::from_secs(1 << 31)));
        // 2^32 overflows the u32 factor.
        assert_eq!(policy.delay_after(34), Some(Duration::MAX));
        assert_eq!(policy.delay_after(199), Some(Duration::MAX));
        assert_eq!(policy.schedule().len(), 199);
    }

    #[test]
    fn zero_initial_delay_never_saturates() {
        let policy = RetryPolicy {
            max_attempts: 60,
            initial_delay: Duration::ZERO,
            multiplier: 2,
        };
        assert!(policy.schedule().iter().all(|d| d.is_zero()));
    }

    #[test]
    fn retryable_statuses() {
        assert!(RetryPolicy::is_retryable(429));
        assert!(RetryPolicy::is_retryable(503));
        assert!(!RetryPolicy::is_retryable(200));
        assert!(!RetryPolicy::is_retryable(500));
        assert!(!RetryPolicy::is_retryable(400));
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_sleeper_advances_paused_clock() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(5)).await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
