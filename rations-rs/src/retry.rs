//! Provides a small retry-with-backoff helper.
//!
//! Both the upstream HTTP client and the SQLite backed identity store face transient failures
//! (a 503 from the menu API, a locked database). Instead of hand rolling a sleep loop at each
//! call site, they describe their schedule as a [RetryPolicy] and run the operation through
//! [retry].
use std::future::Future;
use std::time::Duration;

use crate::fmt::format_duration;

/// Determines how the delay grows from one attempt to the next.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Backoff {
    /// Waits `attempt * delay` after each failed attempt.
    Linear,
    /// Waits `2^(attempt - 1) * delay` after each failed attempt.
    Exponential,
}

/// Describes how often and how patiently an operation is retried.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// The total number of attempts (including the first one). Zero is treated as one.
    pub attempts: u32,
    /// The base delay between two attempts.
    pub delay: Duration,
    /// The growth of the delay.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Creates a policy with a linearly growing delay.
    pub fn linear(attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            attempts,
            delay,
            backoff: Backoff::Linear,
        }
    }

    /// Creates a policy with an exponentially growing delay.
    pub fn exponential(attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            attempts,
            delay,
            backoff: Backoff::Exponential,
        }
    }

    /// Returns the delay to wait after the given (1 based) failed attempt.
    ///
    /// # Examples
    /// ```
    /// # use rations::retry::RetryPolicy;
    /// # use std::time::Duration;
    /// let linear = RetryPolicy::linear(3, Duration::from_millis(100));
    /// assert_eq!(linear.delay_after(1), Duration::from_millis(100));
    /// assert_eq!(linear.delay_after(3), Duration::from_millis(300));
    ///
    /// let exponential = RetryPolicy::exponential(4, Duration::from_millis(100));
    /// assert_eq!(exponential.delay_after(1), Duration::from_millis(100));
    /// assert_eq!(exponential.delay_after(3), Duration::from_millis(400));
    /// ```
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self.backoff {
            Backoff::Linear => self.delay.saturating_mul(attempt),
            Backoff::Exponential => self
                .delay
                .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1))),
        }
    }
}

/// Runs the given operation until it succeeds, fails permanently or runs out of attempts.
///
/// After each failure **is_transient** decides whether another attempt is worthwhile. The last
/// error is handed back to the caller once all attempts are used up.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
    is_transient: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) if attempt < attempts && is_transient(&error) => {
                let delay = policy.delay_after(attempt);
                log::debug!(
                    "{} failed (attempt {} of {}): {} - retrying in {}...",
                    label,
                    attempt,
                    attempts,
                    error,
                    format_duration(delay)
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
