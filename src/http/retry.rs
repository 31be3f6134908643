//! Exponential backoff for transient failures.

use std::fmt::Display;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use rand::Rng;

use crate::config::{DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_RETRIES};

/// Ceiling on the total time spent retrying a single call.
pub const MAX_RETRY_TIME: Duration = Duration::from_secs(30);

/// How often and how long an operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_tries: usize,
    max_time: Duration,
    initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl RetryPolicy {
    /// `max_tries` counts the first attempt; it is raised to at least one.
    pub fn new(max_tries: usize) -> Self {
        Self {
            max_tries: max_tries.max(1),
            max_time: MAX_RETRY_TIME,
            initial_delay: DEFAULT_INITIAL_BACKOFF,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = max_time;
        self
    }

    pub fn max_tries(&self) -> usize {
        self.max_tries
    }

    pub fn max_time(&self) -> Duration {
        self.max_time
    }

    /// Delay after the given failed attempt (1-based): `initial * 2^(attempt - 1)`.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(u32::MAX as usize) as u32;
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor)
    }

    /// Full jitter: a uniform sample from `0..=delay_for(attempt)`.
    pub fn jittered_delay(&self, attempt: usize) -> Duration {
        let ceiling = self.delay_for(attempt).as_nanos().min(u64::MAX as u128) as u64;
        Duration::from_nanos(rand::rng().random_range(0..=ceiling))
    }
}

/// Runs `operation` until it succeeds, fails with an error `is_retryable`
/// rejects, or the policy's attempt or time budget runs out. The last error
/// is returned unchanged.
///
/// Sleeps block the calling thread.
pub fn retry<T, E, F, P>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let start = Instant::now();
    let mut attempt = 1;

    loop {
        let e = match operation() {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !is_retryable(&e) {
            debug!("{}: non-retryable error: {}", operation_name, e);
            return Err(e);
        }

        if attempt >= policy.max_tries {
            warn!(
                "{}: giving up after {} attempts ({})",
                operation_name, attempt, e
            );
            return Err(e);
        }

        let elapsed = start.elapsed();
        if elapsed >= policy.max_time {
            warn!(
                "{}: giving up after {:?} ({})",
                operation_name, elapsed, e
            );
            return Err(e);
        }

        // Never sleep past the time budget
        let delay = policy
            .jittered_delay(attempt)
            .min(policy.max_time - elapsed);
        warn!(
            "{}: attempt {}/{} failed ({}), retrying in {}ms...",
            operation_name,
            attempt,
            policy.max_tries,
            e,
            delay.as_millis()
        );
        thread::sleep(delay);
        attempt += 1;
    }
}
