//! Bounded retries with exponential backoff.
//!
//! Used by the delivery uploader: transient channel errors are retried a small,
//! fixed number of times, waiting `base * factor^n` between tries (with up to
//! 25% jitter and a hard cap). A server hint such as Telegram's `retry_after`
//! replaces the computed delay, but the wait never shrinks between tries.

use crate::core::config;
use crate::core::metrics;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Largest share of the computed delay added as jitter.
const JITTER_SHARE: f64 = 0.25;

/// Returned when the operation kept failing, or failed with a non-retryable error.
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempt(s)")]
pub struct GaveUp<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl<E> GaveUp<E> {
    pub fn into_last_error(self) -> E {
        self.last_error
    }
}

/// How many times to try, and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    attempts: u32,
    base_delay: Duration,
    delay_cap: Duration,
    factor: f64,
    jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(2),
            delay_cap: Duration::from_secs(60),
            factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload settings from the environment (`DELIVERY_*`).
    pub fn delivery() -> Self {
        Self {
            attempts: (*config::delivery::MAX_ATTEMPTS).max(1),
            base_delay: config::delivery::base_delay(),
            delay_cap: config::delivery::max_delay(),
            factor: config::delivery::EXPONENTIAL_BACKOFF_BASE,
            jitter: true,
        }
    }

    /// Short waits, for operations a user is actively watching.
    pub fn quick() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
            delay_cap: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// Total tries, the first one included. Zero is treated as one.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Retries on top of the first try.
    #[must_use]
    pub fn max_retries(self, retries: u32) -> Self {
        self.max_attempts(retries.saturating_add(1))
    }

    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.delay_cap = delay;
        self
    }

    #[must_use]
    pub fn backoff_multiplier(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    #[must_use]
    pub fn no_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Computed wait after the `retry`-th failure (0-based), capped at the max delay.
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let exp = i32::try_from(retry).unwrap_or(i32::MAX);
        let mut secs = self.base_delay.as_secs_f64() * self.factor.powi(exp);
        if self.jitter {
            secs *= 1.0 + rand::random::<f64>() * JITTER_SHARE;
        }
        let capped = secs.min(self.delay_cap.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.delay_cap
        }
    }

    fn backoff(&self) -> Backoff<'_> {
        Backoff {
            config: self,
            retries: 0,
            floor: Duration::ZERO,
        }
    }
}

/// Delay schedule for one retry loop. Never yields a shorter wait than the previous one.
struct Backoff<'a> {
    config: &'a RetryConfig,
    retries: u32,
    floor: Duration,
}

impl Backoff<'_> {
    fn next_delay(&mut self, hint: Option<Duration>) -> Duration {
        let computed = hint.unwrap_or_else(|| self.config.delay_for_attempt(self.retries));
        self.retries += 1;
        self.floor = computed.max(self.floor);
        self.floor
    }
}

/// Outcome of [`retry`], with the bookkeeping callers report on.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    pub result: Result<T, GaveUp<E>>,
    /// Tries actually made
    pub attempts: u32,
    pub total_duration: Duration,
    /// Waits between tries, in order
    pub delays: Vec<Duration>,
}

impl<T, E> RetryResult<T, E> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn is_exhausted(&self) -> bool {
        self.result.is_err()
    }
}

/// Errors that know whether another try could help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Server-provided wait, e.g. a rate limit's `retry_after`.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Runs `operation` until it succeeds, fails permanently, or runs out of tries.
///
/// The closure receives the 1-based attempt number.
pub async fn retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Debug,
{
    let started = Instant::now();
    let mut backoff = config.backoff();
    let mut delays = Vec::new();
    let mut attempt = 1;

    let result = loop {
        let err = match operation(attempt).await {
            Ok(value) => break Ok(value),
            Err(err) => err,
        };

        if attempt >= config.attempts || !err.is_retryable() {
            break Err(GaveUp {
                attempts: attempt,
                last_error: err,
            });
        }

        let delay = backoff.next_delay(err.retry_after());
        metrics::TASK_RETRIES_TOTAL
            .with_label_values(&[&attempt.to_string()])
            .inc();
        log::warn!(
            "Attempt {}/{} failed, next try in {:?}: {:?}",
            attempt,
            config.attempts,
            delay,
            err
        );
        delays.push(delay);
        tokio::time::sleep(delay).await;
        attempt += 1;
    };

    RetryResult {
        result,
        attempts: attempt,
        total_duration: started.elapsed(),
        delays,
    }
}
