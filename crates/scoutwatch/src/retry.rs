//! Bounded retry with exponential backoff and an overall timeout.
//!
//! Used wherever ingestion waits on something outside its control: a
//! removable volume appearing, or the store accepting connections.

use crate::cancel::CancellationToken;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};

/// Retry policy. Durations are milliseconds so the TOML stays flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first (0 is treated as 1).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Backoff growth factor between attempts.
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,

    /// Hard upper bound on the time spent retrying.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

fn default_multiplier() -> u32 {
    2
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, timeout: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: initial_backoff.as_millis() as u64,
            max_backoff_ms: default_max_backoff_ms().max(initial_backoff.as_millis() as u64),
            multiplier: default_multiplier(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// A policy that tries exactly once.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 1,
            timeout_ms: 0,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Backoff to wait after the given (1-based) failed attempt.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let mut backoff = self.initial_backoff_ms;
        for _ in 1..attempt {
            backoff = backoff
                .saturating_mul(u64::from(self.multiplier.max(1)))
                .min(self.max_backoff_ms);
        }
        Duration::from_millis(backoff.min(self.max_backoff_ms.max(self.initial_backoff_ms)))
    }
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub elapsed: Duration,
    /// Error from the final attempt; `None` if cancelled before any attempt.
    pub last_error: Option<E>,
    pub cancelled: bool,
}

/// Run `op` until it succeeds, the attempts run out, the timeout passes, or
/// the token is cancelled.
///
/// Sleeps are clipped to the deadline and no attempt starts after it, so
/// the call returns within `policy.timeout()` plus the duration of a
/// single attempt.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let deadline = start + policy.timeout();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;
    let mut last_error = None;
    let mut cancelled = false;

    loop {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        attempts += 1;
        match op(attempts).await {
            Ok(value) => return Ok(value),
            Err(err) => last_error = Some(err),
        }

        if attempts >= max_attempts {
            break;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        if !cancel.sleep(policy.backoff_after(attempts).min(remaining)).await {
            cancelled = true;
            break;
        }
        if Instant::now() >= deadline {
            break;
        }
    }

    Err(Exhausted {
        attempts,
        elapsed: start.elapsed(),
        last_error,
        cancelled,
    })
}
