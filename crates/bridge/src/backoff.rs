//! Bounded exponential backoff for fallible fetches.

#![forbid(unsafe_code)]

use std::future::Future;
use std::time::Duration;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Total attempts including the first one (minimum 1).
    pub attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { attempts: 3, base: Duration::from_millis(100), max: Duration::from_millis(2000) }
    }
}

impl Backoff {
    pub fn new(attempts: u32, base: Duration, max: Duration) -> Self {
        Self { attempts: attempts.max(1), base, max }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self { attempts: 1, base: Duration::ZERO, max: Duration::ZERO }
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped at `max`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Run `op` until it succeeds or attempts are exhausted; returns the last error.
    pub async fn retry<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0u32;
        loop {
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) if attempt + 1 >= attempts => return Err(e),
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    debug!(label = %label, attempt, delay_ms = %delay.as_millis(), error = %e, "backoff: retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
