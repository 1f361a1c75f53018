//! Retry with capped exponential backoff and jitter.
//!
//! For attempt `n` (1-based) the sleep is `clamp(base * 2^(n-1), base, max)`,
//! multiplied by a uniform factor in `[0.5, 1.0]`, then floored at `base`.
//! The result therefore always lies in `[base, max]`.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Sleep before retry `attempt`, with a random jitter factor.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.5..=1.0);
        self.backoff_with(attempt, jitter)
    }

    /// Sleep before retry `attempt` for an explicit `jitter` in `[0.5, 1.0]`.
    pub fn backoff_with(&self, attempt: u32, jitter: f64) -> Duration {
        let base = self.base.as_secs_f64();
        let max = self.max.as_secs_f64().max(base);
        let exponent = attempt.saturating_sub(1).min(62) as i32;
        let raw = base * 2f64.powi(exponent);
        let capped = raw.min(max).max(base);
        let jittered = capped * jitter.clamp(0.5, 1.0);
        Duration::from_secs_f64(jittered.max(base))
    }

    /// Run `op` until it succeeds, fails fatally, or `timeout` has elapsed
    /// since the first attempt. `reset` runs before every retry so the next
    /// attempt uses a fresh connection.
    pub async fn run<T, Op, Fut, Reset>(
        &self,
        operation: &'static str,
        timeout: Duration,
        mut reset: Reset,
        mut op: Op,
    ) -> Result<T, SyncError>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
        Reset: FnMut(),
    {
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if err.is_fatal() || started.elapsed() > timeout {
                tracing::debug!(operation, attempt, error = %err, "giving up");
                return Err(err);
            }
            let sleep = self.backoff(attempt);
            tracing::debug!(
                operation,
                attempt,
                error = %err,
                sleep_ms = sleep.as_millis() as u64,
                "retrying after transient failure",
            );
            tokio::time::sleep(sleep).await;
            reset();
        }
    }
}
