use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::millis;
use crate::error::MistResult;

/// Exponential backoff for transient failures.
///
/// Only errors for which [`MistError::is_transient`](crate::MistError::is_transient)
/// holds are retried; validation failures are returned immediately.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    #[serde(rename = "base_delay_ms", with = "millis")]
    pub base_delay: Duration,
    pub backoff_factor: f64,
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,
    /// Scale each delay by a random factor in `[0.5, 1.0]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(2),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        let factor = if self.jitter {
            rand::thread_rng().gen_range(0.5..=1.0)
        } else {
            1.0
        };
        Duration::from_secs_f64(capped * factor)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> MistResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = MistResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    debug!(attempt, ?delay, error = %err, "retrying after transient failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
