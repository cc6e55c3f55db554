//! Bounded retry with per-attempt timeout and exponential backoff.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::domain::RunStage;
use crate::error::{PipelineError, Result};
use crate::obs;

/// Retry budget shared by every stage of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = run once).
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }

    /// Delay before retry `n` (1-based): `base * 2^(n-1)`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(63);
        let ms = self
            .base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// Result of a retried stage plus the number of attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T>,
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// retry budget is spent.
///
/// Each attempt is bounded by `timeout`; an elapsed attempt is reported as
/// `on_timeout()` and goes through the same retryability check. Dropping the
/// attempt future cancels it.
pub async fn retry_stage<T, F, Fut, E>(
    policy: &RetryPolicy,
    stage: RunStage,
    timeout: Duration,
    on_timeout: E,
    mut op: F,
) -> Attempted<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    E: Fn() -> PipelineError,
{
    let mut attempt = 1;
    loop {
        obs::emit_stage_entered(stage, attempt);
        let result = match tokio::time::timeout(timeout, op()).await {
            Ok(result) => result,
            Err(_elapsed) => Err(on_timeout()),
        };

        match result {
            Err(err) if err.is_retryable() && attempt <= policy.max_retries => {
                let delay = policy.delay_for(attempt);
                obs::emit_stage_retry(stage, attempt, delay, &err);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => {
                return Attempted {
                    result,
                    attempts: attempt,
                }
            }
        }
    }
}
