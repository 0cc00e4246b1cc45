//! Bounded retry with linear backoff around a single extraction call.

use std::future::Future;
use std::time::Duration;

use crate::error::{classify, ChunkFailure, ExtractError};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// Retry `n` waits `n * backoff_step`.
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_step: DEFAULT_BACKOFF_STEP,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, retry: u32) -> Duration {
        self.backoff_step * retry
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// retry budget is spent. `label` only feeds the logs.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, ChunkFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExtractError>>,
{
    let mut retries = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let kind = classify(&err);
                if !kind.is_retryable() || retries >= policy.max_retries {
                    return Err(ChunkFailure {
                        kind,
                        attempts: retries + 1,
                        source: err,
                    });
                }

                retries += 1;
                let backoff = policy.backoff(retries);
                tracing::warn!(
                    range = label,
                    retry = retries,
                    max_retries = policy.max_retries,
                    ?kind,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "retrying"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
