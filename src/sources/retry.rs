use super::{SourceAdapter, SourceError};
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::review::{Query, RawReview};
use std::time::Duration;
use tracing::debug;

const MAX_BACKOFF: Duration = Duration::from_secs(4);

/// Bounded retry for retryable adapter failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
        }
    }

    /// Exponential delay before retry number `retry` (1-based), capped at 4s
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(250))
    }
}

/// Outcome of an adapter call including every retry
#[derive(Debug)]
pub struct FetchAttempt {
    pub result: Result<Vec<RawReview>, SourceError>,
    pub attempts: u32,
}

/// Calls the adapter, retrying RateLimited and Unreachable failures
///
/// AuthInvalid and ParseFailure are returned after the first attempt since
/// repeating the same request cannot fix them.
pub async fn fetch_with_retry(
    adapter: &SourceAdapter,
    query: &Query,
    policy: RetryPolicy,
    progress: &dyn ProgressHandler,
) -> FetchAttempt {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match adapter.fetch(query).await {
            Ok(reviews) => {
                return FetchAttempt {
                    result: Ok(reviews),
                    attempts,
                }
            }
            Err(err) if err.is_retryable() && attempts <= policy.max_retries => {
                let delay = policy.backoff(attempts);
                debug!(
                    source = adapter.id(),
                    attempt = attempts,
                    error = %err,
                    "Retryable source failure"
                );
                progress.on_progress(&ProgressEvent::SourceRetrying {
                    source_id: adapter.id().to_string(),
                    attempt: attempts,
                    delay,
                });
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                return FetchAttempt {
                    result: Err(err),
                    attempts,
                }
            }
        }
    }
}
