use crate::pipeline::context::{PipelineContext, RunContext, Stage};
use crate::pipeline::error::PipelineError;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::review::{Query, RawReview, SourceOutcome, SourceStatus};
use crate::sources::text::extract_fit_context;
use crate::sources::{fetch_with_retry, FetchAttempt, RetryPolicy, SourceAdapter};
use async_trait::async_trait;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::time::Duration;
use tokio::time::{error::Elapsed, Instant};
use tracing::{debug, info, warn};

pub struct FetchPhase;

/// Result of one adapter for one run
#[derive(Debug)]
pub struct SourceRun {
    pub status: SourceStatus,
    pub reviews: Vec<RawReview>,
}

/// Collected output of the fetching stage, in adapter registration order
#[derive(Debug, Default)]
pub struct FetchResult {
    pub runs: Vec<SourceRun>,
    pub deadline_hit: bool,
}

#[async_trait]
impl WorkflowPhase for FetchPhase {
    fn stage(&self) -> Stage {
        Stage::Fetching
    }

    async fn execute(
        &self,
        ctx: &PipelineContext,
        run: &mut RunContext,
    ) -> Result<(), PipelineError> {
        let result = fetch_all(
            &ctx.sources,
            &run.query,
            ctx.config.adapter_timeout,
            ctx.config.retry_policy(),
            run.deadline,
            ctx.progress.as_ref(),
        )
        .await;

        run.deadline_hit = result.deadline_hit;
        for source_run in result.runs {
            run.statuses.push(source_run.status);
            run.raw_reviews.extend(source_run.reviews);
        }

        let succeeded = run.statuses.iter().filter(|s| s.succeeded()).count();
        info!(
            succeeded,
            failed = run.statuses.len() - succeeded,
            raw_reviews = run.raw_reviews.len(),
            "Fetching complete"
        );

        if run.deadline_hit && run.raw_reviews.is_empty() {
            return Err(PipelineError::Timeout {
                after: run.started.elapsed(),
            });
        }
        Ok(())
    }
}

/// Runs every adapter concurrently under its own timeout and the run deadline
///
/// Adapters still running when the deadline passes are recorded as timed
/// out. Results are slotted by registration index, so the merged review
/// order never depends on which adapter answered first.
pub async fn fetch_all(
    sources: &[SourceAdapter],
    query: &Query,
    adapter_timeout: Duration,
    policy: RetryPolicy,
    deadline: Instant,
    progress: &dyn ProgressHandler,
) -> FetchResult {
    let start = Instant::now();

    let mut pending: FuturesUnordered<_> = sources
        .iter()
        .enumerate()
        .map(|(idx, adapter)| async move {
            let attempt_start = Instant::now();
            let outcome = tokio::time::timeout(
                adapter_timeout,
                fetch_with_retry(adapter, query, policy, progress),
            )
            .await;
            (idx, attempt_start.elapsed(), outcome)
        })
        .collect();

    let mut slots: Vec<Option<SourceRun>> = sources.iter().map(|_| None).collect();
    let mut deadline_hit = false;

    let deadline_sleep = tokio::time::sleep_until(deadline);
    tokio::pin!(deadline_sleep);

    loop {
        tokio::select! {
            next = pending.next() => match next {
                Some((idx, elapsed, outcome)) => {
                    slots[idx] = Some(resolve(&sources[idx], elapsed, outcome, progress));
                }
                None => break,
            },
            _ = &mut deadline_sleep => {
                warn!("Pipeline deadline reached while fetching");
                deadline_hit = true;
                break;
            }
        }
    }
    drop(pending);

    let waited = start.elapsed();
    let runs = slots
        .into_iter()
        .zip(sources)
        .map(|(slot, adapter)| {
            slot.unwrap_or_else(|| {
                progress.on_progress(&ProgressEvent::SourceTimedOut {
                    source_id: adapter.id().to_string(),
                    after: waited,
                });
                timed_out(adapter, waited)
            })
        })
        .collect();

    FetchResult { runs, deadline_hit }
}

fn resolve(
    adapter: &SourceAdapter,
    elapsed: Duration,
    outcome: Result<FetchAttempt, Elapsed>,
    progress: &dyn ProgressHandler,
) -> SourceRun {
    let source_id = adapter.id().to_string();
    let elapsed_ms = elapsed.as_millis() as u64;

    match outcome {
        Ok(FetchAttempt {
            result: Ok(reviews),
            attempts,
        }) => {
            let reviews: Vec<RawReview> = reviews
                .into_iter()
                .map(|review| stamp(review, &source_id))
                .collect();
            progress.on_progress(&ProgressEvent::SourceCompleted {
                source_id: source_id.clone(),
                reviews: reviews.len(),
                attempts,
                elapsed,
            });
            SourceRun {
                status: SourceStatus {
                    source_id,
                    kind: adapter.kind().to_string(),
                    outcome: SourceOutcome::Succeeded {
                        reviews: reviews.len(),
                        attempts,
                    },
                    elapsed_ms,
                },
                reviews,
            }
        }
        Ok(FetchAttempt {
            result: Err(err),
            attempts,
        }) => {
            progress.on_progress(&ProgressEvent::SourceFailed {
                source_id: source_id.clone(),
                kind: err.kind(),
                message: err.to_string(),
                attempts,
            });
            SourceRun {
                status: SourceStatus {
                    source_id,
                    kind: adapter.kind().to_string(),
                    outcome: SourceOutcome::Failed {
                        kind: err.kind(),
                        message: err.message().to_string(),
                        attempts,
                    },
                    elapsed_ms,
                },
                reviews: Vec::new(),
            }
        }
        Err(_) => {
            progress.on_progress(&ProgressEvent::SourceTimedOut {
                source_id,
                after: elapsed,
            });
            timed_out(adapter, elapsed)
        }
    }
}

fn timed_out(adapter: &SourceAdapter, after: Duration) -> SourceRun {
    SourceRun {
        status: SourceStatus {
            source_id: adapter.id().to_string(),
            kind: adapter.kind().to_string(),
            outcome: SourceOutcome::TimedOut {
                after_ms: after.as_millis() as u64,
            },
            elapsed_ms: after.as_millis() as u64,
        },
        reviews: Vec::new(),
    }
}

/// Attributes the review to the adapter and fills in self-described fit context
fn stamp(mut review: RawReview, source_id: &str) -> RawReview {
    if review.source_id != source_id {
        debug!(
            claimed = %review.source_id,
            source = %source_id,
            "Re-attributing review to its adapter"
        );
        review.source_id = source_id.to_string();
    }
    if review.author_context.is_none() {
        review.author_context = extract_fit_context(&review.text);
    }
    review
}
