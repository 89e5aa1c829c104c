use std::time::Duration;
use thiserror::Error;

/// Run-fatal failures; everything else degrades the summary instead
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("No usable reviews found for '{query}' ({sources_failed} of {sources_total} sources failed)")]
    NoReviewsFound {
        query: String,
        sources_total: usize,
        sources_failed: usize,
    },

    #[error("Pipeline timed out after {}s before any reviews were collected", .after.as_secs())]
    Timeout { after: Duration },
}
