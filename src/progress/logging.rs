//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { query, sources } => {
                info!(query = %query, sources, "Starting review aggregation");
            }
            ProgressEvent::StageEntered { stage } => {
                info!(stage = %stage, "Entering stage");
            }
            ProgressEvent::StageComplete { stage, duration } => {
                debug!(
                    stage = %stage,
                    duration_ms = duration.as_millis(),
                    "Stage complete"
                );
            }
            ProgressEvent::SourceRetrying {
                source_id,
                attempt,
                delay,
            } => {
                debug!(
                    source = %source_id,
                    attempt,
                    delay_ms = delay.as_millis(),
                    "Retrying source"
                );
            }
            ProgressEvent::SourceCompleted {
                source_id,
                reviews,
                attempts,
                elapsed,
            } => {
                info!(
                    source = %source_id,
                    reviews,
                    attempts,
                    elapsed_ms = elapsed.as_millis(),
                    "Source returned reviews"
                );
            }
            ProgressEvent::SourceFailed {
                source_id,
                kind,
                message,
                attempts,
            } => {
                warn!(
                    source = %source_id,
                    kind = %kind,
                    attempts,
                    error = %message,
                    "Source failed"
                );
            }
            ProgressEvent::SourceTimedOut { source_id, after } => {
                warn!(
                    source = %source_id,
                    after_ms = after.as_millis(),
                    "Source timed out"
                );
            }
            ProgressEvent::AnalysisRequested { purpose, reviews } => {
                debug!(purpose = %purpose, reviews, "Requesting AI analysis");
            }
            ProgressEvent::Degraded { reason } => {
                warn!(reason = %reason, "Continuing with degraded result");
            }
            ProgressEvent::Completed {
                reviews,
                degraded,
                total_time,
            } => {
                info!(
                    reviews,
                    degraded,
                    total_time_ms = total_time.as_millis(),
                    "Summary complete"
                );
            }
            ProgressEvent::Failed { error } => {
                warn!(error = %error, "Run failed");
            }
        }
    }
}
