//! Progress handler trait and events

use crate::pipeline::Stage;
use crate::review::SourceFailureKind;
use std::time::Duration;

/// Events emitted while a review pipeline runs
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Run started
    Started { query: String, sources: usize },

    /// Pipeline moved into a new stage
    StageEntered { stage: Stage },

    /// Stage finished
    StageComplete { stage: Stage, duration: Duration },

    /// Adapter call failed with a retryable error and will be retried
    SourceRetrying {
        source_id: String,
        attempt: u32,
        delay: Duration,
    },

    /// Adapter returned reviews
    SourceCompleted {
        source_id: String,
        reviews: usize,
        attempts: u32,
        elapsed: Duration,
    },

    /// Adapter failed for this run
    SourceFailed {
        source_id: String,
        kind: SourceFailureKind,
        message: String,
        attempts: u32,
    },

    /// Adapter did not answer within its budget
    SourceTimedOut { source_id: String, after: Duration },

    /// AI analysis call issued
    AnalysisRequested { purpose: String, reviews: usize },

    /// Optional enrichment dropped
    Degraded { reason: String },

    /// Run completed with a summary
    Completed {
        reviews: usize,
        degraded: bool,
        total_time: Duration,
    },

    /// Run failed
    Failed { error: String },
}

/// Trait for handling progress events during a run
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}
