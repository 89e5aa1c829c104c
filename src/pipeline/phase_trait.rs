use super::context::{PipelineContext, RunContext, Stage};
use super::error::PipelineError;
use async_trait::async_trait;

/// One stage of the review pipeline
///
/// Phases absorb adapter and analysis failures themselves; the only errors
/// they return are the run-fatal [`PipelineError`] kinds.
#[async_trait]
pub trait WorkflowPhase: Send + Sync {
    fn stage(&self) -> Stage;

    async fn execute(
        &self,
        ctx: &PipelineContext,
        run: &mut RunContext,
    ) -> Result<(), PipelineError>;
}
