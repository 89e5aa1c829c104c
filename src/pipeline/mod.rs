pub mod config;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod phase_trait;
pub mod phases;

pub use config::PipelineConfig;
pub use context::{PipelineContext, RunContext, Stage};
pub use error::PipelineError;
pub use orchestrator::{analysis_client, ReviewPipeline};
pub use phase_trait::WorkflowPhase;
