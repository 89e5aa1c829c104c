//! Pipeline dependencies and per-run state

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::analysis::AnalysisService;
use crate::progress::{NoOpHandler, ProgressHandler};
use crate::review::{
    CategorizedReview, Degradation, NormalizedReview, ProductSummary, Query, RawReview,
    SourceStatus,
};
use crate::sources::SourceAdapter;

use super::config::PipelineConfig;

/// Coordinator states; a run ends in `Complete` or `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetching,
    Normalizing,
    Categorizing,
    Synthesizing,
    Complete,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetching => "fetching",
            Stage::Normalizing => "normalizing",
            Stage::Categorizing => "categorizing",
            Stage::Synthesizing => "synthesizing",
            Stage::Complete => "complete",
            Stage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Complete | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context that owns all long-lived pipeline dependencies
pub struct PipelineContext {
    /// Adapters in registration order
    pub sources: Vec<SourceAdapter>,

    /// Absent when no analysis capability is configured
    pub analysis: Option<Arc<AnalysisService>>,

    pub config: PipelineConfig,

    pub progress: Arc<dyn ProgressHandler>,
}

impl PipelineContext {
    pub fn new(
        sources: Vec<SourceAdapter>,
        analysis: Option<Arc<AnalysisService>>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            sources,
            analysis,
            config,
            progress: Arc::new(NoOpHandler),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("sources", &self.sources.iter().map(|s| s.id()).collect::<Vec<_>>())
            .field("analysis", &self.analysis)
            .field("config", &self.config)
            .finish()
    }
}

/// State owned exclusively by one run
#[derive(Debug)]
pub struct RunContext {
    pub run_id: Uuid,
    pub query: Query,
    pub stage: Stage,
    pub started: Instant,
    /// Whole-pipeline deadline
    pub deadline: Instant,
    pub deadline_hit: bool,

    pub statuses: Vec<SourceStatus>,
    pub raw_reviews: Vec<RawReview>,

    /// Valid reviews in first-seen order
    pub normalized: Vec<NormalizedReview>,
    /// Rejected entries with their rejection reason
    pub discarded: Vec<NormalizedReview>,

    pub categorized: Vec<CategorizedReview>,
    pub degradations: Vec<Degradation>,
    pub summary: Option<ProductSummary>,
}

impl RunContext {
    pub fn new(query: Query, config: &PipelineConfig) -> Self {
        let started = Instant::now();
        Self {
            run_id: Uuid::new_v4(),
            query,
            stage: Stage::Fetching,
            started,
            deadline: started + config.pipeline_timeout,
            deadline_hit: false,
            statuses: Vec::new(),
            raw_reviews: Vec::new(),
            normalized: Vec::new(),
            discarded: Vec::new(),
            categorized: Vec::new(),
            degradations: Vec::new(),
            summary: None,
        }
    }

    pub fn past_deadline(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn degrade(&mut self, degradation: Degradation) {
        if !self.degradations.contains(&degradation) {
            self.degradations.push(degradation);
        }
    }
}
