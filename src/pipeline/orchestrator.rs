use super::config::PipelineConfig;
use super::context::{PipelineContext, RunContext, Stage};
use super::error::PipelineError;
use super::phase_trait::WorkflowPhase;
use super::phases::{
    categorize::CategorizePhase, fetch::FetchPhase, normalize::NormalizePhase,
    synthesize::SynthesizePhase,
};
use crate::analysis::AnalysisService;
use crate::config::{AnalysisSettings, Capabilities, PERPLEXITY_BASE_URL, PERPLEXITY_KEY_ENV};
use crate::llm::{GenAIClient, LLMClient};
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::review::{ProductSummary, Query};
use crate::sources::{
    AnswerEngineAdapter, ShoppingSearchAdapter, SiteScrapeAdapter, SourceAdapter,
};
use anyhow::{Context, Result};
use genai::adapter::AdapterKind;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

const USER_AGENT: &str = concat!("fitsense/", env!("CARGO_PKG_VERSION"));
const ANSWER_ENGINE_MODEL: &str = "sonar";

/// Coordinates one review aggregation run per query
///
/// Adapters are fetched concurrently; normalizing, categorizing and
/// synthesizing then run in sequence over the merged reviews. Only
/// [`PipelineError`] ends a run without a summary.
pub struct ReviewPipeline {
    context: PipelineContext,
}

impl ReviewPipeline {
    pub fn new(
        sources: Vec<SourceAdapter>,
        analysis: Option<Arc<dyn LLMClient>>,
        config: PipelineConfig,
    ) -> Self {
        let analysis = analysis
            .map(|client| Arc::new(AnalysisService::new(client, config.max_prompt_chars)));
        Self {
            context: PipelineContext::new(sources, analysis, config),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.context = self.context.with_progress(progress);
        self
    }

    /// Builds live adapters and the analysis client from the capability map
    ///
    /// Adapters are registered in a fixed order: shopping search, site
    /// scrape, answer engine.
    pub async fn from_capabilities(
        capabilities: &Capabilities,
        config: PipelineConfig,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.adapter_timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        let mut sources = Vec::new();
        if let Some(key) = &capabilities.shopping_search {
            sources.push(SourceAdapter::ShoppingSearch(ShoppingSearchAdapter::new(
                http.clone(),
                key.expose(),
            )));
        }
        if let Some(key) = &capabilities.site_scrape {
            sources.push(SourceAdapter::SiteScrape(SiteScrapeAdapter::new(
                http.clone(),
                key.expose(),
            )));
        }
        if capabilities.answer_engine.is_some() {
            let client = GenAIClient::new(
                AdapterKind::OpenAI,
                ANSWER_ENGINE_MODEL.to_string(),
                config.adapter_timeout,
                Some(PERPLEXITY_BASE_URL.to_string()),
                Some(PERPLEXITY_KEY_ENV.to_string()),
            )
            .await
            .context("Failed to create answer engine client")?;
            sources.push(SourceAdapter::AnswerEngine(AnswerEngineAdapter::new(
                Arc::new(client),
            )));
        }

        let analysis = match &capabilities.analysis {
            Some(settings) => Some(analysis_client(settings).await?),
            None => None,
        };

        debug!(
            sources = sources.len(),
            analysis = analysis.is_some(),
            "Pipeline built from capabilities"
        );
        Ok(Self::new(sources, analysis, config))
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub async fn run(&self, query: &Query) -> Result<ProductSummary, PipelineError> {
        let start = Instant::now();
        let progress = self.context.progress.as_ref();
        let mut run = RunContext::new(query.clone(), &self.context.config);

        info!(
            run_id = %run.run_id,
            sources = self.context.sources.len(),
            "Starting review pipeline for: {}",
            query
        );
        progress.on_progress(&ProgressEvent::Started {
            query: query.to_string(),
            sources: self.context.sources.len(),
        });

        let workflow_phases: Vec<Box<dyn WorkflowPhase>> = vec![
            Box::new(FetchPhase),
            Box::new(NormalizePhase),
            Box::new(CategorizePhase),
            Box::new(SynthesizePhase),
        ];

        for phase in workflow_phases {
            let stage = phase.stage();
            run.stage = stage;
            info!("Phase: {}", stage);
            progress.on_progress(&ProgressEvent::StageEntered { stage });

            let phase_start = Instant::now();
            if let Err(err) = phase.execute(&self.context, &mut run).await {
                run.stage = Stage::Failed;
                error!(run_id = %run.run_id, stage = %stage, "Pipeline failed: {}", err);
                progress.on_progress(&ProgressEvent::Failed {
                    error: err.to_string(),
                });
                return Err(err);
            }

            progress.on_progress(&ProgressEvent::StageComplete {
                stage,
                duration: phase_start.elapsed(),
            });
            debug!("Phase {} complete", stage);
        }

        run.stage = Stage::Complete;
        let summary = run
            .summary
            .take()
            .ok_or_else(|| PipelineError::NoReviewsFound {
                query: query.to_string(),
                sources_total: run.statuses.len(),
                sources_failed: run.statuses.iter().filter(|s| !s.succeeded()).count(),
            })?;

        info!(
            reviews = summary.total_reviews_considered,
            degraded = summary.degraded,
            "Pipeline complete in {:.2}s",
            start.elapsed().as_secs_f64()
        );
        progress.on_progress(&ProgressEvent::Completed {
            reviews: summary.total_reviews_considered,
            degraded: summary.degraded,
            total_time: start.elapsed(),
        });

        Ok(summary)
    }
}

/// Creates the categorization and synthesis backend
pub async fn analysis_client(settings: &AnalysisSettings) -> Result<Arc<dyn LLMClient>> {
    let client = GenAIClient::new(
        settings.provider,
        settings.model.clone(),
        settings.timeout,
        settings.endpoint.clone(),
        Some(settings.api_key_env.clone()),
    )
    .await
    .context("Failed to create analysis client")?;
    Ok(Arc::new(client) as Arc<dyn LLMClient>)
}

impl std::fmt::Debug for ReviewPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewPipeline")
            .field("context", &self.context)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLLMClient;
    use crate::sources::FixtureSource;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        stages: Mutex<Vec<Stage>>,
        failed: Mutex<Option<String>>,
    }

    impl ProgressHandler for RecordingHandler {
        fn on_progress(&self, event: &ProgressEvent) {
            match event {
                ProgressEvent::StageEntered { stage } => {
                    self.stages.lock().unwrap().push(*stage);
                }
                ProgressEvent::Failed { error } => {
                    *self.failed.lock().unwrap() = Some(error.clone());
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_pipeline_creation() {
        let pipeline = ReviewPipeline::new(
            vec![FixtureSource::from_texts("boutique", &[]).into()],
            Some(Arc::new(MockLLMClient::new()) as Arc<dyn LLMClient>),
            PipelineConfig::default(),
        );
        assert_eq!(pipeline.context().sources.len(), 1);
        assert!(pipeline.context().analysis.is_some());
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let handler = Arc::new(RecordingHandler::default());
        let pipeline = ReviewPipeline::new(
            vec![FixtureSource::from_texts(
                "boutique",
                &["The waist runs small but the linen is lovely and soft"],
            )
            .into()],
            None,
            PipelineConfig::default(),
        )
        .with_progress(handler.clone());

        let summary = pipeline
            .run(&Query::new("linen trousers").unwrap())
            .await
            .unwrap();

        assert_eq!(summary.total_reviews_considered, 1);
        assert_eq!(
            *handler.stages.lock().unwrap(),
            vec![
                Stage::Fetching,
                Stage::Normalizing,
                Stage::Categorizing,
                Stage::Synthesizing
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let handler = Arc::new(RecordingHandler::default());
        let pipeline = ReviewPipeline::new(
            vec![FixtureSource::from_texts("empty", &[]).into()],
            None,
            PipelineConfig::default(),
        )
        .with_progress(handler.clone());

        let err = pipeline
            .run(&Query::new("linen trousers").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NoReviewsFound { .. }));
        assert!(handler.failed.lock().unwrap().is_some());
    }
}
