//! End-to-end pipeline tests over in-memory review sources
//!
//! Every source here is a `FixtureSource`, so the runs are deterministic and
//! need no network. AI behaviour is scripted through `MockLLMClient`.

use async_trait::async_trait;
use fitsense::llm::{BackendError, LLMClient, LLMRequest, LLMResponse, MockLLMClient, MockResponse};
use fitsense::review::{AspectTag, Degradation, RawRating, RawReview, SourceOutcome};
use fitsense::sources::SourceError;
use fitsense::{
    FixtureSource, PipelineConfig, PipelineError, Query, ReviewPipeline, SourceAdapter,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Backend that answers every request with a network error after `delay`
struct SluggishClient {
    delay: Duration,
    calls: AtomicUsize,
}

impl SluggishClient {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LLMClient for SluggishClient {
    async fn chat(&self, _request: LLMRequest) -> Result<LLMResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Err(BackendError::NetworkError {
            message: "connection reset".into(),
        })
    }

    fn name(&self) -> &str {
        "sluggish"
    }
}

fn query() -> Query {
    Query::new("black satin slip skirt").unwrap()
}

fn boutique() -> FixtureSource {
    FixtureSource::new(
        "boutique",
        vec![
            RawReview::new("boutique", "Runs small, true to size would be a medium")
                .with_rating(RawRating::stars(3.0))
                .verified(true),
            RawReview::new(
                "boutique",
                "The satin fabric is soft and drapes beautifully, great quality for the price",
            )
            .with_rating(RawRating::stars(5.0)),
        ],
    )
}

fn department_store() -> FixtureSource {
    FixtureSource::new(
        "department-store",
        vec![
            RawReview::new(
                "department-store",
                "Gorgeous color, the black is deep and rich. Very comfortable to wear all day.",
            )
            .with_rating(RawRating { value: 9.0, scale: 10.0 }),
            RawReview::new(
                "department-store",
                "Cheap material that wrinkles after one wash, not worth the money at all",
            )
            .with_rating(RawRating::stars(1.0)),
        ],
    )
}

fn fast_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_adapter_timeout(Duration::from_secs(2))
        .with_pipeline_timeout(Duration::from_secs(10))
        .with_retry_backoff(Duration::from_millis(1))
}

#[tokio::test]
async fn test_duplicates_across_sources_are_merged() {
    let shared = "Runs small, true to size would be a medium";
    let pipeline = ReviewPipeline::new(
        vec![
            FixtureSource::from_texts("boutique", &[shared]).into(),
            FixtureSource::from_texts(
                "mall",
                &[shared, "Lovely soft linen, perfect for summer days"],
            )
            .into(),
        ],
        None,
        fast_config(),
    );

    let summary = pipeline.run(&query()).await.unwrap();

    assert_eq!(summary.total_reviews_considered, 2);
    assert_eq!(summary.sources_succeeded, vec!["boutique", "mall"]);
}

#[tokio::test]
async fn test_no_usable_reviews_is_an_error() {
    let pipeline = ReviewPipeline::new(
        vec![
            FixtureSource::from_texts("broken", &[])
                .always_failing(SourceError::AuthInvalid("401".into()))
                .into(),
            FixtureSource::from_texts("short", &["ok", "meh"]).into(),
        ],
        None,
        fast_config(),
    );

    let err = pipeline.run(&query()).await.unwrap_err();

    assert_eq!(
        err,
        PipelineError::NoReviewsFound {
            query: "black satin slip skirt".to_string(),
            sources_total: 2,
            sources_failed: 1,
        }
    );
}

#[tokio::test]
async fn test_summary_without_analysis_is_degraded() {
    let pipeline = ReviewPipeline::new(
        vec![boutique().into(), department_store().into()],
        None,
        fast_config(),
    );

    let summary = pipeline.run(&query()).await.unwrap();

    assert!(summary.degraded);
    assert!(summary.style_advice.is_empty());
    assert!(summary.best_for_occasions.is_empty());
    assert_eq!(summary.degradations, vec![Degradation::AnalysisUnavailable]);
    assert_eq!(summary.total_reviews_considered, 4);
}

#[tokio::test]
async fn test_runs_small_review_lands_in_fit() {
    let pipeline = ReviewPipeline::new(vec![boutique().into()], None, fast_config());

    let summary = pipeline.run(&query()).await.unwrap();

    let fit = summary.aspect(AspectTag::Fit).expect("fit aspect");
    assert!(fit
        .representative_quotes
        .iter()
        .any(|q| q.text.contains("Runs small") && q.source_id == "boutique" && q.verified));
}

#[tokio::test]
async fn test_slow_source_does_not_block_the_others() {
    let stuck = FixtureSource::from_texts("stuck", &["This one never makes it in time"])
        .with_delay(Duration::from_secs(30));
    let pipeline = ReviewPipeline::new(
        vec![boutique().into(), stuck.into(), department_store().into()],
        None,
        fast_config().with_adapter_timeout(Duration::from_millis(100)),
    );

    let summary = pipeline.run(&query()).await.unwrap();

    assert_eq!(summary.sources_succeeded, vec!["boutique", "department-store"]);
    assert_eq!(summary.sources_failed, vec!["stuck"]);
    assert!(matches!(
        summary.source_statuses[1].outcome,
        SourceOutcome::TimedOut { .. }
    ));
    assert_eq!(summary.total_reviews_considered, 4);
}

#[tokio::test]
async fn test_pipeline_deadline_without_reviews_times_out() {
    let slow = FixtureSource::from_texts("slow", &["Arrives long after the deadline"])
        .with_delay(Duration::from_secs(30));
    let config = PipelineConfig::default()
        .with_adapter_timeout(Duration::from_secs(20))
        .with_pipeline_timeout(Duration::from_millis(100));
    let pipeline = ReviewPipeline::new(vec![slow.into()], None, config);

    let err = pipeline.run(&query()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Timeout { .. }));
}

#[tokio::test]
async fn test_deadline_after_partial_fetch_still_summarizes() {
    let slow = FixtureSource::from_texts("slow", &["Arrives long after the deadline"])
        .with_delay(Duration::from_secs(5));
    let client = Arc::new(MockLLMClient::new());
    let config = PipelineConfig::default()
        .with_adapter_timeout(Duration::from_secs(2))
        .with_pipeline_timeout(Duration::from_millis(200));
    let pipeline = ReviewPipeline::new(
        vec![boutique().into(), slow.into()],
        Some(client.clone() as Arc<dyn LLMClient>),
        config,
    );

    let start = Instant::now();
    let summary = pipeline.run(&query()).await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(summary.degraded);
    assert!(summary.degradations.contains(&Degradation::SynthesisSkipped));
    assert_eq!(summary.sources_succeeded, vec!["boutique"]);
    assert!(matches!(
        summary.source_statuses[1].outcome,
        SourceOutcome::TimedOut { .. }
    ));
    assert_eq!(summary.total_reviews_considered, 2);
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn test_slow_analysis_cannot_outlive_deadline() {
    let client = Arc::new(SluggishClient::new(Duration::from_millis(400)));
    let config = fast_config()
        .with_adapter_timeout(Duration::from_millis(200))
        .with_pipeline_timeout(Duration::from_millis(300))
        .with_ambiguity_threshold(1.1);
    let pipeline = ReviewPipeline::new(
        vec![boutique().into(), department_store().into()],
        Some(client.clone() as Arc<dyn LLMClient>),
        config,
    );

    let start = Instant::now();
    let summary = pipeline.run(&query()).await.unwrap();

    assert!(
        start.elapsed() < Duration::from_millis(900),
        "run took {:?}",
        start.elapsed()
    );
    assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    assert!(summary
        .degradations
        .contains(&Degradation::CategorizationFallback { reviews: 4 }));
    assert!(summary.degradations.contains(&Degradation::SynthesisSkipped));
    assert_eq!(summary.total_reviews_considered, 4);
}

#[tokio::test]
async fn test_rate_limited_source_is_retried() {
    let flaky = FixtureSource::from_texts("flaky", &["Runs small, true to size would be a medium"])
        .with_failures([SourceError::RateLimited("429".into())]);
    let pipeline = ReviewPipeline::new(vec![flaky.clone().into()], None, fast_config());

    let summary = pipeline.run(&query()).await.unwrap();

    assert_eq!(flaky.attempts(), 2);
    assert!(matches!(
        summary.source_statuses[0].outcome,
        SourceOutcome::Succeeded { attempts: 2, .. }
    ));
}

#[tokio::test]
async fn test_source_order_does_not_change_aspects() {
    let forward = ReviewPipeline::new(
        vec![boutique().into(), department_store().into()],
        None,
        fast_config(),
    )
    .run(&query())
    .await
    .unwrap();

    let reversed = ReviewPipeline::new(
        vec![department_store().into(), boutique().into()],
        None,
        fast_config(),
    )
    .run(&query())
    .await
    .unwrap();

    assert_eq!(forward.aspect_summaries, reversed.aspect_summaries);
    assert_eq!(forward.average_rating, reversed.average_rating);
    assert_eq!(forward.rating_distribution, reversed.rating_distribution);
}

#[tokio::test]
async fn test_aspect_scores_stay_in_range() {
    let summary = ReviewPipeline::new(
        vec![boutique().into(), department_store().into()],
        None,
        fast_config(),
    )
    .run(&query())
    .await
    .unwrap();

    assert!(!summary.aspect_summaries.is_empty());
    for aspect in &summary.aspect_summaries {
        assert!((-1.0..=1.0).contains(&aspect.aggregate_sentiment_score));
        assert!(aspect.mention_count >= aspect.positive_count + aspect.negative_count);
        assert!(aspect.representative_quotes.len() <= 3);
    }
    let counts: Vec<usize> = summary
        .aspect_summaries
        .iter()
        .map(|a| a.mention_count)
        .collect();
    let mut sorted = counts.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(counts, sorted);
}

#[tokio::test]
async fn test_analysis_enriches_summary() {
    let client = Arc::new(MockLLMClient::new());
    client.add_response(MockResponse::json(json!({
        "style_advice": "Size up and pair with a fitted knit for evenings out.",
        "best_for_body_types": ["Petite", "petite", "Hourglass"],
        "best_for_occasions": ["Date night", "Cocktail party"],
        "overall_summary": "Loved for the satin, but sizing runs small."
    })));

    let pipeline = ReviewPipeline::new(
        vec![boutique().into(), department_store().into()],
        Some(client.clone() as Arc<dyn LLMClient>),
        fast_config().with_ambiguity_threshold(0.0),
    );

    let summary = pipeline.run(&query()).await.unwrap();

    assert_eq!(client.call_count(), 1);
    assert!(!summary.degraded);
    assert!(summary.degradations.is_empty());
    assert!(summary.style_advice.starts_with("Size up"));
    assert_eq!(summary.best_for_body_types.len(), 2);
    assert!(summary.best_for_occasions.contains("Date night"));
}

#[tokio::test]
async fn test_failed_synthesis_still_returns_summary() {
    let client = Arc::new(MockLLMClient::new());
    client.add_response(MockResponse::text("I'm sorry, I can't help with that."));

    let pipeline = ReviewPipeline::new(
        vec![boutique().into()],
        Some(client.clone() as Arc<dyn LLMClient>),
        fast_config().with_ambiguity_threshold(0.0),
    );

    let summary = pipeline.run(&query()).await.unwrap();

    assert!(summary.degraded);
    assert!(summary.style_advice.is_empty());
    assert!(matches!(
        summary.degradations.as_slice(),
        [Degradation::SynthesisFailed { .. }]
    ));
    assert!(summary.aspect(AspectTag::Fit).is_some());
}

#[tokio::test]
async fn test_fixture_adapter_behaves_like_any_source() {
    let adapter: SourceAdapter = boutique().into();
    let reviews = adapter.fetch(&query()).await.unwrap();

    assert_eq!(adapter.id(), "boutique");
    assert_eq!(reviews.len(), 2);
    assert!(reviews.iter().all(|r| r.source_id == "boutique"));
}
