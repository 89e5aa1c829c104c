use crate::analysis::{truncate_chars, AnalysisError, AnalysisService};
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::context::{PipelineContext, RunContext, Stage};
use crate::pipeline::error::PipelineError;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};
use crate::review::lexicon::{match_aspects, sentiment_counts, split_sentences};
use crate::review::{
    AspectMention, AspectTag, CategorizedReview, Degradation, NormalizedReview, Sentiment,
    TagOrigin,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

pub struct CategorizePhase;

const SYSTEM_PROMPT: &str = r#"You classify fashion product reviews by the aspects they discuss.

Aspects: fit, style, comfort, material, color, quality, value, other
Sentiment per aspect: positive, negative, neutral, mixed

Respond with JSON only, in this shape:
{"reviews": [{"id": 0, "aspects": [{"aspect": "fit", "sentiment": "negative"}]}]}

Include every review id. Use only the listed aspect and sentiment labels."#;
const REVIEW_CHARS_IN_PROMPT: usize = 600;
const MIN_REVIEW_CHARS_IN_PROMPT: usize = 80;
const BATCH_PROMPT_HEADER: &str = "Reviews:\n";

/// Deterministic tags for one review and how sure the matcher is
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordMatch {
    pub mentions: Vec<AspectMention>,
    /// Strongest single-aspect match weight, capped at 1.0
    pub confidence: f32,
}

impl KeywordMatch {
    pub fn is_ambiguous(&self, threshold: f32) -> bool {
        self.mentions.is_empty() || self.confidence < threshold
    }
}

#[derive(Default)]
struct TagAccumulator {
    weight: f32,
    positive: u32,
    negative: u32,
    evidence: Vec<String>,
}

fn rating_bias(sentiment: Sentiment, rating: Option<f32>) -> Sentiment {
    match (sentiment, rating) {
        (Sentiment::Neutral, Some(r)) if r >= 4.0 => Sentiment::Positive,
        (Sentiment::Neutral, Some(r)) if r <= 2.0 => Sentiment::Negative,
        (s, _) => s,
    }
}

/// Sentence-level keyword and phrase matching
///
/// Each sentence contributes its aspect hits and its sentiment indicators to
/// every aspect it mentions. A neutral aspect inherits the direction of a
/// clearly high or low star rating.
pub fn keyword_categorize(review: &NormalizedReview) -> KeywordMatch {
    let mut per_tag: BTreeMap<AspectTag, TagAccumulator> = BTreeMap::new();

    for sentence in split_sentences(review.text()) {
        let hits = match_aspects(sentence);
        if hits.is_empty() {
            continue;
        }
        let (positive, negative) = sentiment_counts(sentence);
        for (tag, weight) in hits {
            let acc = per_tag.entry(tag).or_default();
            acc.weight += weight;
            acc.positive += positive;
            acc.negative += negative;
            acc.evidence.push(sentence.to_string());
        }
    }

    let confidence = per_tag
        .values()
        .map(|acc| acc.weight.min(1.0))
        .fold(0.0f32, f32::max);

    let mentions = per_tag
        .into_iter()
        .map(|(tag, acc)| AspectMention {
            tag,
            sentiment: rating_bias(
                Sentiment::from_counts(acc.positive, acc.negative),
                review.canonical_rating,
            ),
            origin: TagOrigin::Keyword,
            evidence: acc.evidence,
        })
        .collect();

    KeywordMatch {
        mentions,
        confidence,
    }
}

/// Unions keyword and analysis tags; analysis sentiment wins where both exist
pub fn merge_mentions(
    review: &NormalizedReview,
    keyword: Vec<AspectMention>,
    analysis: &[(AspectTag, Sentiment)],
) -> Vec<AspectMention> {
    let mut merged: BTreeMap<AspectTag, AspectMention> =
        keyword.into_iter().map(|m| (m.tag, m)).collect();

    for (tag, sentiment) in analysis {
        match merged.get_mut(tag) {
            Some(existing) => {
                existing.sentiment = *sentiment;
                existing.origin = TagOrigin::KeywordWithAnalysisSentiment;
            }
            None => {
                merged.insert(
                    *tag,
                    AspectMention {
                        tag: *tag,
                        sentiment: *sentiment,
                        origin: TagOrigin::Analysis,
                        evidence: vec![review.text().trim().to_string()],
                    },
                );
            }
        }
    }

    if merged.len() > 1 {
        merged.remove(&AspectTag::Other);
    }
    merged.into_values().collect()
}

/// Tags a review with no resolvable aspect as `Other`
fn other_mention(review: &NormalizedReview) -> AspectMention {
    let (positive, negative) = sentiment_counts(review.text());
    AspectMention {
        tag: AspectTag::Other,
        sentiment: rating_bias(
            Sentiment::from_counts(positive, negative),
            review.canonical_rating,
        ),
        origin: TagOrigin::Fallback,
        evidence: vec![review.text().trim().to_string()],
    }
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    reviews: Vec<BatchItem>,
}

#[derive(Debug, Deserialize)]
struct BatchItem {
    id: usize,
    #[serde(default)]
    aspects: Vec<BatchAspect>,
}

#[derive(Debug, Deserialize)]
struct BatchAspect {
    aspect: String,
    #[serde(default)]
    sentiment: String,
}

/// Numbered review listing, each entry shortened so the batch fits `max_chars`
fn batch_prompt(batch: &[&NormalizedReview], max_chars: usize) -> String {
    let per_review = max_chars
        .saturating_sub(BATCH_PROMPT_HEADER.len())
        .checked_div(batch.len())
        .unwrap_or(max_chars)
        .saturating_sub(8)
        .clamp(MIN_REVIEW_CHARS_IN_PROMPT, REVIEW_CHARS_IN_PROMPT);

    let listing = batch
        .iter()
        .enumerate()
        .map(|(id, review)| {
            let text = truncate_chars(review.text().trim(), per_review).replace('\n', " ");
            format!("[{}] {}", id, text)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("{}{}", BATCH_PROMPT_HEADER, listing)
}

/// Keeps well-formed entries for ids in the batch
///
/// Unknown labels are dropped and only the first entry per aspect is kept for
/// each review.
fn validate_batch(
    response: BatchResponse,
    batch_len: usize,
) -> HashMap<usize, Vec<(AspectTag, Sentiment)>> {
    let mut resolved: HashMap<usize, Vec<(AspectTag, Sentiment)>> = HashMap::new();
    for item in response.reviews {
        if item.id >= batch_len {
            debug!(id = item.id, "Ignoring analysis entry for unknown review id");
            continue;
        }
        let aspects = resolved.entry(item.id).or_default();
        for entry in &item.aspects {
            let (Some(tag), Some(sentiment)) = (
                AspectTag::parse(&entry.aspect),
                Sentiment::parse(&entry.sentiment),
            ) else {
                continue;
            };
            if aspects.iter().all(|(seen, _)| *seen != tag) {
                aspects.push((tag, sentiment));
            }
        }
    }
    resolved.retain(|_, aspects| !aspects.is_empty());
    resolved
}

async fn classify_batch(
    analysis: &AnalysisService,
    batch: &[&NormalizedReview],
    max_prompt_chars: usize,
) -> Result<HashMap<usize, Vec<(AspectTag, Sentiment)>>, AnalysisError> {
    let prompt = batch_prompt(batch, max_prompt_chars);
    let first: Result<BatchResponse, AnalysisError> =
        analysis.analyze("categorize", SYSTEM_PROMPT, &prompt, 1024).await;

    let response = match first {
        Err(err) if err.is_transient() => {
            debug!(error = %err, "Retrying categorization batch once");
            analysis.analyze("categorize", SYSTEM_PROMPT, &prompt, 1024).await?
        }
        other => other?,
    };
    Ok(validate_batch(response, batch.len()))
}

/// Output of the categorizing stage, one entry per input review
#[derive(Debug, Default)]
pub struct CategorizeOutput {
    pub reviews: Vec<CategorizedReview>,
    /// Ambiguous reviews that kept keyword-only tags despite analysis being available
    pub fallback_reviews: usize,
    pub ambiguous: usize,
    pub analysis_calls: usize,
    /// Batches stopped because the run deadline passed
    pub deadline_hit: bool,
}

/// Assigns aspect tags with keyword matching first and batched AI analysis
/// for ambiguous reviews
pub struct Categorizer<'a> {
    config: &'a PipelineConfig,
    analysis: Option<&'a AnalysisService>,
    progress: &'a dyn ProgressHandler,
    deadline: Option<Instant>,
}

impl<'a> Categorizer<'a> {
    pub fn new(config: &'a PipelineConfig, analysis: Option<&'a AnalysisService>) -> Self {
        Self {
            config,
            analysis,
            progress: &NoOpHandler,
            deadline: None,
        }
    }

    /// No analysis batch is started, or kept waiting, past `deadline`
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressHandler) -> Self {
        self.progress = progress;
        self
    }

    pub async fn categorize(&self, reviews: &[NormalizedReview]) -> CategorizeOutput {
        let keyword: Vec<KeywordMatch> = reviews.iter().map(keyword_categorize).collect();
        let ambiguous: Vec<usize> = keyword
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_ambiguous(self.config.ambiguity_threshold))
            .map(|(idx, _)| idx)
            .collect();

        debug!(
            reviews = reviews.len(),
            ambiguous = ambiguous.len(),
            "Keyword categorization complete"
        );

        let mut resolved: HashMap<usize, Vec<(AspectTag, Sentiment)>> = HashMap::new();
        let mut analysis_calls = 0;
        let mut deadline_hit = false;

        if let Some(analysis) = self.analysis {
            let batch_size = self.config.categorize_batch_size.max(1);
            for chunk in ambiguous
                .chunks(batch_size)
                .take(self.config.max_categorize_batches)
            {
                if self.deadline.is_some_and(|d| Instant::now() >= d) {
                    deadline_hit = true;
                    break;
                }

                let batch: Vec<&NormalizedReview> = chunk.iter().map(|&i| &reviews[i]).collect();
                self.progress.on_progress(&ProgressEvent::AnalysisRequested {
                    purpose: "categorize".to_string(),
                    reviews: batch.len(),
                });
                analysis_calls += 1;

                let request = classify_batch(analysis, &batch, self.config.max_prompt_chars);
                let result = match self.deadline {
                    Some(deadline) => match timeout_at(deadline, request).await {
                        Ok(result) => result,
                        Err(_) => {
                            deadline_hit = true;
                            break;
                        }
                    },
                    None => request.await,
                };

                match result {
                    Ok(by_local_id) => {
                        for (local_id, aspects) in by_local_id {
                            resolved.insert(chunk[local_id], aspects);
                        }
                    }
                    Err(err) => {
                        warn!(
                            error = %err,
                            reviews = batch.len(),
                            "Categorization batch failed, keeping keyword tags"
                        );
                    }
                }
            }
            if deadline_hit {
                warn!("Pipeline deadline passed, remaining ambiguous reviews keep keyword tags");
            }
        }

        let fallback_reviews = if self.analysis.is_some() {
            ambiguous.iter().filter(|i| !resolved.contains_key(i)).count()
        } else {
            0
        };

        let categorized = reviews
            .iter()
            .zip(keyword)
            .enumerate()
            .map(|(idx, (review, keyword))| {
                let analysis = resolved.get(&idx).map(Vec::as_slice).unwrap_or(&[]);
                let mut aspects = merge_mentions(review, keyword.mentions, analysis);
                if aspects.is_empty() {
                    aspects.push(other_mention(review));
                }
                CategorizedReview {
                    review: review.clone(),
                    aspects,
                }
            })
            .collect();

        CategorizeOutput {
            reviews: categorized,
            fallback_reviews,
            ambiguous: ambiguous.len(),
            analysis_calls,
            deadline_hit,
        }
    }
}

#[async_trait]
impl WorkflowPhase for CategorizePhase {
    fn stage(&self) -> Stage {
        Stage::Categorizing
    }

    async fn execute(
        &self,
        ctx: &PipelineContext,
        run: &mut RunContext,
    ) -> Result<(), PipelineError> {
        if ctx.analysis.is_none() {
            run.degrade(Degradation::AnalysisUnavailable);
        }

        let analysis = if run.past_deadline() {
            debug!("Pipeline deadline passed, categorizing with keywords only");
            None
        } else {
            ctx.analysis.as_deref()
        };

        let output = Categorizer::new(&ctx.config, analysis)
            .with_progress(ctx.progress.as_ref())
            .with_deadline(run.deadline)
            .categorize(&run.normalized)
            .await;
        if output.deadline_hit {
            run.deadline_hit = true;
        }

        let fallback = if analysis.is_none() && ctx.analysis.is_some() {
            output.ambiguous
        } else {
            output.fallback_reviews
        };
        if fallback > 0 {
            ctx.progress.on_progress(&ProgressEvent::Degraded {
                reason: format!("{} ambiguous reviews kept keyword-only tags", fallback),
            });
            run.degrade(Degradation::CategorizationFallback { reviews: fallback });
        }

        info!(
            reviews = output.reviews.len(),
            analysis_calls = output.analysis_calls,
            fallback,
            "Categorization complete"
        );
        run.categorized = output.reviews;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{BackendError, MockLLMClient, MockResponse};
    use crate::review::RawReview;
    use serde_json::json;
    use std::sync::Arc;

    fn normalized(text: &str, rating: Option<f32>) -> NormalizedReview {
        NormalizedReview {
            raw: RawReview::new("test", text),
            canonical_rating: rating,
            fingerprint: text.to_string(),
            valid: true,
            rejection: None,
        }
    }

    #[test]
    fn test_runs_small_is_fit() {
        let review = normalized("Runs small, true to size would be a medium", None);
        let result = keyword_categorize(&review);

        let fit = result.mentions.iter().find(|m| m.tag == AspectTag::Fit).unwrap();
        assert!(fit.evidence[0].to_lowercase().contains("runs small"));
        assert!(!result.is_ambiguous(0.6));
    }

    #[test]
    fn test_sentiment_per_sentence() {
        let review = normalized(
            "The fabric is itchy and flimsy. But the color is gorgeous and vibrant!",
            None,
        );
        let result = keyword_categorize(&review);

        let material = result
            .mentions
            .iter()
            .find(|m| m.tag == AspectTag::Material)
            .unwrap();
        assert_eq!(material.sentiment, Sentiment::Negative);
        let color = result.mentions.iter().find(|m| m.tag == AspectTag::Color).unwrap();
        assert_eq!(color.sentiment, Sentiment::Positive);
    }

    #[test]
    fn test_rating_bias_only_for_neutral_text() {
        let review = normalized("The waist has a drawstring", Some(5.0));
        let result = keyword_categorize(&review);
        assert_eq!(result.mentions[0].sentiment, Sentiment::Positive);

        let review = normalized("The waist is too tight", Some(5.0));
        let result = keyword_categorize(&review);
        assert_eq!(result.mentions[0].sentiment, Sentiment::Negative);
    }

    #[test]
    fn test_single_keyword_is_ambiguous() {
        let review = normalized("Wore it to brunch with sandals and a hat, the look worked", None);
        let result = keyword_categorize(&review);
        assert!(result.is_ambiguous(0.6));
    }

    #[test]
    fn test_merge_prefers_analysis_sentiment_and_unions_tags() {
        let review = normalized("Arrived quickly, the fit is fine", None);
        let keyword = keyword_categorize(&review).mentions;
        let merged = merge_mentions(
            &review,
            keyword,
            &[
                (AspectTag::Fit, Sentiment::Positive),
                (AspectTag::Value, Sentiment::Negative),
            ],
        );

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].tag, AspectTag::Fit);
        assert_eq!(merged[0].sentiment, Sentiment::Positive);
        assert_eq!(merged[0].origin, TagOrigin::KeywordWithAnalysisSentiment);
        assert_eq!(merged[1].tag, AspectTag::Value);
        assert_eq!(merged[1].origin, TagOrigin::Analysis);
    }

    #[tokio::test]
    async fn test_unmatched_review_is_other_without_analysis() {
        let config = PipelineConfig::default();
        let reviews = vec![normalized("Arrived in two days, packaging was lovely", Some(5.0))];

        let output = Categorizer::new(&config, None).categorize(&reviews).await;

        assert_eq!(output.reviews.len(), 1);
        assert_eq!(output.reviews[0].aspects.len(), 1);
        assert_eq!(output.reviews[0].aspects[0].tag, AspectTag::Other);
        assert_eq!(output.fallback_reviews, 0);
        assert_eq!(output.analysis_calls, 0);
    }

    #[tokio::test]
    async fn test_ambiguous_reviews_are_batched() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::json(json!({
            "reviews": [
                {"id": 0, "aspects": [{"aspect": "style", "sentiment": "positive"}]},
                {"id": 1, "aspects": [
                    {"aspect": "colour", "sentiment": "negative"},
                    {"aspect": "sparkle", "sentiment": "positive"}
                ]},
                {"id": 7, "aspects": [{"aspect": "fit", "sentiment": "positive"}]}
            ]
        })));
        let analysis = AnalysisService::new(mock.clone(), 12_000);
        let config = PipelineConfig::default();
        let reviews = vec![
            normalized("Wore it to a wedding and felt amazing", None),
            normalized("Not what the photos showed at all", None),
            normalized("The fabric is soft cotton and very breathable", None),
        ];

        let output = Categorizer::new(&config, Some(&analysis))
            .categorize(&reviews)
            .await;

        assert_eq!(mock.call_count(), 1);
        assert_eq!(output.analysis_calls, 1);
        assert_eq!(output.reviews[0].aspects[0].tag, AspectTag::Style);
        assert_eq!(output.reviews[0].aspects[0].origin, TagOrigin::Analysis);
        let tags: Vec<_> = output.reviews[1].tags().into_iter().collect();
        assert_eq!(tags, vec![AspectTag::Color]);
        assert!(output.reviews[2].mention(AspectTag::Material).is_some());
        assert_eq!(output.fallback_reviews, 0);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_once_then_fallback() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_responses(vec![
            MockResponse::error(BackendError::RateLimitError { retry_after: None }),
            MockResponse::error(BackendError::NetworkError {
                message: "connection reset".into(),
            }),
        ]);
        let analysis = AnalysisService::new(mock.clone(), 12_000);
        let config = PipelineConfig::default();
        let reviews = vec![normalized("Arrived in two days, packaging was lovely", None)];

        let output = Categorizer::new(&config, Some(&analysis))
            .categorize(&reviews)
            .await;

        assert_eq!(mock.call_count(), 2);
        assert_eq!(output.fallback_reviews, 1);
        assert_eq!(output.reviews[0].aspects[0].tag, AspectTag::Other);
    }

    #[tokio::test]
    async fn test_malformed_response_not_retried() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::text("Sorry, I can't classify these."));
        let analysis = AnalysisService::new(mock.clone(), 12_000);
        let config = PipelineConfig::default();
        let reviews = vec![normalized("Arrived in two days, packaging was lovely", None)];

        let output = Categorizer::new(&config, Some(&analysis))
            .categorize(&reviews)
            .await;

        assert_eq!(mock.call_count(), 1);
        assert_eq!(output.fallback_reviews, 1);
    }

    #[tokio::test]
    async fn test_batch_count_is_bounded() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_responses((0..5).map(|_| MockResponse::json(json!({"reviews": []}))));
        let analysis = AnalysisService::new(mock.clone(), 12_000);
        let config = PipelineConfig::default().with_categorize_batching(2, 2);
        let reviews: Vec<_> = (0..7)
            .map(|i| normalized(&format!("Arrived on day {} of the week in a box", i), None))
            .collect();

        let output = Categorizer::new(&config, Some(&analysis))
            .categorize(&reviews)
            .await;

        assert_eq!(mock.call_count(), 2);
        assert_eq!(output.reviews.len(), 7);
        assert_eq!(output.fallback_reviews, 7);
    }

    #[test]
    fn test_repeated_aspect_keeps_first_entry() {
        let response: BatchResponse = serde_json::from_value(json!({
            "reviews": [
                {"id": 0, "aspects": [
                    {"aspect": "fit", "sentiment": "positive"},
                    {"aspect": "fit", "sentiment": "negative"}
                ]},
                {"id": 0, "aspects": [{"aspect": "fit", "sentiment": "mixed"}]},
                {"id": 1, "aspects": [{"aspect": "sparkle", "sentiment": "positive"}]}
            ]
        }))
        .unwrap();

        let resolved = validate_batch(response, 2);

        assert_eq!(resolved[&0], vec![(AspectTag::Fit, Sentiment::Positive)]);
        assert!(!resolved.contains_key(&1));

        let review = normalized("Arrived in two days, packaging was lovely", None);
        let merged = merge_mentions(&review, vec![], &resolved[&0]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].origin, TagOrigin::Analysis);
        assert_eq!(merged[0].sentiment, Sentiment::Positive);
    }

    #[tokio::test]
    async fn test_long_batch_fits_prompt_budget() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::json(json!({"reviews": []})));
        let analysis = AnalysisService::new(mock.clone(), 2_000);
        let config = PipelineConfig::default()
            .with_categorize_batching(8, 1)
            .with_max_prompt_chars(2_000);
        let reviews: Vec<_> = (0..8)
            .map(|i| normalized(&format!("[{}] {}", i, "Arrived in a box. ".repeat(60)), None))
            .collect();

        Categorizer::new(&config, Some(&analysis))
            .categorize(&reviews)
            .await;

        let request = &mock.requests()[0];
        let listing = request.user_text();
        assert!(listing.chars().count() <= 2_000);
        assert!(listing.contains("[7] "));
        assert!(request.system_text().contains("\"aspects\""));
    }

    #[tokio::test]
    async fn test_no_batches_after_deadline() {
        let mock = Arc::new(MockLLMClient::new());
        let analysis = AnalysisService::new(mock.clone(), 12_000);
        let config = PipelineConfig::default();
        let reviews = vec![normalized("Arrived in two days, packaging was lovely", None)];

        let output = Categorizer::new(&config, Some(&analysis))
            .with_deadline(Instant::now())
            .categorize(&reviews)
            .await;

        assert_eq!(mock.call_count(), 0);
        assert!(output.deadline_hit);
        assert_eq!(output.fallback_reviews, 1);
        assert_eq!(output.reviews[0].aspects[0].tag, AspectTag::Other);
    }
}
