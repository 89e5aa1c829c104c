use crate::analysis::{truncate_chars, AnalysisError, AnalysisService};
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::context::{PipelineContext, RunContext, Stage};
use crate::pipeline::error::PipelineError;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::progress::ProgressEvent;
use crate::review::{
    AspectMention, AspectSummary, AspectTag, CategorizedReview, Degradation, ProductSummary,
    Query, Quote, RawReview, Sentiment, SourceStatus,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tokio::time::timeout_at;
use tracing::{debug, info, warn};

pub struct SynthesizePhase;

const SYSTEM_PROMPT: &str = r#"You are a fashion stylist summarizing shopper reviews of a product.

Respond with JSON only, in this shape:
{
  "style_advice": "2-3 sentences of sizing and styling advice",
  "best_for_body_types": ["..."],
  "best_for_occasions": ["..."],
  "overall_summary": "one sentence verdict"
}

Ground body type advice in the reviewer fit context when it is present."#;
const MAX_BEST_FOR_ENTRIES: usize = 6;
const MAX_BEST_FOR_CHARS: usize = 60;
const SAMPLE_QUOTE_CHARS: usize = 200;
const MIN_SAMPLE_QUOTE_CHARS: usize = 60;

/// AI-written enrichment of a summary
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StyleInsights {
    #[serde(default, alias = "styleAdvice")]
    pub style_advice: String,
    #[serde(default, alias = "bestForBodyTypes")]
    pub best_for_body_types: Vec<String>,
    #[serde(default, alias = "bestForOccasions")]
    pub best_for_occasions: Vec<String>,
    #[serde(default, alias = "overallSummary")]
    pub overall_summary: String,
}

impl StyleInsights {
    /// Rejects a payload without style advice and tidies the lists
    pub fn validated(self) -> Result<Self, AnalysisError> {
        let style_advice = self.style_advice.trim().to_string();
        if style_advice.is_empty() {
            return Err(AnalysisError::MalformedResponse(
                "synthesis response has no style advice".to_string(),
            ));
        }

        Ok(Self {
            style_advice,
            best_for_body_types: clean_labels(self.best_for_body_types),
            best_for_occasions: clean_labels(self.best_for_occasions),
            overall_summary: self.overall_summary.trim().to_string(),
        })
    }
}

fn clean_labels(labels: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    labels
        .into_iter()
        .map(|l| truncate_chars(l.trim(), MAX_BEST_FOR_CHARS).to_string())
        .filter(|l| !l.is_empty() && seen.insert(l.to_lowercase()))
        .take(MAX_BEST_FOR_ENTRIES)
        .collect()
}

fn quote_text(mention: &AspectMention, review: &CategorizedReview) -> String {
    if mention.evidence.is_empty() {
        review.review.text().trim().to_string()
    } else {
        mention.evidence.join(". ")
    }
}

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    format!("{}...", truncate_chars(text, max_chars.saturating_sub(3)).trim_end())
}

/// Picks up to `limit` quotes: longest first, then most helpful, then by text
///
/// The ordering is total, so the choice does not depend on review order.
pub fn select_quotes(
    mentions: &[(&CategorizedReview, &AspectMention)],
    limit: usize,
    max_chars: usize,
) -> Vec<Quote> {
    let mut candidates: Vec<(String, &CategorizedReview)> = mentions
        .iter()
        .map(|(review, mention)| (quote_text(mention, review), *review))
        .collect();

    candidates.sort_by(|(a_text, a), (b_text, b)| {
        b_text
            .chars()
            .count()
            .cmp(&a_text.chars().count())
            .then(b.review.raw.helpful_votes.cmp(&a.review.raw.helpful_votes))
            .then(a_text.cmp(b_text))
            .then(a.review.source_id().cmp(b.review.source_id()))
    });

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|(text, _)| seen.insert(text.to_lowercase()))
        .take(limit)
        .map(|(text, review)| Quote {
            text: shorten(&text, max_chars),
            source_id: review.review.source_id().to_string(),
            origin: review.review.raw.origin.clone(),
            rating: review.review.canonical_rating,
            verified: review.review.raw.verified,
        })
        .collect()
}

/// Local per-aspect aggregation, ordered by mention count then tag
pub fn aggregate_aspects(
    reviews: &[CategorizedReview],
    max_quotes: usize,
    max_quote_chars: usize,
) -> Vec<AspectSummary> {
    let mut by_tag: BTreeMap<AspectTag, Vec<(&CategorizedReview, &AspectMention)>> =
        BTreeMap::new();
    for review in reviews {
        for mention in &review.aspects {
            by_tag.entry(mention.tag).or_default().push((review, mention));
        }
    }

    let mut summaries: Vec<AspectSummary> = by_tag
        .into_iter()
        .map(|(tag, mentions)| {
            let total: f32 = mentions.iter().map(|(_, m)| m.sentiment.score()).sum();
            let mean = (total / mentions.len() as f32).clamp(-1.0, 1.0);
            AspectSummary {
                tag,
                aggregate_sentiment_score: (mean * 100.0).round() / 100.0,
                representative_quotes: select_quotes(&mentions, max_quotes, max_quote_chars),
                mention_count: mentions.len(),
                positive_count: mentions
                    .iter()
                    .filter(|(_, m)| m.sentiment == Sentiment::Positive)
                    .count(),
                negative_count: mentions
                    .iter()
                    .filter(|(_, m)| m.sentiment == Sentiment::Negative)
                    .count(),
            }
        })
        .collect();

    summaries.sort_by(|a, b| b.mention_count.cmp(&a.mention_count).then(a.tag.cmp(&b.tag)));
    summaries
}

/// Average canonical rating and the 1..=5 star distribution
pub fn rating_stats(reviews: &[CategorizedReview]) -> (Option<f32>, BTreeMap<u8, usize>) {
    let ratings: Vec<f32> = reviews
        .iter()
        .filter_map(|r| r.review.canonical_rating)
        .collect();

    let mut distribution = BTreeMap::new();
    for rating in &ratings {
        let bucket = rating.round().clamp(1.0, 5.0) as u8;
        *distribution.entry(bucket).or_insert(0) += 1;
    }

    let average = (!ratings.is_empty()).then(|| {
        let mean = ratings.iter().sum::<f32>() / ratings.len() as f32;
        (mean * 10.0).round() / 10.0
    });
    (average, distribution)
}

/// Share of reviews whose aspect sentiments lean positive
pub fn positive_percentage(reviews: &[CategorizedReview]) -> Option<f32> {
    if reviews.is_empty() {
        return None;
    }
    let positive = reviews
        .iter()
        .filter(|r| r.aspects.iter().map(|m| m.sentiment.score()).sum::<f32>() > 0.0)
        .count();
    let pct = positive as f32 / reviews.len() as f32 * 100.0;
    Some((pct * 10.0).round() / 10.0)
}

fn shopping_links(raw: &[RawReview], max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|r| r.purchase_url.as_deref())
        .filter(|url| seen.insert(*url))
        .take(max)
        .map(str::to_string)
        .collect()
}

/// Condensed digest sent to the synthesis call instead of raw reviews
///
/// Quotes are shortened first, then dropped one sample at a time, until the
/// digest fits `max_prompt_chars`.
pub fn synthesis_prompt(
    query: &Query,
    reviews: &[CategorizedReview],
    config: &PipelineConfig,
) -> String {
    let mut samples = config.synthesis_sample_size;
    let mut quote_chars = SAMPLE_QUOTE_CHARS;
    loop {
        let prompt = digest_prompt(query, reviews, samples, quote_chars);
        if prompt.chars().count() <= config.max_prompt_chars || samples == 0 {
            return prompt;
        }
        if quote_chars > MIN_SAMPLE_QUOTE_CHARS {
            quote_chars = (quote_chars / 2).max(MIN_SAMPLE_QUOTE_CHARS);
        } else {
            samples -= 1;
        }
    }
}

fn digest_prompt(
    query: &Query,
    reviews: &[CategorizedReview],
    samples: usize,
    quote_chars: usize,
) -> String {
    let aspects: Vec<_> = aggregate_aspects(reviews, samples, quote_chars)
        .into_iter()
        .map(|s| {
            json!({
                "aspect": s.tag.as_str(),
                "score": s.aggregate_sentiment_score,
                "mentions": s.mention_count,
                "quotes": s.representative_quotes.iter().map(|q| &q.text).collect::<Vec<_>>(),
            })
        })
        .collect();

    let mut seen = HashSet::new();
    let fit_context: Vec<&str> = reviews
        .iter()
        .filter_map(|r| r.review.raw.author_context.as_deref())
        .filter(|c| seen.insert(*c))
        .take(samples)
        .collect();

    let (average_rating, _) = rating_stats(reviews);
    let digest = json!({
        "product": query.as_str(),
        "reviews_considered": reviews.len(),
        "average_rating": average_rating,
        "aspects": aspects,
        "reviewer_fit_context": fit_context,
    });

    format!(
        "Summarize what shoppers say about \"{}\".\n\nReview digest:\n{}",
        query,
        serde_json::to_string_pretty(&digest).unwrap_or_default()
    )
}

async fn request_insights(
    analysis: &AnalysisService,
    prompt: &str,
) -> Result<StyleInsights, AnalysisError> {
    let insights: StyleInsights = analysis
        .analyze("synthesize", SYSTEM_PROMPT, prompt, 800)
        .await?;
    insights.validated()
}

fn split_statuses(statuses: &[SourceStatus]) -> (Vec<String>, Vec<String>) {
    let (ok, failed): (Vec<&SourceStatus>, Vec<&SourceStatus>) =
        statuses.iter().partition(|s| s.succeeded());
    (
        ok.into_iter().map(|s| s.source_id.clone()).collect(),
        failed.into_iter().map(|s| s.source_id.clone()).collect(),
    )
}

/// Assembles the summary from local aggregation plus optional AI insights
pub fn build_summary(
    run: &RunContext,
    config: &PipelineConfig,
    insights: Option<StyleInsights>,
) -> ProductSummary {
    let (sources_succeeded, sources_failed) = split_statuses(&run.statuses);
    let (average_rating, rating_distribution) = rating_stats(&run.categorized);
    let insights = insights.unwrap_or_default();

    ProductSummary {
        run_id: run.run_id,
        query: run.query.clone(),
        generated_at: chrono::Utc::now(),
        total_reviews_considered: run.categorized.len(),
        sources_succeeded,
        sources_failed,
        source_statuses: run.statuses.clone(),
        aspect_summaries: aggregate_aspects(
            &run.categorized,
            config.max_quotes,
            config.max_quote_chars,
        ),
        style_advice: insights.style_advice,
        overall_summary: insights.overall_summary,
        best_for_body_types: insights.best_for_body_types.into_iter().collect::<BTreeSet<_>>(),
        best_for_occasions: insights.best_for_occasions.into_iter().collect::<BTreeSet<_>>(),
        sample_image_url: run
            .raw_reviews
            .iter()
            .find_map(|r| r.product_image_url.clone()),
        shopping_links: shopping_links(&run.raw_reviews, config.max_shopping_links),
        average_rating,
        rating_distribution,
        positive_percentage: positive_percentage(&run.categorized),
        degraded: !run.degradations.is_empty(),
        degradations: run.degradations.clone(),
    }
}

#[async_trait]
impl WorkflowPhase for SynthesizePhase {
    fn stage(&self) -> Stage {
        Stage::Synthesizing
    }

    async fn execute(
        &self,
        ctx: &PipelineContext,
        run: &mut RunContext,
    ) -> Result<(), PipelineError> {
        let insights = match ctx.analysis.as_deref() {
            None => None,
            Some(_) if run.past_deadline() => {
                skip_synthesis(ctx, run);
                None
            }
            Some(analysis) => {
                let prompt = synthesis_prompt(&run.query, &run.categorized, &ctx.config);
                ctx.progress.on_progress(&ProgressEvent::AnalysisRequested {
                    purpose: "synthesize".to_string(),
                    reviews: run.categorized.len(),
                });

                match timeout_at(run.deadline, request_insights(analysis, &prompt)).await {
                    Err(_) => {
                        run.deadline_hit = true;
                        skip_synthesis(ctx, run);
                        None
                    }
                    Ok(Ok(insights)) => {
                        debug!(
                            body_types = insights.best_for_body_types.len(),
                            occasions = insights.best_for_occasions.len(),
                            "Style insights received"
                        );
                        Some(insights)
                    }
                    Ok(Err(err)) => {
                        warn!(error = %err, "Style synthesis failed, returning local aggregation");
                        ctx.progress.on_progress(&ProgressEvent::Degraded {
                            reason: format!("style synthesis failed: {}", err),
                        });
                        run.degrade(Degradation::SynthesisFailed {
                            message: err.to_string(),
                        });
                        None
                    }
                }
            }
        };

        let summary = build_summary(run, &ctx.config, insights);
        info!(
            aspects = summary.aspect_summaries.len(),
            reviews = summary.total_reviews_considered,
            degraded = summary.degraded,
            "Synthesis complete"
        );
        run.summary = Some(summary);
        Ok(())
    }
}

fn skip_synthesis(ctx: &PipelineContext, run: &mut RunContext) {
    warn!("Pipeline deadline passed, skipping style synthesis");
    ctx.progress.on_progress(&ProgressEvent::Degraded {
        reason: "style synthesis skipped after the pipeline deadline".to_string(),
    });
    run.degrade(Degradation::SynthesisSkipped);
}
