//! Review data model
//!
//! Every record in this module is produced once by a single pipeline stage and
//! never mutated afterwards. Later stages wrap earlier records rather than
//! editing them, so a [`CategorizedReview`] always carries the exact
//! [`NormalizedReview`] (and [`RawReview`]) it was derived from.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Error returned when a query violates its invariant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Query must not be empty")]
    Empty,
}

/// Free-text product description supplied by the caller
///
/// Always trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(String);

impl Query {
    pub fn new(text: impl AsRef<str>) -> Result<Self, QueryError> {
        let trimmed = text.as_ref().trim();
        if trimmed.is_empty() {
            return Err(QueryError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A rating as reported by the source, on the source's own scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawRating {
    pub value: f32,
    pub scale: f32,
}

impl RawRating {
    /// Rating out of five stars
    pub fn stars(value: f32) -> Self {
        Self { value, scale: 5.0 }
    }

    /// Maps the rating onto the canonical 1..=5 scale
    ///
    /// Returns `None` for non-finite values or a non-positive scale.
    pub fn canonical(&self) -> Option<f32> {
        if !self.value.is_finite() || !self.scale.is_finite() || self.scale <= 0.0 {
            return None;
        }
        let five_point = (self.value / self.scale * 5.0).clamp(1.0, 5.0);
        Some((five_point * 10.0).round() / 10.0)
    }
}

/// A review exactly as one adapter produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReview {
    /// Identifier of the adapter that produced the review
    pub source_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<RawRating>,
    /// Body-size or fit hints the reviewer gave about themselves
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Retailer or site display name, e.g. "Google Shopping - Nordstrom"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub helpful_votes: u32,
}

impl RawReview {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
            rating: None,
            author_context: None,
            timestamp: None,
            product_image_url: None,
            purchase_url: None,
            author: None,
            origin: None,
            verified: false,
            helpful_votes: 0,
        }
    }

    pub fn with_rating(mut self, rating: RawRating) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_author_context(mut self, context: impl Into<String>) -> Self {
        self.author_context = Some(context.into());
        self
    }

    pub fn with_timestamp(mut self, date: NaiveDate) -> Self {
        self.timestamp = Some(date);
        self
    }

    pub fn with_product_image_url(mut self, url: impl Into<String>) -> Self {
        self.product_image_url = Some(url.into());
        self
    }

    pub fn with_purchase_url(mut self, url: impl Into<String>) -> Self {
        self.purchase_url = Some(url.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn verified(mut self, verified: bool) -> Self {
        self.verified = verified;
        self
    }

    pub fn with_helpful_votes(mut self, votes: u32) -> Self {
        self.helpful_votes = votes;
        self
    }
}

/// Why the normalizer refused an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Empty,
    TooShort,
    Duplicate,
    Promotional,
    Shouting,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RejectReason::Empty => "empty",
            RejectReason::TooShort => "too short",
            RejectReason::Duplicate => "duplicate",
            RejectReason::Promotional => "promotional",
            RejectReason::Shouting => "shouting",
        };
        f.write_str(label)
    }
}

/// A raw review with canonical rating, fingerprint and validity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedReview {
    pub raw: RawReview,
    /// Rating on the 1..=5 scale, `None` when the source gave none
    pub canonical_rating: Option<f32>,
    pub fingerprint: String,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectReason>,
}

impl NormalizedReview {
    pub fn text(&self) -> &str {
        &self.raw.text
    }

    pub fn source_id(&self) -> &str {
        &self.raw.source_id
    }
}

/// Fixed fashion aspect taxonomy
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AspectTag {
    Fit,
    Style,
    Comfort,
    Material,
    Color,
    Quality,
    Value,
    Other,
}

impl AspectTag {
    /// Every tag, in declaration order
    pub const ALL: [AspectTag; 8] = [
        AspectTag::Fit,
        AspectTag::Style,
        AspectTag::Comfort,
        AspectTag::Material,
        AspectTag::Color,
        AspectTag::Quality,
        AspectTag::Value,
        AspectTag::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectTag::Fit => "fit",
            AspectTag::Style => "style",
            AspectTag::Comfort => "comfort",
            AspectTag::Material => "material",
            AspectTag::Color => "color",
            AspectTag::Quality => "quality",
            AspectTag::Value => "value",
            AspectTag::Other => "other",
        }
    }

    /// Lenient parse used on AI output ("Colour", "value for money", ...)
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        let tag = match label.as_str() {
            "fit" | "sizing" | "size" => AspectTag::Fit,
            "style" | "design" | "look" => AspectTag::Style,
            "comfort" => AspectTag::Comfort,
            "material" | "fabric" => AspectTag::Material,
            "color" | "colour" => AspectTag::Color,
            "quality" | "durability" => AspectTag::Quality,
            "value" | "price" | "value for money" => AspectTag::Value,
            "other" => AspectTag::Other,
            _ => return None,
        };
        Some(tag)
    }
}

impl fmt::Display for AspectTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sentiment of one review towards one aspect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    Mixed,
}

impl Sentiment {
    /// Contribution to an aspect's aggregate score
    pub fn score(&self) -> f32 {
        match self {
            Sentiment::Positive => 1.0,
            Sentiment::Negative => -1.0,
            Sentiment::Neutral | Sentiment::Mixed => 0.0,
        }
    }

    pub fn from_counts(positive: u32, negative: u32) -> Self {
        match (positive, negative) {
            (0, 0) => Sentiment::Neutral,
            (p, n) if p > n => Sentiment::Positive,
            (p, n) if n > p => Sentiment::Negative,
            _ => Sentiment::Mixed,
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "positive" => Some(Sentiment::Positive),
            "negative" => Some(Sentiment::Negative),
            "neutral" => Some(Sentiment::Neutral),
            "mixed" => Some(Sentiment::Mixed),
            _ => None,
        }
    }
}

/// How an aspect tag was assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagOrigin {
    Keyword,
    Analysis,
    /// Keyword tag whose sentiment the analysis step overrode
    KeywordWithAnalysisSentiment,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectMention {
    pub tag: AspectTag,
    pub sentiment: Sentiment,
    pub origin: TagOrigin,
    /// Sentences of the review that mention the aspect
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,
}

/// A valid review with its aspect tags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizedReview {
    pub review: NormalizedReview,
    /// One entry per tag, ordered by tag
    pub aspects: Vec<AspectMention>,
}

impl CategorizedReview {
    pub fn tags(&self) -> BTreeSet<AspectTag> {
        self.aspects.iter().map(|a| a.tag).collect()
    }

    pub fn mention(&self, tag: AspectTag) -> Option<&AspectMention> {
        self.aspects.iter().find(|a| a.tag == tag)
    }
}

/// A quote chosen to represent an aspect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub text: String,
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectSummary {
    pub tag: AspectTag,
    /// Mean of local sentiments, always within -1.0..=1.0
    pub aggregate_sentiment_score: f32,
    pub representative_quotes: Vec<Quote>,
    pub mention_count: usize,
    pub positive_count: usize,
    pub negative_count: usize,
}

/// Failure kinds an adapter may report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFailureKind {
    Unreachable,
    RateLimited,
    AuthInvalid,
    ParseFailure,
}

impl fmt::Display for SourceFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceFailureKind::Unreachable => "unreachable",
            SourceFailureKind::RateLimited => "rate limited",
            SourceFailureKind::AuthInvalid => "invalid credentials",
            SourceFailureKind::ParseFailure => "unparseable response",
        };
        f.write_str(label)
    }
}

/// Outcome of one adapter within one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Succeeded {
        reviews: usize,
        attempts: u32,
    },
    Failed {
        kind: SourceFailureKind,
        message: String,
        attempts: u32,
    },
    TimedOut {
        after_ms: u64,
    },
}

/// One line of the source-status ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStatus {
    pub source_id: String,
    pub kind: String,
    #[serde(flatten)]
    pub outcome: SourceOutcome,
    pub elapsed_ms: u64,
}

impl SourceStatus {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, SourceOutcome::Succeeded { .. })
    }
}

/// Enrichment that is missing from a degraded summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Degradation {
    /// No analysis capability was configured for the run
    AnalysisUnavailable,
    /// The synthesis call failed or returned an unusable payload
    SynthesisFailed { message: String },
    /// The pipeline deadline passed before synthesis could run
    SynthesisSkipped,
    /// Ambiguous reviews kept their keyword-only tags
    CategorizationFallback { reviews: usize },
}

/// Result of one pipeline run, handed read-only to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub run_id: uuid::Uuid,
    pub query: Query,
    pub generated_at: DateTime<Utc>,
    pub total_reviews_considered: usize,
    pub sources_succeeded: Vec<String>,
    pub sources_failed: Vec<String>,
    pub source_statuses: Vec<SourceStatus>,
    /// Ordered by mention count, descending
    pub aspect_summaries: Vec<AspectSummary>,
    pub style_advice: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub overall_summary: String,
    pub best_for_body_types: BTreeSet<String>,
    pub best_for_occasions: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_image_url: Option<String>,
    pub shopping_links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f32>,
    /// Star bucket (1..=5) to review count
    pub rating_distribution: BTreeMap<u8, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positive_percentage: Option<f32>,
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degradations: Vec<Degradation>,
}

impl ProductSummary {
    pub fn aspect(&self, tag: AspectTag) -> Option<&AspectSummary> {
        self.aspect_summaries.iter().find(|s| s.tag == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[test]
    fn test_query_is_trimmed() {
        let query = Query::new("  linen midi dress \n").unwrap();
        assert_eq!(query.as_str(), "linen midi dress");
    }

    #[test]
    fn test_query_rejects_blank() {
        assert_eq!(Query::new("   "), Err(QueryError::Empty));
        assert_eq!(Query::new(""), Err(QueryError::Empty));
    }

    #[parameterized(
        five_star = { 4.0, 5.0, Some(4.0) },
        ten_point = { 7.0, 10.0, Some(3.5) },
        hundred_point = { 100.0, 100.0, Some(5.0) },
        zero_clamps_to_one = { 0.0, 5.0, Some(1.0) },
        over_scale_clamps = { 6.0, 5.0, Some(5.0) },
        zero_scale = { 3.0, 0.0, None },
        nan_value = { f32::NAN, 5.0, None },
    )]
    fn test_canonical_rating(value: f32, scale: f32, expected: Option<f32>) {
        assert_eq!(RawRating { value, scale }.canonical(), expected);
    }

    #[test]
    fn test_sentiment_from_counts() {
        assert_eq!(Sentiment::from_counts(0, 0), Sentiment::Neutral);
        assert_eq!(Sentiment::from_counts(2, 1), Sentiment::Positive);
        assert_eq!(Sentiment::from_counts(0, 3), Sentiment::Negative);
        assert_eq!(Sentiment::from_counts(1, 1), Sentiment::Mixed);
    }

    #[test]
    fn test_aspect_parse_is_lenient() {
        assert_eq!(AspectTag::parse("Colour"), Some(AspectTag::Color));
        assert_eq!(AspectTag::parse(" value for money "), Some(AspectTag::Value));
        assert_eq!(AspectTag::parse("shipping"), None);
    }

    #[test]
    fn test_aspect_serializes_lowercase() {
        let json = serde_json::to_string(&AspectTag::Material).unwrap();
        assert_eq!(json, "\"material\"");
    }
}
