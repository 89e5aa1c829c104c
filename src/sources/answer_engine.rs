//! Review search through an answer engine (Perplexity `sonar`)
//!
//! The engine is asked to list reviews in a fixed `Rating:/Source:/Review:`
//! layout, which is then parsed back into raw reviews.

use super::text::{parse_rating_text, parse_review_date};
use super::SourceError;
use crate::llm::{BackendError, ChatMessage, LLMClient, LLMRequest};
use crate::review::{Query, RawReview};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

const SYSTEM_PROMPT: &str = "Be precise and concise in extracting and formatting product reviews.";
const MIN_CONTENT_CHARS: usize = 20;

pub fn review_prompt(query: &str) -> String {
    format!(
        "Search for detailed customer reviews of {} on fashion retailers and review platforms. \
For each review, extract and format the following information:\n\n\
Rating: [X out of 5 stars]\n\
Source: [Website name]\n\
Review: [Full review text]\n\
Date: [Review date if available]\n\
Verified Purchase: [Yes/No if available]\n\n\
Separate reviews with a blank line. Focus on recent, detailed reviews that discuss fit, sizing, \
fabric, comfort and how the item looks when worn. Prioritize verified purchase reviews.",
        query
    )
}

fn field_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?:\d+\.\s*|[-*]\s+)?\**\s*(rating|source|review|date|verified purchase)\s*\**\s*:\s*\**\s*(.*)$",
        )
        .expect("valid regex")
    })
}

#[derive(Default)]
struct PendingReview {
    content: Vec<String>,
    rating: Option<String>,
    source: Option<String>,
    date: Option<String>,
    verified: Option<bool>,
    labelled: bool,
}

impl PendingReview {
    fn is_empty(&self) -> bool {
        self.content.is_empty() && self.rating.is_none() && self.source.is_none()
    }

    fn finish(self, source_id: &str) -> Option<RawReview> {
        let text = self.content.join("\n").trim().to_string();
        if !self.labelled || text.chars().count() <= MIN_CONTENT_CHARS {
            return None;
        }

        let verified = self
            .verified
            .unwrap_or_else(|| text.to_lowercase().contains("verified"));
        let mut review = RawReview::new(source_id, text)
            .verified(verified)
            .with_origin(self.source.unwrap_or_else(|| "Online Review".to_string()));
        if let Some(rating) = self.rating.as_deref().and_then(parse_rating_text) {
            review = review.with_rating(rating);
        }
        if let Some(date) = self.date.as_deref().and_then(parse_review_date) {
            review = review.with_timestamp(date);
        }
        Some(review)
    }
}

/// Parses the engine's answer into raw reviews
///
/// A blank line ends a review. A `Rating:` or `Source:` line arriving after
/// review text also starts a new one, since engines do not always leave
/// blank lines. Unlabelled lines continue the current review text; a block
/// with no labelled field at all is preamble and is dropped.
pub fn parse_answer(source_id: &str, answer: &str) -> Vec<RawReview> {
    let mut reviews = Vec::new();
    let mut pending = PendingReview::default();

    for raw_line in answer.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            if !pending.is_empty() {
                reviews.extend(std::mem::take(&mut pending).finish(source_id));
            }
            continue;
        }

        let Some(caps) = field_pattern().captures(line) else {
            if !line.starts_with('#') {
                pending.content.push(line.trim_matches('"').to_string());
            }
            continue;
        };

        let key = caps[1].to_lowercase();
        let value = caps[2].trim().trim_matches('*').trim().to_string();

        if matches!(key.as_str(), "rating" | "source") && !pending.content.is_empty() {
            reviews.extend(std::mem::take(&mut pending).finish(source_id));
        }

        pending.labelled = true;
        match key.as_str() {
            "rating" => pending.rating = Some(value),
            "source" => pending.source = Some(value),
            "review" => pending.content.push(value.trim_matches('"').to_string()),
            "date" => pending.date = Some(value),
            _ => pending.verified = Some(value.to_lowercase().starts_with('y')),
        }
    }

    if !pending.is_empty() {
        reviews.extend(pending.finish(source_id));
    }
    reviews
}

fn map_backend_error(err: BackendError) -> SourceError {
    match err {
        BackendError::RateLimitError { .. } => SourceError::RateLimited(err.to_string()),
        BackendError::AuthenticationError { .. } => SourceError::AuthInvalid(err.to_string()),
        BackendError::InvalidResponse { .. } => SourceError::ParseFailure(err.to_string()),
        BackendError::ApiError { .. }
        | BackendError::TimeoutError { .. }
        | BackendError::NetworkError { .. }
        | BackendError::Other { .. } => SourceError::Unreachable(err.to_string()),
    }
}

/// Answer-engine review search
#[derive(Clone)]
pub struct AnswerEngineAdapter {
    id: String,
    client: Arc<dyn LLMClient>,
}

impl AnswerEngineAdapter {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self {
            id: "perplexity-answers".to_string(),
            client,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn fetch(&self, query: &Query) -> Result<Vec<RawReview>, SourceError> {
        let request = LLMRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(review_prompt(query.as_str())),
        ])
        .with_temperature(0.2)
        .with_max_tokens(1024);

        debug!(
            source = %self.id,
            client = self.client.name(),
            "Requesting reviews from answer engine"
        );
        let response = self.client.chat(request).await.map_err(map_backend_error)?;

        if response.content.trim().is_empty() {
            return Err(SourceError::ParseFailure(
                "answer engine returned an empty answer".to_string(),
            ));
        }

        let reviews = parse_answer(&self.id, &response.content);
        info!(source = %self.id, count = reviews.len(), "Parsed answer engine reviews");
        Ok(reviews)
    }
}

impl std::fmt::Debug for AnswerEngineAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerEngineAdapter")
            .field("id", &self.id)
            .field("client", &self.client.name())
            .finish()
    }
}
