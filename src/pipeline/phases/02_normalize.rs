use crate::pipeline::config::PipelineConfig;
use crate::pipeline::context::{PipelineContext, RunContext, Stage};
use crate::pipeline::error::PipelineError;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::review::{NormalizedReview, RawReview, RejectReason};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{debug, info};

pub struct NormalizePhase;

const PROMOTIONAL_PHRASES: &[&str] = &[
    "click here",
    "buy now",
    "discount code",
    "promo code",
    "use code",
    "follow me",
    "check out my",
    "free followers",
    "dm me",
];

const UPPERCASE_RATIO_LIMIT: f32 = 0.7;
const UPPERCASE_MIN_LETTERS: usize = 10;
const PUNCTUATION_RUN: usize = 4;

#[derive(Debug, Default)]
pub struct NormalizeOutput {
    pub valid: Vec<NormalizedReview>,
    pub discarded: Vec<NormalizedReview>,
}

/// Canonical ratings, fingerprints and validity for merged adapter output
#[derive(Debug, Clone)]
pub struct Normalizer {
    min_chars: usize,
    prefix_chars: usize,
    near_duplicate_threshold: f64,
}

impl Normalizer {
    pub fn new(min_chars: usize, prefix_chars: usize, near_duplicate_threshold: f64) -> Self {
        Self {
            min_chars,
            prefix_chars,
            near_duplicate_threshold,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.min_review_chars,
            config.fingerprint_prefix_chars,
            config.near_duplicate_threshold,
        )
    }

    /// Lowercased alphanumeric words, single-spaced, cut to the prefix length
    pub fn normalized_prefix(&self, text: &str) -> String {
        let mapped: String = text
            .chars()
            .map(|c| {
                if c.is_alphanumeric() {
                    c.to_lowercase().next().unwrap_or(c)
                } else {
                    ' '
                }
            })
            .collect();
        let collapsed = mapped.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.chars().take(self.prefix_chars).collect()
    }

    pub fn fingerprint(&self, text: &str) -> String {
        let digest = Sha256::digest(self.normalized_prefix(text).as_bytes());
        hex::encode(digest)
    }

    fn usability(&self, text: &str) -> Option<RejectReason> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Some(RejectReason::Empty);
        }
        if trimmed.chars().count() < self.min_chars {
            return Some(RejectReason::TooShort);
        }

        let lower = trimmed.to_lowercase();
        let links = lower.matches("http://").count() + lower.matches("https://").count();
        if links >= 2 || PROMOTIONAL_PHRASES.iter().any(|p| lower.contains(p)) {
            return Some(RejectReason::Promotional);
        }

        if is_shouting(trimmed) {
            return Some(RejectReason::Shouting);
        }
        None
    }

    /// Validates and deduplicates reviews, first seen wins
    ///
    /// Output order is input order. Running the normalizer again over the
    /// raw reviews of its own valid output rejects nothing further.
    pub fn normalize(&self, reviews: impl IntoIterator<Item = RawReview>) -> NormalizeOutput {
        let mut output = NormalizeOutput::default();
        let mut seen_fingerprints: HashSet<String> = HashSet::new();
        let mut accepted_prefixes: Vec<String> = Vec::new();

        for raw in reviews {
            let fingerprint = self.fingerprint(&raw.text);
            let canonical_rating = raw.rating.and_then(|r| r.canonical());

            let rejection = self.usability(&raw.text).or_else(|| {
                if seen_fingerprints.contains(&fingerprint) {
                    return Some(RejectReason::Duplicate);
                }
                let prefix = self.normalized_prefix(&raw.text);
                let threshold = self.near_duplicate_threshold;
                let near = accepted_prefixes
                    .iter()
                    .any(|accepted| strsim::normalized_levenshtein(accepted, &prefix) >= threshold);
                if near {
                    return Some(RejectReason::Duplicate);
                }
                accepted_prefixes.push(prefix);
                None
            });

            if rejection.is_none() {
                seen_fingerprints.insert(fingerprint.clone());
            } else {
                debug!(
                    source = %raw.source_id,
                    reason = ?rejection,
                    "Discarding review"
                );
            }

            let normalized = NormalizedReview {
                raw,
                canonical_rating,
                fingerprint,
                valid: rejection.is_none(),
                rejection,
            };
            if normalized.valid {
                output.valid.push(normalized);
            } else {
                output.discarded.push(normalized);
            }
        }

        output
    }
}

/// Mostly-uppercase text or runs of repeated `!`, `?` or `.`
fn is_shouting(text: &str) -> bool {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() >= UPPERCASE_MIN_LETTERS {
        let upper = letters.iter().filter(|c| c.is_uppercase()).count();
        if upper as f32 / letters.len() as f32 > UPPERCASE_RATIO_LIMIT {
            return true;
        }
    }

    let mut run = 0;
    let mut previous = None;
    for c in text.chars() {
        if matches!(c, '!' | '?' | '.') && previous == Some(c) {
            run += 1;
        } else {
            run = 1;
        }
        if matches!(c, '!' | '?' | '.') && run >= PUNCTUATION_RUN {
            return true;
        }
        previous = Some(c);
    }
    false
}

#[async_trait]
impl WorkflowPhase for NormalizePhase {
    fn stage(&self) -> Stage {
        Stage::Normalizing
    }

    async fn execute(
        &self,
        ctx: &PipelineContext,
        run: &mut RunContext,
    ) -> Result<(), PipelineError> {
        let normalizer = Normalizer::from_config(&ctx.config);
        let output = normalizer.normalize(run.raw_reviews.iter().cloned());

        info!(
            valid = output.valid.len(),
            discarded = output.discarded.len(),
            "Normalization complete"
        );

        run.normalized = output.valid;
        run.discarded = output.discarded;

        if run.normalized.is_empty() {
            return Err(PipelineError::NoReviewsFound {
                query: run.query.to_string(),
                sources_total: run.statuses.len(),
                sources_failed: run.statuses.iter().filter(|s| !s.succeeded()).count(),
            });
        }
        Ok(())
    }
}
