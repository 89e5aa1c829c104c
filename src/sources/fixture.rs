//! Offline review source
//!
//! Serves a fixed set of reviews, either built in code or loaded from a JSON
//! file. Failures and latency can be scripted, which is how the pipeline's
//! retry, timeout and isolation behaviour is exercised without a network.

use super::text::parse_review_date;
use super::SourceError;
use crate::review::{Query, RawRating, RawReview};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Review file layout accepted by [`FixtureSource::from_json_file`]
///
/// ```json
/// {
///   "source": "boutique",
///   "reviews": [
///     { "text": "Runs small, size up", "rating": 3, "date": "2024-03-01" }
///   ]
/// }
/// ```
///
/// A bare array of reviews is accepted too; the source id then defaults to
/// the file stem.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FixtureFile {
    Document {
        #[serde(default)]
        source: Option<String>,
        reviews: Vec<FixtureReview>,
    },
    Bare(Vec<FixtureReview>),
}

#[derive(Debug, Deserialize)]
struct FixtureReview {
    text: String,
    #[serde(default)]
    rating: Option<f32>,
    #[serde(default = "default_scale")]
    rating_scale: f32,
    #[serde(default)]
    author_context: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    purchase_url: Option<String>,
    #[serde(default)]
    origin: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    verified: bool,
    #[serde(default)]
    helpful_votes: u32,
}

fn default_scale() -> f32 {
    5.0
}

impl FixtureReview {
    fn into_raw(self, source_id: &str) -> RawReview {
        let mut review = RawReview::new(source_id, self.text)
            .verified(self.verified)
            .with_helpful_votes(self.helpful_votes);
        if let Some(value) = self.rating {
            review = review.with_rating(RawRating {
                value,
                scale: self.rating_scale,
            });
        }
        if let Some(context) = self.author_context {
            review = review.with_author_context(context);
        }
        if let Some(date) = self.date.as_deref().and_then(parse_review_date) {
            review = review.with_timestamp(date);
        }
        if let Some(url) = self.image_url {
            review = review.with_product_image_url(url);
        }
        if let Some(url) = self.purchase_url {
            review = review.with_purchase_url(url);
        }
        if let Some(origin) = self.origin {
            review = review.with_origin(origin);
        }
        if let Some(author) = self.author {
            review = review.with_author(author);
        }
        review
    }
}

/// In-memory review source with scriptable failures and latency
#[derive(Debug, Clone)]
pub struct FixtureSource {
    id: String,
    reviews: Arc<Vec<RawReview>>,
    failures: Arc<Mutex<VecDeque<SourceError>>>,
    persistent_failure: Option<SourceError>,
    delay: Duration,
    attempts: Arc<AtomicU32>,
}

impl FixtureSource {
    /// Every review is re-stamped with `id` as its source id
    pub fn new(id: impl Into<String>, reviews: Vec<RawReview>) -> Self {
        let id = id.into();
        let reviews = reviews
            .into_iter()
            .map(|mut r| {
                r.source_id = id.clone();
                r
            })
            .collect();

        Self {
            id,
            reviews: Arc::new(reviews),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            persistent_failure: None,
            delay: Duration::ZERO,
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn from_texts(id: impl Into<String>, texts: &[&str]) -> Self {
        let id = id.into();
        let reviews = texts.iter().map(|t| RawReview::new(id.clone(), *t)).collect();
        Self::new(id, reviews)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read review fixture {}", path.display()))?;
        let parsed: FixtureFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse review fixture {}", path.display()))?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "fixture".to_string());

        let (id, reviews) = match parsed {
            FixtureFile::Document { source, reviews } => (source.unwrap_or(stem), reviews),
            FixtureFile::Bare(reviews) => (stem, reviews),
        };

        let reviews = reviews.into_iter().map(|r| r.into_raw(&id)).collect();
        Ok(Self::new(id, reviews))
    }

    /// Queued failures are returned, one per call, before any reviews
    pub fn with_failures(self, failures: impl IntoIterator<Item = SourceError>) -> Self {
        if let Ok(mut queue) = self.failures.lock() {
            queue.extend(failures);
        }
        self
    }

    /// Fails every call with `error`
    pub fn always_failing(mut self, error: SourceError) -> Self {
        self.persistent_failure = Some(error);
        self
    }

    /// Sleeps before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn review_count(&self) -> usize {
        self.reviews.len()
    }

    /// Number of `fetch` calls made so far, across clones
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn fetch(&self, _query: &Query) -> Result<Vec<RawReview>, SourceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(error) = &self.persistent_failure {
            return Err(error.clone());
        }

        let queued = self.failures.lock().ok().and_then(|mut q| q.pop_front());
        if let Some(error) = queued {
            return Err(error);
        }

        Ok(self.reviews.as_ref().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn query() -> Query {
        Query::new("wrap dress").unwrap()
    }

    #[tokio::test]
    async fn test_fixture_serves_reviews() {
        let source = FixtureSource::from_texts("shop", &["one review here", "another review here"]);
        let reviews = source.fetch(&query()).await.unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(source.attempts(), 1);
    }

    #[tokio::test]
    async fn test_queued_failures_then_success() {
        let source = FixtureSource::from_texts("shop", &["fits true to size"])
            .with_failures(vec![SourceError::RateLimited("slow down".into())]);

        assert!(matches!(
            source.fetch(&query()).await,
            Err(SourceError::RateLimited(_))
        ));
        assert_eq!(source.fetch(&query()).await.unwrap().len(), 1);
        assert_eq!(source.attempts(), 2);
    }

    #[tokio::test]
    async fn test_always_failing() {
        let source = FixtureSource::from_texts("shop", &["fits true to size"])
            .always_failing(SourceError::AuthInvalid("bad key".into()));
        for _ in 0..3 {
            assert!(source.fetch(&query()).await.is_err());
        }
    }

    #[test]
    fn test_from_json_file_document() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "source": "boutique",
                "reviews": [
                    {{"text": "Runs small, size up one", "rating": 3, "date": "2024-03-01", "verified": true}},
                    {{"text": "Ten out of ten", "rating": 10, "rating_scale": 10, "helpful_votes": 4}}
                ]
            }}"#
        )
        .unwrap();

        let source = FixtureSource::from_json_file(file.path()).unwrap();
        assert_eq!(source.id(), "boutique");
        assert_eq!(source.review_count(), 2);
        let first = &source.reviews[0];
        assert_eq!(first.source_id, "boutique");
        assert!(first.verified);
        assert!(first.timestamp.is_some());
        assert_eq!(source.reviews[1].rating.unwrap().canonical(), Some(5.0));
    }

    #[test]
    fn test_from_json_file_bare_array_uses_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outlet.json");
        std::fs::write(&path, r#"[{"text": "Lovely soft knit"}]"#).unwrap();

        let source = FixtureSource::from_json_file(&path).unwrap();
        assert_eq!(source.id(), "outlet");
        assert_eq!(source.review_count(), 1);
    }

    #[test]
    fn test_from_json_file_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(FixtureSource::from_json_file(&path).is_err());
    }
}
