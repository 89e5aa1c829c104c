//! Review source adapters
//!
//! Each retailer or API type is one variant of [`SourceAdapter`]. The set of
//! adapters for a run is chosen once, at pipeline construction, from the
//! capability map; afterwards every adapter is driven through the same
//! `fetch(query)` contract and fails independently with a [`SourceError`].

pub mod answer_engine;
pub mod fixture;
pub mod retry;
pub mod scrape;
pub mod shopping;
pub mod text;

pub use answer_engine::AnswerEngineAdapter;
pub use fixture::FixtureSource;
pub use retry::{fetch_with_retry, FetchAttempt, RetryPolicy};
pub use scrape::SiteScrapeAdapter;
pub use shopping::ShoppingSearchAdapter;

use crate::review::{Query, RawReview, SourceFailureKind};
use std::fmt;
use thiserror::Error;

/// Why an adapter produced no reviews
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("source unreachable: {0}")]
    Unreachable(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("credentials rejected: {0}")]
    AuthInvalid(String),

    #[error("could not parse response: {0}")]
    ParseFailure(String),
}

impl SourceError {
    pub fn kind(&self) -> SourceFailureKind {
        match self {
            SourceError::Unreachable(_) => SourceFailureKind::Unreachable,
            SourceError::RateLimited(_) => SourceFailureKind::RateLimited,
            SourceError::AuthInvalid(_) => SourceFailureKind::AuthInvalid,
            SourceError::ParseFailure(_) => SourceFailureKind::ParseFailure,
        }
    }

    /// Rate limits and connectivity problems may clear up on a later attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Unreachable(_) | SourceError::RateLimited(_))
    }

    pub fn message(&self) -> &str {
        match self {
            SourceError::Unreachable(m)
            | SourceError::RateLimited(m)
            | SourceError::AuthInvalid(m)
            | SourceError::ParseFailure(m) => m,
        }
    }
}

/// Adapter family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    ShoppingSearch,
    SiteScrape,
    AnswerEngine,
    Fixture,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::ShoppingSearch => "shopping-search",
            SourceKind::SiteScrape => "site-scrape",
            SourceKind::AnswerEngine => "answer-engine",
            SourceKind::Fixture => "fixture",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured review source
#[derive(Debug, Clone)]
pub enum SourceAdapter {
    ShoppingSearch(ShoppingSearchAdapter),
    SiteScrape(SiteScrapeAdapter),
    AnswerEngine(AnswerEngineAdapter),
    Fixture(FixtureSource),
}

impl SourceAdapter {
    pub fn id(&self) -> &str {
        match self {
            SourceAdapter::ShoppingSearch(a) => a.id(),
            SourceAdapter::SiteScrape(a) => a.id(),
            SourceAdapter::AnswerEngine(a) => a.id(),
            SourceAdapter::Fixture(a) => a.id(),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            SourceAdapter::ShoppingSearch(_) => SourceKind::ShoppingSearch,
            SourceAdapter::SiteScrape(_) => SourceKind::SiteScrape,
            SourceAdapter::AnswerEngine(_) => SourceKind::AnswerEngine,
            SourceAdapter::Fixture(_) => SourceKind::Fixture,
        }
    }

    /// Fetches raw reviews for the query; every review carries this adapter's id
    pub async fn fetch(&self, query: &Query) -> Result<Vec<RawReview>, SourceError> {
        match self {
            SourceAdapter::ShoppingSearch(a) => a.fetch(query).await,
            SourceAdapter::SiteScrape(a) => a.fetch(query).await,
            SourceAdapter::AnswerEngine(a) => a.fetch(query).await,
            SourceAdapter::Fixture(a) => a.fetch(query).await,
        }
    }
}

impl From<FixtureSource> for SourceAdapter {
    fn from(source: FixtureSource) -> Self {
        SourceAdapter::Fixture(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(SourceError::Unreachable("x".into()).is_retryable());
        assert!(SourceError::RateLimited("x".into()).is_retryable());
        assert!(!SourceError::AuthInvalid("x".into()).is_retryable());
        assert!(!SourceError::ParseFailure("x".into()).is_retryable());
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            SourceError::AuthInvalid("bad key".into()).kind(),
            SourceFailureKind::AuthInvalid
        );
        assert_eq!(SourceError::ParseFailure("x".into()).message(), "x");
    }

    #[tokio::test]
    async fn test_adapter_dispatch() {
        let adapter: SourceAdapter =
            FixtureSource::from_texts("boutique", &["Gorgeous colour and it fits like a glove"])
                .into();
        assert_eq!(adapter.id(), "boutique");
        assert_eq!(adapter.kind(), SourceKind::Fixture);

        let reviews = adapter.fetch(&Query::new("wrap dress").unwrap()).await.unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].source_id, "boutique");
    }
}
