//! Review records and the fashion aspect vocabulary

pub mod lexicon;
pub mod types;

pub use types::{
    AspectMention, AspectSummary, AspectTag, CategorizedReview, Degradation, NormalizedReview,
    ProductSummary, Query, QueryError, Quote, RawRating, RawReview, RejectReason, Sentiment,
    SourceFailureKind, SourceOutcome, SourceStatus, TagOrigin,
};
