//! fitsense - multi-source fashion review aggregation
//!
//! Collects reviews for a clothing product from several independent sources
//! at once, cleans and deduplicates them, tags every review with fashion
//! aspects (fit, style, comfort, material, color, quality, value) and folds
//! the result into a [`ProductSummary`] with representative quotes and
//! optional AI styling advice.
//!
//! # Core Concepts
//!
//! - **Sources**: adapters that turn a [`Query`] into raw reviews (SerpAPI
//!   shopping search, Firecrawl retailer scrape, Perplexity answers, fixtures)
//! - **Pipeline**: fetch, normalize, categorize and synthesize stages run by
//!   [`ReviewPipeline`]; a failing source or AI call degrades the summary
//!   instead of failing the run
//! - **Capabilities**: which sources and analysis backend are configured,
//!   read once from the environment
//!
//! # Example Usage
//!
//! ```no_run
//! use fitsense::{Capabilities, FitsenseConfig, Query, ReviewPipeline};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = FitsenseConfig::default();
//! let capabilities = Capabilities::from_env(&config);
//! let pipeline =
//!     ReviewPipeline::from_capabilities(&capabilities, config.pipeline_config()).await?;
//!
//! let summary = pipeline.run(&Query::new("black satin slip skirt")?).await?;
//! for aspect in &summary.aspect_summaries {
//!     println!("{}: {:+.2}", aspect.tag, aspect.aggregate_sentiment_score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod llm;
pub mod pipeline;
pub mod progress;
pub mod review;
pub mod sources;
pub mod util;

pub use config::{Capabilities, ConfigError, FitsenseConfig};
pub use llm::{BackendError, LLMClient};
pub use pipeline::{PipelineConfig, PipelineError, ReviewPipeline};
pub use review::{AspectTag, ProductSummary, Query, RawReview, Sentiment};
pub use sources::{FixtureSource, SourceAdapter, SourceError};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
