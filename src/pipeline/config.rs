use crate::sources::RetryPolicy;
use std::time::Duration;

/// Tunables for one review pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub adapter_timeout: Duration,
    pub pipeline_timeout: Duration,
    pub max_adapter_retries: u32,
    pub retry_backoff: Duration,
    /// Reviews shorter than this (in characters, trimmed) are invalid
    pub min_review_chars: usize,
    pub fingerprint_prefix_chars: usize,
    /// Normalized Levenshtein similarity at which two reviews are the same
    pub near_duplicate_threshold: f64,
    /// Keyword confidence below which a review is sent to AI categorization
    pub ambiguity_threshold: f32,
    pub categorize_batch_size: usize,
    pub max_categorize_batches: usize,
    pub max_quotes: usize,
    pub max_quote_chars: usize,
    /// Quotes per aspect included in the synthesis payload
    pub synthesis_sample_size: usize,
    pub max_prompt_chars: usize,
    pub max_shopping_links: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            adapter_timeout: Duration::from_secs(25),
            pipeline_timeout: Duration::from_secs(90),
            max_adapter_retries: 2,
            retry_backoff: Duration::from_millis(250),
            min_review_chars: 20,
            fingerprint_prefix_chars: 160,
            near_duplicate_threshold: 0.92,
            ambiguity_threshold: 0.6,
            categorize_batch_size: 8,
            max_categorize_batches: 4,
            max_quotes: 3,
            max_quote_chars: 240,
            synthesis_sample_size: 10,
            max_prompt_chars: 12_000,
            max_shopping_links: 5,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = timeout;
        self
    }

    pub fn with_pipeline_timeout(mut self, timeout: Duration) -> Self {
        self.pipeline_timeout = timeout;
        self
    }

    pub fn with_max_adapter_retries(mut self, retries: u32) -> Self {
        self.max_adapter_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_min_review_chars(mut self, chars: usize) -> Self {
        self.min_review_chars = chars;
        self
    }

    pub fn with_near_duplicate_threshold(mut self, threshold: f64) -> Self {
        self.near_duplicate_threshold = threshold;
        self
    }

    pub fn with_ambiguity_threshold(mut self, threshold: f32) -> Self {
        self.ambiguity_threshold = threshold;
        self
    }

    pub fn with_categorize_batching(mut self, batch_size: usize, max_batches: usize) -> Self {
        self.categorize_batch_size = batch_size.max(1);
        self.max_categorize_batches = max_batches;
        self
    }

    pub fn with_max_quotes(mut self, max_quotes: usize) -> Self {
        self.max_quotes = max_quotes;
        self
    }

    pub fn with_max_prompt_chars(mut self, chars: usize) -> Self {
        self.max_prompt_chars = chars;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_adapter_retries, self.retry_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.adapter_timeout, Duration::from_secs(25));
        assert_eq!(config.pipeline_timeout, Duration::from_secs(90));
        assert_eq!(config.max_adapter_retries, 2);
        assert_eq!(config.min_review_chars, 20);
        assert_eq!(config.max_quotes, 3);
    }

    #[test]
    fn test_builder_pattern() {
        let config = PipelineConfig::new()
            .with_adapter_timeout(Duration::from_millis(50))
            .with_pipeline_timeout(Duration::from_secs(1))
            .with_max_adapter_retries(0)
            .with_categorize_batching(0, 2);

        assert_eq!(config.adapter_timeout, Duration::from_millis(50));
        assert_eq!(config.pipeline_timeout, Duration::from_secs(1));
        assert_eq!(config.retry_policy().max_retries, 0);
        assert_eq!(config.categorize_batch_size, 1);
        assert_eq!(config.max_categorize_batches, 2);
    }
}
