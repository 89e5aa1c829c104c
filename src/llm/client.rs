use super::error::BackendError;
use super::types::{LLMRequest, LLMResponse};
use async_trait::async_trait;

/// Chat backend shared by review analysis and the answer-engine source
///
/// Categorization and synthesis reach it through `AnalysisService`; the
/// answer-engine adapter calls it directly to ask for review blocks.
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn chat(&self, request: LLMRequest) -> Result<LLMResponse, BackendError>;

    /// Short backend label used in logs
    fn name(&self) -> &str;

    fn model_info(&self) -> Option<String> {
        None
    }
}
