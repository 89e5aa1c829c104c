//! AI analysis boundary
//!
//! The pipeline treats the LLM as an opaque text-in/structured-out service.
//! [`AnalysisService::analyze`] sends a bounded prompt, extracts the JSON
//! payload from the reply and deserializes it into the caller's schema type.
//! Anything that does not parse is a [`AnalysisError::MalformedResponse`];
//! callers decide how to degrade.

use crate::llm::{BackendError, ChatMessage, LLMClient, LLMRequest};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("No analysis capability configured")]
    Unavailable,

    #[error("Analysis service unreachable: {0}")]
    Unreachable(String),

    #[error("Analysis service rate limited: {0}")]
    RateLimited(String),

    #[error("Malformed analysis response: {0}")]
    MalformedResponse(String),
}

impl AnalysisError {
    /// Whether a single retry is worthwhile
    pub fn is_transient(&self) -> bool {
        matches!(self, AnalysisError::Unreachable(_) | AnalysisError::RateLimited(_))
    }
}

impl From<BackendError> for AnalysisError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::RateLimitError { .. } => AnalysisError::RateLimited(err.to_string()),
            BackendError::InvalidResponse { .. } => {
                AnalysisError::MalformedResponse(err.to_string())
            }
            BackendError::ApiError { .. }
            | BackendError::AuthenticationError { .. }
            | BackendError::TimeoutError { .. }
            | BackendError::NetworkError { .. }
            | BackendError::Other { .. } => AnalysisError::Unreachable(err.to_string()),
        }
    }
}

/// Strips a Markdown code fence or surrounding prose from a JSON reply
pub fn extract_json(content: &str) -> &str {
    let trimmed = content.trim();

    if let Some(start_idx) = trimmed.find("```json") {
        let after_fence = &trimmed[start_idx + 7..];
        if let Some(end_idx) = after_fence.find("```") {
            return after_fence[..end_idx].trim();
        }
    }

    if let Some(start_idx) = trimmed.find("```") {
        let after_fence = &trimmed[start_idx + 3..];
        if let Some(end_idx) = after_fence.find("```") {
            return after_fence[..end_idx].trim();
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Truncates `text` to at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Throttled gateway to the LLM for one pipeline run
///
/// Holds a single permit, so at most one analysis request is in flight.
pub struct AnalysisService {
    client: Arc<dyn LLMClient>,
    permit: Semaphore,
    max_prompt_chars: usize,
}

impl AnalysisService {
    pub fn new(client: Arc<dyn LLMClient>, max_prompt_chars: usize) -> Self {
        Self {
            client,
            permit: Semaphore::new(1),
            max_prompt_chars,
        }
    }

    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    /// Sends one prompt and parses the reply into `T`
    pub async fn analyze<T: DeserializeOwned>(
        &self,
        purpose: &str,
        system: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<T, AnalysisError> {
        let _permit = self
            .permit
            .acquire()
            .await
            .map_err(|e| AnalysisError::Unreachable(e.to_string()))?;

        let prompt = truncate_chars(prompt, self.max_prompt_chars);
        debug!(purpose, prompt_chars = prompt.len(), "Sending analysis request");

        let request = LLMRequest::new(vec![ChatMessage::system(system), ChatMessage::user(prompt)])
            .with_temperature(0.1)
            .with_max_tokens(max_tokens);

        let start = Instant::now();
        let response = self.client.chat(request).await.map_err(|e| {
            warn!(purpose, error = %e, "Analysis request failed");
            AnalysisError::from(e)
        })?;

        debug!(
            purpose,
            latency_ms = start.elapsed().as_millis() as u64,
            "Analysis response received"
        );

        let json_content = extract_json(&response.content);
        serde_json::from_str(json_content).map_err(|e| {
            warn!(purpose, error = %e, "Analysis response did not match schema");
            AnalysisError::MalformedResponse(format!("{}: {}", purpose, e))
        })
    }
}

impl std::fmt::Debug for AnalysisService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisService")
            .field("client", &self.client.name())
            .field("max_prompt_chars", &self.max_prompt_chars)
            .finish()
    }
}
