use super::client::LLMClient;
use super::error::BackendError;
use super::types::{LLMRequest, LLMResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Scripted LLM client for tests and offline runs
///
/// Responses are served in FIFO order; every received request is kept so tests
/// can assert on prompt contents and call counts.
pub struct MockLLMClient {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<LLMRequest>>,
    name: String,
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub content: String,
    pub error: Option<BackendError>,
}

impl MockResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            error: None,
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self::text(value.to_string())
    }

    pub fn error(error: BackendError) -> Self {
        Self {
            content: String::new(),
            error: Some(error),
        }
    }
}

impl MockLLMClient {
    pub fn new() -> Self {
        Self::with_name("MockLLM")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            name: name.into(),
        }
    }

    pub fn add_response(&self, response: MockResponse) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(response);
        }
    }

    pub fn add_responses(&self, responses: impl IntoIterator<Item = MockResponse>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.extend(responses);
        }
    }

    pub fn remaining_responses(&self) -> usize {
        self.responses.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<LLMRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl Default for MockLLMClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn chat(&self, request: LLMRequest) -> Result<LLMResponse, BackendError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());

        let response = next.ok_or_else(|| BackendError::Other {
            message: "MockLLMClient: No more responses in queue".to_string(),
        })?;

        if let Some(error) = response.error {
            return Err(error);
        }

        Ok(LLMResponse::text(response.content, Duration::from_millis(10)))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model_info(&self) -> Option<String> {
        Some("mock-model".to_string())
    }
}

impl std::fmt::Debug for MockLLMClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLLMClient")
            .field("name", &self.name)
            .field("remaining_responses", &self.remaining_responses())
            .finish()
    }
}
