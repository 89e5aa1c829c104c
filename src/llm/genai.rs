//! GenAI-based LLM client implementation
//!
//! Uses the `genai` crate to reach any supported provider (OpenAI, Claude,
//! Gemini, Groq, Ollama, ...). OpenAI-compatible services such as Perplexity
//! are reached through the OpenAI adapter with a custom endpoint and key.

use super::client::LLMClient;
use super::error::BackendError;
use super::types::{ChatMessage, LLMRequest, LLMResponse, MessageRole};
use async_trait::async_trait;
use genai::adapter::AdapterKind;
use genai::chat::{ChatMessage as GenAIChatMessage, ChatOptions, ChatRequest as GenAIChatRequest};
use genai::resolver::{AuthData, Endpoint, Error as ResolverError, ServiceTargetResolver};
use genai::{Client, ModelIden, ServiceTarget};
use std::time::Duration;
use tracing::{debug, error};

/// GenAI-based LLM client supporting multiple providers
pub struct GenAIClient {
    client: Client,
    model: String,
    provider: AdapterKind,
    timeout: Duration,
}

impl GenAIClient {
    /// Creates a new GenAI client
    ///
    /// # Arguments
    ///
    /// * `provider` - genai adapter used to speak to the endpoint
    /// * `model` - Model name (without provider prefix)
    /// * `timeout` - Request timeout
    /// * `endpoint` - Base URL overriding the provider default
    /// * `api_key_env` - Environment variable holding the key, overriding the
    ///   provider default
    pub async fn new(
        provider: AdapterKind,
        model: String,
        timeout: Duration,
        endpoint: Option<String>,
        api_key_env: Option<String>,
    ) -> Result<Self, BackendError> {
        let client = if endpoint.is_some() || api_key_env.is_some() {
            debug!(
                "Using custom service target for {}: endpoint={:?}, key_env={:?}",
                provider.as_str(),
                endpoint,
                api_key_env
            );

            let model_clone = model.clone();

            let resolver = ServiceTargetResolver::from_resolver_fn(
                move |service_target: ServiceTarget| -> Result<ServiceTarget, ResolverError> {
                    let endpoint = match &endpoint {
                        Some(url) => Endpoint::from_owned(url.clone()),
                        None => service_target.endpoint,
                    };

                    let auth = match api_key_env.as_deref().or(provider.default_key_env_name()) {
                        Some(key_var) => AuthData::from_env(key_var),
                        None => AuthData::from_single(""),
                    };

                    Ok(ServiceTarget {
                        endpoint,
                        auth,
                        model: ModelIden::new(provider, &model_clone),
                    })
                },
            );

            Client::builder()
                .with_service_target_resolver(resolver)
                .build()
        } else {
            Client::default()
        };

        debug!(
            "Creating GenAI client: provider={}, model={}",
            provider.as_str(),
            model,
        );

        Ok(Self {
            client,
            model,
            provider,
            timeout,
        })
    }

    fn convert_message(&self, msg: &ChatMessage) -> GenAIChatMessage {
        match msg.role {
            MessageRole::System => GenAIChatMessage::system(&msg.content),
            MessageRole::User => GenAIChatMessage::user(&msg.content),
            MessageRole::Assistant => GenAIChatMessage::assistant(&msg.content),
        }
    }
}

#[async_trait]
impl LLMClient for GenAIClient {
    async fn chat(&self, request: LLMRequest) -> Result<LLMResponse, BackendError> {
        let start = std::time::Instant::now();

        let messages: Vec<GenAIChatMessage> = request
            .messages
            .iter()
            .map(|m| self.convert_message(m))
            .collect();

        let genai_request = GenAIChatRequest::new(messages);

        let mut options = ChatOptions::default();
        if let Some(temp) = request.temperature {
            options = options.with_temperature(temp as f64);
        }
        if let Some(max_tokens) = request.max_tokens {
            options = options.with_max_tokens(max_tokens);
        }

        let response = match tokio::time::timeout(
            self.timeout,
            self.client
                .exec_chat(&self.model, genai_request, Some(&options)),
        )
        .await
        {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                error!("{} API error: {}", self.provider.as_str(), e);
                return Err(BackendError::from_provider_message(format!(
                    "{} request failed: {}",
                    self.provider.as_str(),
                    e
                )));
            }
            Err(_) => {
                error!(
                    "{} request timed out after {}s",
                    self.provider.as_str(),
                    self.timeout.as_secs()
                );
                return Err(BackendError::TimeoutError {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        let content = response.first_text().unwrap_or_default().to_string();

        Ok(LLMResponse::text(content, start.elapsed()))
    }

    fn name(&self) -> &str {
        self.provider.as_str()
    }

    fn model_info(&self) -> Option<String> {
        Some(self.model.clone())
    }
}

impl std::fmt::Debug for GenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenAIClient")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}
