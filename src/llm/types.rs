//! LLM communication types
//!
//! Provider-independent request/response types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instructions
    System,
    /// User message
    User,
    /// Assistant (LLM) response
    Assistant,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Request to send to the LLM
#[derive(Debug, Clone)]
pub struct LLMRequest {
    pub messages: Vec<ChatMessage>,
    /// Temperature for response generation (0.0 - 1.0)
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl LLMRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Concatenated content of all system messages
    pub fn system_text(&self) -> String {
        self.text_for(MessageRole::System)
    }

    /// Concatenated content of all user messages
    pub fn user_text(&self) -> String {
        self.text_for(MessageRole::User)
    }

    fn text_for(&self, role: MessageRole) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == role)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Response from the LLM
#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: String,
    pub response_time: Duration,
}

impl LLMResponse {
    pub fn text(content: impl Into<String>, response_time: Duration) -> Self {
        Self {
            content: content.into(),
            response_time,
        }
    }
}
