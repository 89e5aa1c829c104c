//! LLM client abstraction layer
//!
//! This module provides a trait-based abstraction for LLM communication,
//! allowing the GenAI-backed client and the scripted mock to be used
//! interchangeably.

mod client;
mod error;
mod genai;
mod mock;
mod types;

pub use client::LLMClient;
pub use error::BackendError;
pub use genai::GenAIClient;
pub use mock::{MockLLMClient, MockResponse};
pub use types::{ChatMessage, LLMRequest, LLMResponse, MessageRole};
