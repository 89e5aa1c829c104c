//! LLM backend errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors that can occur while talking to an LLM provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BackendError {
    /// API request failed with the given message
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    /// Authentication failed or credentials are invalid
    AuthenticationError { message: String },

    /// Request timed out after the specified duration (in seconds)
    TimeoutError { seconds: u64 },

    /// Rate limit exceeded, retry after the specified duration (in seconds)
    RateLimitError { retry_after: Option<u64> },

    /// Invalid or malformed response from the LLM
    InvalidResponse {
        message: String,
        raw_response: Option<String>,
    },

    /// Network-related error
    NetworkError { message: String },

    /// Generic error for other cases
    Other { message: String },
}

impl BackendError {
    /// Classifies a provider error message by the HTTP status it mentions
    ///
    /// Provider SDK errors only expose a rendered message, so the status code is
    /// recovered from the text.
    pub fn from_provider_message(message: String) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("429")
            || lower.contains("rate limit")
            || lower.contains("too many requests")
        {
            BackendError::RateLimitError { retry_after: None }
        } else if lower.contains("401") || lower.contains("403") || lower.contains("unauthorized") {
            BackendError::AuthenticationError { message }
        } else if lower.contains("connect") || lower.contains("dns") || lower.contains("reset") {
            BackendError::NetworkError { message }
        } else {
            BackendError::ApiError {
                message,
                status_code: None,
            }
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::ApiError {
                message,
                status_code,
            } => {
                if let Some(code) = status_code {
                    write!(f, "API error ({}): {}", code, message)
                } else {
                    write!(f, "API error: {}", message)
                }
            }
            BackendError::AuthenticationError { message } => {
                write!(f, "Authentication failed: {}", message)
            }
            BackendError::TimeoutError { seconds } => {
                write!(f, "Request timed out after {} seconds", seconds)
            }
            BackendError::RateLimitError { retry_after } => {
                if let Some(seconds) = retry_after {
                    write!(f, "Rate limit exceeded, retry after {} seconds", seconds)
                } else {
                    write!(f, "Rate limit exceeded")
                }
            }
            BackendError::InvalidResponse { message, .. } => {
                write!(f, "Invalid response from LLM: {}", message)
            }
            BackendError::NetworkError { message } => {
                write!(f, "Network error: {}", message)
            }
            BackendError::Other { message } => {
                write!(f, "Error: {}", message)
            }
        }
    }
}

impl std::error::Error for BackendError {}
