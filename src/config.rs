//! Configuration management for fitsense
//!
//! Settings are loaded from environment variables with sensible defaults.
//! [`FitsenseConfig`] holds the tunables; [`Capabilities`] is the
//! capability-availability map derived from it once at startup, telling the
//! pipeline which review sources and which analysis backend it may use.
//!
//! # Environment Variables
//!
//! ## Source credentials
//! - `SERPAPI_KEY`: Google Shopping search through SerpAPI
//! - `FIRECRAWL_KEY`: retailer page search and scraping through Firecrawl
//! - `PERPLEXITY_KEY`: Perplexity Sonar, used both as a review source and, by
//!   default, as the analysis backend
//!
//! ## Analysis backend
//! - `FITSENSE_PROVIDER`: genai adapter kind - default: "openai"
//! - `FITSENSE_MODEL`: model name - default: "sonar"
//! - `FITSENSE_API_BASE_URL`: endpoint override - default: the Perplexity API
//!   when the analysis key is `PERPLEXITY_KEY`
//! - `FITSENSE_API_KEY_ENV`: variable holding the analysis key - default:
//!   "PERPLEXITY_KEY"
//!
//! ## Runtime
//! - `FITSENSE_ADAPTER_TIMEOUT`: per-adapter timeout in seconds - default: "25"
//! - `FITSENSE_PIPELINE_TIMEOUT`: whole-run timeout in seconds - default: "90"
//! - `FITSENSE_ANALYSIS_TIMEOUT`: per analysis request, seconds - default: "30"
//! - `FITSENSE_MAX_RETRIES`: adapter retries - default: "2"
//! - `FITSENSE_LOG_LEVEL`: logging level - default: "info"
//!
//! # Example
//!
//! ```no_run
//! use fitsense::{Capabilities, FitsenseConfig};
//!
//! let config = FitsenseConfig::default();
//! config.validate().expect("Invalid configuration");
//!
//! let capabilities = Capabilities::from_env(&config);
//! println!("{} review sources configured", capabilities.source_count());
//! ```

use crate::pipeline::PipelineConfig;
use crate::sources::SourceKind;
use genai::adapter::AdapterKind;
use serde::Serialize;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const PERPLEXITY_BASE_URL: &str = "https://api.perplexity.ai/";
pub const PERPLEXITY_KEY_ENV: &str = "PERPLEXITY_KEY";
pub const SERPAPI_KEY_ENV: &str = "SERPAPI_KEY";
pub const FIRECRAWL_KEY_ENV: &str = "FIRECRAWL_KEY";

const DEFAULT_MODEL: &str = "sonar";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ADAPTER_TIMEOUT_SECS: u64 = 25;
const DEFAULT_PIPELINE_TIMEOUT_SECS: u64 = 90;
const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 2;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid provider: {0}. Valid options: openai, anthropic, gemini, groq, xai, ollama, deepseek, cohere")]
    InvalidProvider(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Tunables loaded from the environment
#[derive(Debug, Clone)]
pub struct FitsenseConfig {
    pub provider: AdapterKind,
    pub model: String,
    /// Endpoint override for the analysis backend
    pub api_base_url: Option<String>,
    /// Environment variable holding the analysis key
    pub api_key_env: String,
    pub adapter_timeout_secs: u64,
    pub pipeline_timeout_secs: u64,
    pub analysis_timeout_secs: u64,
    pub max_retries: u32,
    pub log_level: String,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

/// Parses a lowercase genai adapter name
pub fn parse_provider(name: &str) -> Result<AdapterKind, ConfigError> {
    AdapterKind::from_lower_str(&name.trim().to_lowercase())
        .ok_or_else(|| ConfigError::InvalidProvider(name.to_string()))
}

impl Default for FitsenseConfig {
    fn default() -> Self {
        let provider = env::var("FITSENSE_PROVIDER")
            .ok()
            .and_then(|s| parse_provider(&s).ok())
            .unwrap_or(AdapterKind::OpenAI);

        let model = env::var("FITSENSE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let api_key_env =
            env::var("FITSENSE_API_KEY_ENV").unwrap_or_else(|_| PERPLEXITY_KEY_ENV.to_string());

        let api_base_url = env::var("FITSENSE_API_BASE_URL").ok().or_else(|| {
            (api_key_env == PERPLEXITY_KEY_ENV).then(|| PERPLEXITY_BASE_URL.to_string())
        });

        let log_level = env::var("FITSENSE_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            provider,
            model,
            api_base_url,
            api_key_env,
            adapter_timeout_secs: env_parse("FITSENSE_ADAPTER_TIMEOUT")
                .unwrap_or(DEFAULT_ADAPTER_TIMEOUT_SECS),
            pipeline_timeout_secs: env_parse("FITSENSE_PIPELINE_TIMEOUT")
                .unwrap_or(DEFAULT_PIPELINE_TIMEOUT_SECS),
            analysis_timeout_secs: env_parse("FITSENSE_ANALYSIS_TIMEOUT")
                .unwrap_or(DEFAULT_ANALYSIS_TIMEOUT_SECS),
            max_retries: env_parse("FITSENSE_MAX_RETRIES").unwrap_or(DEFAULT_MAX_RETRIES),
            log_level,
        }
    }
}

impl FitsenseConfig {
    /// Checks that timeouts, retries and the log level are in range
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` naming the first bad value
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.adapter_timeout_secs == 0 || self.adapter_timeout_secs > 300 {
            return Err(ConfigError::ValidationFailed(
                "Adapter timeout must be between 1 and 300 seconds".to_string(),
            ));
        }
        if self.pipeline_timeout_secs == 0 || self.pipeline_timeout_secs > 900 {
            return Err(ConfigError::ValidationFailed(
                "Pipeline timeout must be between 1 and 900 seconds".to_string(),
            ));
        }
        if self.pipeline_timeout_secs < self.adapter_timeout_secs {
            return Err(ConfigError::ValidationFailed(
                "Pipeline timeout cannot be shorter than the adapter timeout".to_string(),
            ));
        }
        if self.analysis_timeout_secs == 0 || self.analysis_timeout_secs > 600 {
            return Err(ConfigError::ValidationFailed(
                "Analysis timeout must be between 1 and 600 seconds".to_string(),
            ));
        }
        if self.max_retries > 5 {
            return Err(ConfigError::ValidationFailed(
                "At most 5 adapter retries are allowed".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_adapter_timeout(Duration::from_secs(self.adapter_timeout_secs))
            .with_pipeline_timeout(Duration::from_secs(self.pipeline_timeout_secs))
            .with_max_adapter_retries(self.max_retries)
    }
}

impl fmt::Display for FitsenseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fitsense Configuration:")?;
        writeln!(f, "  Provider: {}", self.provider.as_str())?;
        writeln!(f, "  Model: {}", self.model)?;
        if let Some(ref url) = self.api_base_url {
            writeln!(f, "  API Base URL: {}", url)?;
        }
        writeln!(f, "  API Key Env: {}", self.api_key_env)?;
        writeln!(f, "  Adapter Timeout: {}s", self.adapter_timeout_secs)?;
        writeln!(f, "  Pipeline Timeout: {}s", self.pipeline_timeout_secs)?;
        writeln!(f, "  Max Retries: {}", self.max_retries)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}

/// An API key that never shows up in logs or debug output
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Returns `None` for a blank key
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        (!key.is_empty()).then_some(Self(key))
    }

    pub fn from_env(var: &str) -> Option<Self> {
        env::var(var).ok().and_then(Self::new)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// How to reach the analysis backend
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub provider: AdapterKind,
    pub model: String,
    pub endpoint: Option<String>,
    pub api_key_env: String,
    pub timeout: Duration,
}

/// Which review sources and analysis backend a run may use
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub shopping_search: Option<Credential>,
    pub site_scrape: Option<Credential>,
    pub answer_engine: Option<Credential>,
    pub analysis: Option<AnalysisSettings>,
}

/// One row of the capability report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityStatus {
    pub name: String,
    pub kind: String,
    pub configured: bool,
    pub detail: String,
}

impl Capabilities {
    /// Builds the capability map from credentials present in the environment
    pub fn from_env(config: &FitsenseConfig) -> Self {
        let analysis_key_present = config.provider == AdapterKind::Ollama
            || Credential::from_env(&config.api_key_env).is_some();

        let analysis = analysis_key_present.then(|| AnalysisSettings {
            provider: config.provider,
            model: config.model.clone(),
            endpoint: config.api_base_url.clone(),
            api_key_env: config.api_key_env.clone(),
            timeout: Duration::from_secs(config.analysis_timeout_secs),
        });

        Self {
            shopping_search: Credential::from_env(SERPAPI_KEY_ENV),
            site_scrape: Credential::from_env(FIRECRAWL_KEY_ENV),
            answer_engine: Credential::from_env(PERPLEXITY_KEY_ENV),
            analysis,
        }
    }

    pub fn without_analysis(mut self) -> Self {
        self.analysis = None;
        self
    }

    pub fn source_count(&self) -> usize {
        [&self.shopping_search, &self.site_scrape, &self.answer_engine]
            .iter()
            .filter(|c| c.is_some())
            .count()
    }

    pub fn report(&self) -> Vec<CapabilityStatus> {
        let source = |kind: SourceKind, name: &str, credential: &Option<Credential>, var: &str| {
            CapabilityStatus {
                name: name.to_string(),
                kind: kind.to_string(),
                configured: credential.is_some(),
                detail: if credential.is_some() {
                    format!("{} set", var)
                } else {
                    format!("{} not set", var)
                },
            }
        };

        vec![
            source(
                SourceKind::ShoppingSearch,
                "SerpAPI Google Shopping",
                &self.shopping_search,
                SERPAPI_KEY_ENV,
            ),
            source(
                SourceKind::SiteScrape,
                "Firecrawl retailer scrape",
                &self.site_scrape,
                FIRECRAWL_KEY_ENV,
            ),
            source(
                SourceKind::AnswerEngine,
                "Perplexity answers",
                &self.answer_engine,
                PERPLEXITY_KEY_ENV,
            ),
            CapabilityStatus {
                name: "AI analysis".to_string(),
                kind: "analysis".to_string(),
                configured: self.analysis.is_some(),
                detail: match &self.analysis {
                    Some(settings) => {
                        format!("{} ({})", settings.provider.as_str(), settings.model)
                    }
                    None => "no analysis key; summaries will be degraded".to_string(),
                },
            },
        ]
    }
}
