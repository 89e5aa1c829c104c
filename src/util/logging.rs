//! Structured logging setup for fitsense
//!
//! Logs always go to stderr so that JSON or YAML summaries printed on stdout
//! stay machine-readable. `RUST_LOG`, when set, replaces the default filter
//! entirely; otherwise the crate logs at the configured level and the HTTP
//! stack is held at `warn`.
//!
//! # Example
//!
//! ```no_run
//! use fitsense::util::logging;
//!
//! logging::init_from_env();
//! tracing::info!(query = "linen midi dress", "Starting");
//! ```

use std::env;
use std::io;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

const QUIET_DEPENDENCIES: &[&str] = &["h2=warn", "hyper=warn", "hyper_util=warn", "reqwest=warn"];

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,

    /// One JSON object per line instead of the human format
    pub use_json: bool,

    pub include_target: bool,

    /// File and line number of the log call
    pub include_location: bool,

    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: false,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// JSON lines with full metadata, for log collectors
    pub fn structured() -> Self {
        Self {
            level: Level::INFO,
            use_json: true,
            include_target: true,
            include_location: true,
            include_thread_ids: true,
        }
    }
}

/// Parses a log level, case-insensitively
///
/// Returns `None` for anything that is not a tracing level name.
pub fn parse_level(level_str: &str) -> Option<Level> {
    match level_str.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Filter used when `RUST_LOG` is not set
pub fn default_filter(level: Level) -> EnvFilter {
    let mut filter = EnvFilter::new(format!("fitsense={}", level));
    for directive in QUIET_DEPENDENCIES {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Installs the global subscriber; later calls are ignored
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = match env::var("RUST_LOG") {
            Ok(spec) if !spec.trim().is_empty() => EnvFilter::new(spec),
            _ => default_filter(config.level),
        };

        let layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(config.include_target)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_thread_ids(config.include_thread_ids)
            .with_thread_names(config.include_thread_ids);

        let registry = tracing_subscriber::registry().with(filter);
        let result = if config.use_json {
            registry.with(layer.json()).try_init()
        } else {
            registry.with(layer).try_init()
        };

        if let Err(e) = result {
            eprintln!("Logging already initialized: {}", e);
        }
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

/// Reads `FITSENSE_LOG_LEVEL` and `FITSENSE_LOG_JSON`
pub fn init_from_env() {
    let level = env::var("FITSENSE_LOG_LEVEL")
        .ok()
        .and_then(|v| parse_level(&v))
        .unwrap_or(Level::INFO);

    let use_json = env::var("FITSENSE_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    init_logging(LoggingConfig {
        level,
        use_json,
        ..Default::default()
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Some(Level::TRACE));
        assert_eq!(parse_level("Debug"), Some(Level::DEBUG));
        assert_eq!(parse_level(" INFO "), Some(Level::INFO));
        assert_eq!(parse_level("warning"), Some(Level::WARN));
        assert_eq!(parse_level("error"), Some(Level::ERROR));
        assert_eq!(parse_level("loud"), None);
        assert_eq!(parse_level(""), None);
    }

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.use_json);
        assert!(!config.include_location);
    }

    #[test]
    fn test_structured_config() {
        let config = LoggingConfig::structured();
        assert!(config.use_json);
        assert!(config.include_target);
        assert!(config.include_thread_ids);
    }

    #[test]
    fn test_default_filter_names_crate() {
        let filter = default_filter(Level::DEBUG).to_string();
        assert!(filter.contains("fitsense=debug"));
        assert!(filter.contains("reqwest=warn"));
    }
}
