//! Command handlers
//!
//! Each handler returns the process exit code: 0 on success, 1 when the
//! pipeline could not produce a summary, 2 for configuration, usage and I/O
//! errors.

use super::commands::{SourcesArgs, SummarizeArgs};
use super::output::OutputFormatter;
use crate::config::{
    Capabilities, FitsenseConfig, FIRECRAWL_KEY_ENV, PERPLEXITY_KEY_ENV, SERPAPI_KEY_ENV,
};
use crate::pipeline::{analysis_client, PipelineError, ReviewPipeline};
use crate::progress::{LoggingHandler, NoOpHandler, ProgressHandler};
use crate::review::Query;
use crate::sources::{FixtureSource, SourceAdapter};
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PIPELINE_FAILED: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

pub async fn handle_summarize(args: &SummarizeArgs, quiet: bool) -> i32 {
    match summarize(args, quiet).await {
        Ok(()) => EXIT_SUCCESS,
        Err(err) => {
            if let Some(pipeline_err) = err.downcast_ref::<PipelineError>() {
                error!("{}", pipeline_err);
                eprintln!("Error: {}", pipeline_err);
                EXIT_PIPELINE_FAILED
            } else {
                error!("Summarize failed: {:#}", err);
                eprintln!("Error: {:#}", err);
                EXIT_USAGE
            }
        }
    }
}

pub fn handle_sources(args: &SourcesArgs) -> i32 {
    let config = FitsenseConfig::default();
    let report = Capabilities::from_env(&config).report();

    match OutputFormatter::new(args.format.into()).format_capabilities(&report) {
        Ok(output) => {
            println!("{}", output);
            EXIT_SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {:#}", err);
            EXIT_USAGE
        }
    }
}

async fn summarize(args: &SummarizeArgs, quiet: bool) -> Result<()> {
    let query = Query::new(&args.query).context("Invalid query")?;
    let config = resolve_config(args)?;
    debug!("{}", config);

    let mut capabilities = Capabilities::from_env(&config);
    if args.no_ai {
        capabilities = capabilities.without_analysis();
    }

    let progress: Arc<dyn ProgressHandler> = if quiet {
        Arc::new(NoOpHandler)
    } else {
        Arc::new(LoggingHandler)
    };

    let pipeline = if args.fixtures.is_empty() {
        if capabilities.source_count() == 0 {
            bail!(
                "No review sources configured. Set at least one of {}, {} or {}, \
                 or pass --fixture FILE",
                SERPAPI_KEY_ENV,
                FIRECRAWL_KEY_ENV,
                PERPLEXITY_KEY_ENV
            );
        }
        ReviewPipeline::from_capabilities(&capabilities, config.pipeline_config()).await?
    } else {
        let sources = load_fixtures(args.fixtures.as_slice())?;
        let analysis = match &capabilities.analysis {
            Some(settings) => Some(analysis_client(settings).await?),
            None => None,
        };
        ReviewPipeline::new(sources, analysis, config.pipeline_config())
    };
    let pipeline = pipeline.with_progress(progress);

    info!(query = %query, "Summarizing reviews");
    let summary = pipeline.run(&query).await?;

    let formatted = OutputFormatter::new(args.format.into()).format_summary(&summary)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &formatted)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
            info!("Summary written to {}", path.display());
        }
        None => println!("{}", formatted),
    }

    Ok(())
}

fn resolve_config(args: &SummarizeArgs) -> Result<FitsenseConfig> {
    let mut config = FitsenseConfig::default();
    if let Some(secs) = args.adapter_timeout {
        config.adapter_timeout_secs = secs;
    }
    if let Some(secs) = args.pipeline_timeout {
        config.pipeline_timeout_secs = secs;
    }
    config.validate()?;
    Ok(config)
}

fn load_fixtures<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<SourceAdapter>> {
    paths
        .iter()
        .map(|path| FixtureSource::from_json_file(path.as_ref()).map(SourceAdapter::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::OutputFormatArg;
    use serial_test::serial;
    use std::io::Write;
    use std::path::PathBuf;

    fn args(fixtures: Vec<PathBuf>) -> SummarizeArgs {
        SummarizeArgs {
            query: "slip skirt".to_string(),
            format: OutputFormatArg::Json,
            fixtures,
            no_ai: true,
            adapter_timeout: None,
            pipeline_timeout: None,
            output: None,
        }
    }

    #[test]
    #[serial]
    fn test_resolve_config_rejects_inverted_timeouts() {
        let mut summarize_args = args(vec![]);
        summarize_args.adapter_timeout = Some(60);
        summarize_args.pipeline_timeout = Some(10);
        assert!(resolve_config(&summarize_args).is_err());
    }

    #[test]
    fn test_load_fixtures_uses_file_stem() {
        let mut file = tempfile::Builder::new()
            .prefix("boutique")
            .suffix(".json")
            .tempfile()
            .unwrap();
        write!(file, r#"[{{"text": "Runs small, size up if between sizes"}}]"#).unwrap();

        let sources = load_fixtures(&[file.path()]).unwrap();
        assert_eq!(sources.len(), 1);
        assert!(sources[0].id().starts_with("boutique"));
    }

    #[test]
    fn test_load_fixtures_missing_file() {
        assert!(load_fixtures(&[Path::new("/nonexistent/reviews.json")]).is_err());
    }

    #[tokio::test]
    #[serial]
    async fn test_summarize_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = dir.path().join("boutique.json");
        std::fs::write(
            &fixture,
            r#"{"source": "boutique", "reviews": [
                {"text": "Runs small, true to size would be a medium", "rating": 3},
                {"text": "Gorgeous satin, very comfortable for a long evening", "rating": 5}
            ]}"#,
        )
        .unwrap();
        let out = dir.path().join("summary.json");

        let mut summarize_args = args(vec![fixture]);
        summarize_args.output = Some(out.clone());

        assert_eq!(handle_summarize(&summarize_args, true).await, EXIT_SUCCESS);
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(value["total_reviews_considered"], 2);
        assert_eq!(value["degraded"], true);
    }

    #[tokio::test]
    #[serial]
    async fn test_summarize_without_usable_reviews_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = dir.path().join("empty.json");
        std::fs::write(&fixture, r#"[{"text": "ok"}]"#).unwrap();

        assert_eq!(
            handle_summarize(&args(vec![fixture]), true).await,
            EXIT_PIPELINE_FAILED
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_summarize_with_bad_fixture_exits_two() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = dir.path().join("broken.json");
        std::fs::write(&fixture, "not json").unwrap();

        assert_eq!(handle_summarize(&args(vec![fixture]), true).await, EXIT_USAGE);
    }
}
