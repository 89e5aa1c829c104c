use fitsense::cli::commands::{CliArgs, Commands};
use fitsense::cli::handlers::{handle_sources, handle_summarize};
use fitsense::util::logging::{init_logging, parse_level, LoggingConfig};
use fitsense::VERSION;

use clap::Parser;
use std::env;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("fitsense v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Summarize(summarize_args) => handle_summarize(summarize_args, args.quiet).await,
        Commands::Sources(sources_args) => handle_sources(sources_args),
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level_str) = &args.log_level {
        level_or_default(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        let level_str = env::var("FITSENSE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        level_or_default(&level_str)
    };

    let use_json = env::var("FITSENSE_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    init_logging(LoggingConfig {
        level,
        use_json,
        include_target: true,
        ..LoggingConfig::default()
    });
}

fn level_or_default(level_str: &str) -> Level {
    parse_level(level_str).unwrap_or_else(|| {
        eprintln!(
            "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
            level_str
        );
        Level::INFO
    })
}
