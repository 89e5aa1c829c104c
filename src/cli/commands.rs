use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Multi-source fashion review aggregation with aspect-level summaries
#[derive(Parser, Debug)]
#[command(
    name = "fitsense",
    about = "Aggregate fashion product reviews into an aspect-level summary",
    version,
    author,
    long_about = "fitsense collects reviews for a clothing product from shopping search, \
                  retailer pages and an answer engine, removes duplicates, tags each review \
                  with fit, style, comfort, material, color, quality and value aspects, and \
                  writes a summary with representative quotes and styling advice."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Summarize reviews for a product",
        long_about = "Runs the review pipeline for a free-text product query.\n\n\
                      Examples:\n  \
                      fitsense summarize \"linen wide leg trousers\"\n  \
                      fitsense summarize \"slip skirt\" --format json\n  \
                      fitsense summarize \"slip skirt\" --fixture reviews.json --no-ai"
    )]
    Summarize(SummarizeArgs),

    #[command(
        about = "Show which review sources and analysis backend are configured",
        long_about = "Prints the capability map built from the environment.\n\n\
                      Examples:\n  \
                      fitsense sources\n  \
                      fitsense sources --format json"
    )]
    Sources(SourcesArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct SummarizeArgs {
    #[arg(value_name = "QUERY", help = "Product to summarize, e.g. \"black slip skirt\"")]
    pub query: String,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        long = "fixture",
        value_name = "FILE",
        help = "Read reviews from a JSON file instead of live sources (repeatable, one source per file)"
    )]
    pub fixtures: Vec<PathBuf>,

    #[arg(long, help = "Skip AI categorization and synthesis")]
    pub no_ai: bool,

    #[arg(long, value_name = "SECONDS", help = "Per-source timeout in seconds")]
    pub adapter_timeout: Option<u64>,

    #[arg(long, value_name = "SECONDS", help = "Whole-run timeout in seconds")]
    pub pipeline_timeout: Option<u64>,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct SourcesArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}
