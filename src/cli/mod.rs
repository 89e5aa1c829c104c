pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{CliArgs, Commands, OutputFormatArg, SourcesArgs, SummarizeArgs};
pub use handlers::{handle_sources, handle_summarize};
pub use output::{OutputFormat, OutputFormatter};
