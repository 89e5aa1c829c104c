//! Output formatting for multiple formats
//!
//! Summaries and the capability report can be printed as JSON, YAML or
//! human-readable text. JSON and YAML are the plain serde serializations of
//! the library types, so the schema is the one of [`ProductSummary`].

use anyhow::{Context, Result};

use crate::config::CapabilityStatus;
use crate::review::{Degradation, ProductSummary, SourceOutcome, SourceStatus};

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format
    Yaml,
    /// Human-readable formatted text
    Human,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_summary(&self, summary: &ProductSummary) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(summary)
                .context("Failed to serialize summary to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(summary).context("Failed to serialize summary to YAML")
            }
            OutputFormat::Human => Ok(self.format_summary_human(summary)),
        }
    }

    pub fn format_capabilities(&self, report: &[CapabilityStatus]) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report)
                .context("Failed to serialize capabilities to JSON"),
            OutputFormat::Yaml => serde_yaml::to_string(report)
                .context("Failed to serialize capabilities to YAML"),
            OutputFormat::Human => Ok(self.format_capabilities_human(report)),
        }
    }

    fn format_summary_human(&self, summary: &ProductSummary) -> String {
        let mut output = String::new();

        if summary.degraded {
            output.push_str(&format!("\u{26A0} Review Summary: {} (degraded)\n", summary.query));
        } else {
            output.push_str(&format!("\u{2713} Review Summary: {}\n", summary.query));
        }
        output.push_str(RULE);
        output.push_str("\n\n");

        output.push_str(&format!(
            "Reviews considered: {} from {} of {} sources\n",
            summary.total_reviews_considered,
            summary.sources_succeeded.len(),
            summary.source_statuses.len()
        ));
        if let Some(avg) = summary.average_rating {
            let rated: usize = summary.rating_distribution.values().sum();
            output.push_str(&format!(
                "Average rating:     {:.1} \u{2605} ({} rated)\n",
                avg, rated
            ));
        }
        if let Some(pct) = summary.positive_percentage {
            output.push_str(&format!("Positive:           {:.1}%\n", pct));
        }
        if !summary.overall_summary.is_empty() {
            output.push_str(&format!("\n{}\n", summary.overall_summary));
        }
        output.push('\n');

        output.push_str("Aspects:\n");
        for (i, aspect) in summary.aspect_summaries.iter().enumerate() {
            let is_last = i == summary.aspect_summaries.len() - 1;
            let connector = if is_last { "\u{2514}" } else { "\u{251C}" };
            let rail = if is_last { " " } else { "\u{2502}" };
            output.push_str(&format!(
                "{}\u{2500} {:<9} {} {:+.2}  ({} mentions, {} positive, {} negative)\n",
                connector,
                aspect.tag.as_str(),
                sentiment_bar(aspect.aggregate_sentiment_score),
                aspect.aggregate_sentiment_score,
                aspect.mention_count,
                aspect.positive_count,
                aspect.negative_count
            ));
            for quote in &aspect.representative_quotes {
                let rating = quote
                    .rating
                    .map(|r| format!(", {:.1}\u{2605}", r))
                    .unwrap_or_default();
                let verified = if quote.verified { ", verified" } else { "" };
                output.push_str(&format!(
                    "{}    \"{}\" ({}{}{})\n",
                    rail, quote.text, quote.source_id, rating, verified
                ));
            }
        }
        output.push('\n');

        if !summary.style_advice.is_empty() {
            output.push_str("Style Advice:\n");
            output.push_str(&format!("  {}\n\n", summary.style_advice));
        }
        if !summary.best_for_body_types.is_empty() {
            output.push_str(&format!(
                "Best for body types: {}\n",
                summary
                    .best_for_body_types
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        if !summary.best_for_occasions.is_empty() {
            output.push_str(&format!(
                "Best for occasions:  {}\n",
                summary
                    .best_for_occasions
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        if let Some(ref image) = summary.sample_image_url {
            output.push_str(&format!("Image: {}\n", image));
        }
        if !summary.shopping_links.is_empty() {
            output.push_str("Shop:\n");
            for link in &summary.shopping_links {
                output.push_str(&format!("  - {}\n", link));
            }
        }

        output.push_str("\nSources:\n");
        for status in &summary.source_statuses {
            output.push_str(&format!("  {}\n", describe_status(status)));
        }

        if !summary.degradations.is_empty() {
            output.push_str("\n\u{26A0} Degraded:\n");
            for degradation in &summary.degradations {
                output.push_str(&format!("  - {}\n", describe_degradation(degradation)));
            }
        }

        output
    }

    fn format_capabilities_human(&self, report: &[CapabilityStatus]) -> String {
        let mut output = String::new();

        output.push_str("Configured Capabilities\n");
        output.push_str(RULE);
        output.push_str("\n\n");

        for status in report {
            let symbol = if status.configured { "\u{2713}" } else { "\u{2717}" };
            output.push_str(&format!("{} {} [{}]\n", symbol, status.name, status.kind));
            output.push_str(&format!("  {}\n", status.detail));
        }

        output
    }
}

/// Ten-cell bar for a score in -1.0..=1.0
pub fn sentiment_bar(score: f32) -> String {
    let filled = (((score.clamp(-1.0, 1.0) + 1.0) / 2.0) * 10.0).round() as usize;
    "\u{2588}".repeat(filled) + &"\u{2591}".repeat(10 - filled)
}

pub fn describe_status(status: &SourceStatus) -> String {
    match &status.outcome {
        SourceOutcome::Succeeded { reviews, attempts } => format!(
            "\u{2713} {} ({}): {} reviews, {} attempt(s), {}ms",
            status.source_id, status.kind, reviews, attempts, status.elapsed_ms
        ),
        SourceOutcome::Failed {
            kind,
            message,
            attempts,
        } => format!(
            "\u{2717} {} ({}): {} after {} attempt(s): {}",
            status.source_id, status.kind, kind, attempts, message
        ),
        SourceOutcome::TimedOut { after_ms } => format!(
            "\u{23F1} {} ({}): timed out after {}ms",
            status.source_id, status.kind, after_ms
        ),
    }
}

pub fn describe_degradation(degradation: &Degradation) -> String {
    match degradation {
        Degradation::AnalysisUnavailable => {
            "no AI analysis configured; style advice omitted".to_string()
        }
        Degradation::SynthesisFailed { message } => format!("style synthesis failed: {}", message),
        Degradation::SynthesisSkipped => {
            "style synthesis skipped after the pipeline deadline".to_string()
        }
        Degradation::CategorizationFallback { reviews } => format!(
            "{} ambiguous review(s) tagged by keywords only",
            reviews
        ),
    }
}
