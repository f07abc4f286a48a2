//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::{Choice, FeedbackType};
use clap::Parser;
use std::path::PathBuf;

/// Feedback Catalyst - per-cohort rating reports from survey exports
///
/// Reads one or more CSV/XLSX survey exports, groups the 1-5 rating
/// columns into categories, and writes a ZIP archive holding one PDF
/// report per cohort.
///
/// Examples:
///   feedback-catalyst responses.xlsx
///   feedback-catalyst responses.csv --choice grouped -o branches.zip
///   feedback-catalyst ./exports/ --feedback-type classifier --model llama3.2:latest
///   feedback-catalyst responses.csv --dry-run
///   feedback-catalyst --clear-cache
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Survey files or directories of survey files (.csv, .tsv, .xlsx, .xls, .ods)
    #[arg(
        value_name = "INPUT",
        required_unless_present_any = ["init_config", "clear_cache", "show_chart"]
    )]
    pub inputs: Vec<PathBuf>,

    /// Output archive path
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Which cohorts get a document
    #[arg(long, default_value = "overall", value_name = "CHOICE")]
    pub choice: Choice,

    /// How rating columns are grouped into categories
    #[arg(short = 't', long, default_value = "structural", value_name = "TYPE")]
    pub feedback_type: FeedbackType,

    /// Path to configuration file
    ///
    /// If not specified, looks for .feedback-catalyst.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Number of input files processed at once
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Ollama model used for summaries and column classification
    #[arg(short, long, env = "FEEDBACK_CATALYST_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Timeout for each summarizer call in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Never call the summarizer; free-text sections use placeholder text
    #[arg(long)]
    pub no_ai: bool,

    /// Minimum fraction of values on the 1-5 scale for a rating column
    #[arg(long, value_name = "RATIO")]
    pub threshold: Option<f64>,

    /// Grouping column aliases (comma-separated)
    ///
    /// Example: --group-by branch,section
    #[arg(long, value_name = "ALIASES", value_delimiter = ',')]
    pub group_by: Option<Vec<String>>,

    /// Directory where rendered charts are stored
    #[arg(long, value_name = "DIR")]
    pub charts_dir: Option<PathBuf>,

    /// Add a batch-level themes and action plan document
    #[arg(long)]
    pub action_plan: bool,

    /// Read and classify inputs, print the result, and exit
    #[arg(long)]
    pub dry_run: bool,

    /// Print the dry-run result as JSON
    #[arg(long, requires = "dry_run")]
    pub json: bool,

    /// Render and store charts without composing documents
    #[arg(long, conflicts_with = "dry_run")]
    pub charts_only: bool,

    /// Print the stored path of a chart by its file name and exit
    #[arg(long, value_name = "NAME")]
    pub show_chart: Option<String>,

    /// Delete every stored chart and exit
    #[arg(long)]
    pub clear_cache: bool,

    /// Generate a default .feedback-catalyst.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// True when the invocation is an administrative command that does not
    /// process any input.
    pub fn is_admin_command(&self) -> bool {
        self.init_config || self.clear_cache || self.show_chart.is_some()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.is_admin_command() {
            return Ok(());
        }

        for input in &self.inputs {
            if !input.exists() {
                return Err(format!("Input does not exist: {}", input.display()));
            }
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(threshold) = self.threshold {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err("Threshold must be greater than 0.0 and at most 1.0".to_string());
            }
        }

        if let Some(concurrency) = self.concurrency {
            if concurrency == 0 {
                return Err("Concurrency must be at least 1".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref aliases) = self.group_by {
            if aliases.iter().all(|a| a.trim().is_empty()) {
                return Err("--group-by needs at least one alias".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
