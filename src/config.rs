//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.feedback-catalyst.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".feedback-catalyst.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// External summarizer settings.
    #[serde(default)]
    pub summarizer: SummarizerConfig,

    /// Column classification settings.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Cohort partitioning settings.
    #[serde(default)]
    pub cohort: CohortConfig,

    /// Document and chart settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default archive path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of input files processed at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_output() -> String {
    "feedback_catalyst.zip".to_string()
}

fn default_concurrency() -> usize {
    4
}

/// Ollama-backed summarizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Call the summarizer at all. When false every call degrades to its fallback.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on any single summarizer call, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Maximum number of free-text responses sent per summary.
    #[serde(default = "default_max_responses")]
    pub max_responses: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ollama_url: default_ollama_url(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
            max_responses: default_max_responses(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout() -> u64 {
    60
}

fn default_max_responses() -> usize {
    50
}

/// Column classification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Fraction of non-missing values that must be whole numbers in 1-5.
    #[serde(default = "default_validity_threshold")]
    pub validity_threshold: f64,

    /// Domain vocabulary used to group headers without a bracketed suffix.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    /// Rows included in the sample sent to the external classifier.
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,

    /// Use structural grouping when the external classifier yields nothing.
    #[serde(default = "default_true")]
    pub fallback_to_structural: bool,

    /// Keep rating columns the external classifier left out as singleton groups.
    #[serde(default = "default_true")]
    pub recover_unassigned: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            validity_threshold: default_validity_threshold(),
            keywords: default_keywords(),
            sample_rows: default_sample_rows(),
            fallback_to_structural: true,
            recover_unassigned: true,
        }
    }
}

fn default_validity_threshold() -> f64 {
    0.8
}

fn default_keywords() -> Vec<String> {
    vec![
        "curriculum",
        "teaching",
        "faculty",
        "facilities",
        "infrastructure",
        "library",
        "laboratory",
        "placement",
        "administration",
        "examination",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_sample_rows() -> usize {
    5
}

/// Cohort partitioning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortConfig {
    /// Header names recognised as grouping columns, in priority order.
    #[serde(default = "default_grouping_aliases")]
    pub grouping_aliases: Vec<String>,

    /// Value label used for the overall cohort.
    #[serde(default = "default_overall_label")]
    pub overall_label: String,
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            grouping_aliases: default_grouping_aliases(),
            overall_label: default_overall_label(),
        }
    }
}

fn default_grouping_aliases() -> Vec<String> {
    vec!["branch", "department", "subject", "faculty", "class"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_overall_label() -> String {
    "All Respondents".to_string()
}

/// Document and chart settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Running header printed on every page.
    #[serde(default = "default_title")]
    pub title: String,

    /// Directory where rendered charts are kept for lookup.
    #[serde(default = "default_charts_dir")]
    pub charts_dir: String,

    /// Keep a run's charts after the archive is written.
    #[serde(default = "default_true")]
    pub keep_charts: bool,

    /// Header keywords that mark free-text feedback columns.
    #[serde(default = "default_feedback_keywords")]
    pub feedback_keywords: Vec<String>,

    /// Characters per line when wrapping chart axis labels.
    #[serde(default = "default_label_wrap_width")]
    pub label_wrap_width: usize,

    /// Maximum lines per chart axis label.
    #[serde(default = "default_label_max_lines")]
    pub label_max_lines: usize,

    /// Add a batch-level themes and action plan document.
    #[serde(default)]
    pub action_plan: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            charts_dir: default_charts_dir(),
            keep_charts: true,
            feedback_keywords: default_feedback_keywords(),
            label_wrap_width: default_label_wrap_width(),
            label_max_lines: default_label_max_lines(),
            action_plan: false,
        }
    }
}

fn default_title() -> String {
    "Ratings Report".to_string()
}

fn default_charts_dir() -> String {
    "feedback_catalyst/charts".to_string()
}

fn default_feedback_keywords() -> Vec<String> {
    vec!["suggestion", "comment", "feedback", "remark"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_label_wrap_width() -> usize {
    15
}

fn default_label_max_lines() -> usize {
    3
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were explicitly provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(ref model) = args.model {
            self.summarizer.model = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.summarizer.ollama_url = url.clone();
        }
        if let Some(timeout) = args.timeout {
            self.summarizer.timeout_seconds = timeout;
        }
        if args.no_ai {
            self.summarizer.enabled = false;
        }

        if let Some(threshold) = args.threshold {
            self.classifier.validity_threshold = threshold;
        }

        if let Some(ref aliases) = args.group_by {
            self.cohort.grouping_aliases = aliases.clone();
        }

        if let Some(ref dir) = args.charts_dir {
            self.report.charts_dir = dir.display().to_string();
        }
        if args.action_plan {
            self.report.action_plan = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
