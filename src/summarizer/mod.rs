//! External summarizer collaborator.
//!
//! The pipeline only ever talks to the summarizer through [`GuardedSummarizer`],
//! which bounds every call with a timeout and turns any failure into a fixed
//! fallback value. Nothing downstream has to handle summarizer errors.

pub mod ollama;

#[cfg(test)]
pub mod fake;

use crate::config::SummarizerConfig;
use crate::error::PipelineError;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub use ollama::OllamaSummarizer;

/// Returned by `summarize` when the collaborator is unavailable.
pub const SUMMARY_FALLBACK: &str = "Summary could not be generated.";
/// Returned by `find_common_themes` when the collaborator is unavailable.
pub const THEMES_FALLBACK: &str = "Common themes could not be identified.";
/// Returned by `propose_action_plan` when the collaborator is unavailable.
pub const ACTION_PLAN_FALLBACK: &str = "An action plan could not be generated.";

/// Errors raised by a summarizer backend.
#[derive(Debug, Error)]
pub enum SummarizerError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("cannot connect to {0}")]
    Connect(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("unparsable response: {0}")]
    Parse(String),

    #[error("summarizer disabled")]
    Disabled,
}

pub type SummarizerFuture<'a, T> = BoxFuture<'a, Result<T, SummarizerError>>;

/// The four operations the pipeline needs from a text-generation service.
pub trait Summarizer: Send + Sync {
    /// Short backend description for logs.
    fn name(&self) -> &str;

    /// Prose summary of a block of free-text responses.
    fn summarize<'a>(&'a self, text_block: &'a str) -> SummarizerFuture<'a, String>;

    /// Column header to category name mapping for a sample of the dataset.
    fn classify_columns<'a>(
        &'a self,
        sample: &'a str,
    ) -> SummarizerFuture<'a, HashMap<String, String>>;

    /// Themes shared by several summaries.
    fn find_common_themes<'a>(&'a self, summaries: &'a [String]) -> SummarizerFuture<'a, String>;

    /// Concrete actions addressing the given themes.
    fn propose_action_plan<'a>(&'a self, themes: &'a str) -> SummarizerFuture<'a, String>;
}

/// Backend used when the summarizer is turned off. Every call fails, so
/// every caller gets its fallback value.
pub struct DisabledSummarizer;

impl Summarizer for DisabledSummarizer {
    fn name(&self) -> &str {
        "disabled"
    }

    fn summarize<'a>(&'a self, _text_block: &'a str) -> SummarizerFuture<'a, String> {
        Box::pin(async { Err(SummarizerError::Disabled) })
    }

    fn classify_columns<'a>(
        &'a self,
        _sample: &'a str,
    ) -> SummarizerFuture<'a, HashMap<String, String>> {
        Box::pin(async { Err(SummarizerError::Disabled) })
    }

    fn find_common_themes<'a>(&'a self, _summaries: &'a [String]) -> SummarizerFuture<'a, String> {
        Box::pin(async { Err(SummarizerError::Disabled) })
    }

    fn propose_action_plan<'a>(&'a self, _themes: &'a str) -> SummarizerFuture<'a, String> {
        Box::pin(async { Err(SummarizerError::Disabled) })
    }
}

/// Timeout-bounded, never-failing front for a [`Summarizer`].
#[derive(Clone)]
pub struct GuardedSummarizer {
    inner: Arc<dyn Summarizer>,
    timeout: Duration,
}

impl GuardedSummarizer {
    pub fn new(inner: Arc<dyn Summarizer>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledSummarizer), Duration::from_secs(1))
    }

    /// Build the production summarizer described by the configuration.
    ///
    /// A backend that cannot even be constructed is logged and replaced by
    /// the disabled one; the run still completes with placeholder text.
    pub fn from_config(config: &SummarizerConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_seconds);

        if !config.enabled {
            debug!("Summarizer disabled by configuration");
            return Self::new(Arc::new(DisabledSummarizer), timeout);
        }

        match OllamaSummarizer::new(config) {
            Ok(backend) => Self::new(Arc::new(backend), timeout),
            Err(e) => {
                warn!("Summarizer unavailable, using placeholders: {}", e);
                Self::new(Arc::new(DisabledSummarizer), timeout)
            }
        }
    }

    pub fn backend_name(&self) -> &str {
        self.inner.name()
    }

    async fn guard<T>(
        &self,
        operation: &str,
        call: SummarizerFuture<'_, T>,
    ) -> Result<T, PipelineError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(PipelineError::ExternalServiceUnavailable(format!(
                "{} via {}: {}",
                operation,
                self.inner.name(),
                e
            ))),
            Err(_) => Err(PipelineError::ExternalServiceUnavailable(format!(
                "{} via {} timed out after {:.1}s",
                operation,
                self.inner.name(),
                self.timeout.as_secs_f64()
            ))),
        }
    }

    /// Summarize free-text responses, or [`SUMMARY_FALLBACK`].
    pub async fn summarize(&self, text_block: &str) -> String {
        match self.guard("summarize", self.inner.summarize(text_block)).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("Summarizer returned an empty summary");
                SUMMARY_FALLBACK.to_string()
            }
            Err(e) => {
                warn!("{}", e);
                SUMMARY_FALLBACK.to_string()
            }
        }
    }

    /// Ask for a column-to-category mapping, or an empty mapping.
    pub async fn classify_columns(&self, sample: &str) -> HashMap<String, String> {
        match self
            .guard("classify_columns", self.inner.classify_columns(sample))
            .await
        {
            Ok(mapping) => mapping,
            Err(e) => {
                warn!("{}", e);
                HashMap::new()
            }
        }
    }

    /// Common themes across summaries, or [`THEMES_FALLBACK`].
    pub async fn find_common_themes(&self, summaries: &[String]) -> String {
        match self
            .guard("find_common_themes", self.inner.find_common_themes(summaries))
            .await
        {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => THEMES_FALLBACK.to_string(),
            Err(e) => {
                warn!("{}", e);
                THEMES_FALLBACK.to_string()
            }
        }
    }

    /// Action plan for the given themes, or [`ACTION_PLAN_FALLBACK`].
    pub async fn propose_action_plan(&self, themes: &str) -> String {
        match self
            .guard("propose_action_plan", self.inner.propose_action_plan(themes))
            .await
        {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => ACTION_PLAN_FALLBACK.to_string(),
            Err(e) => {
                warn!("{}", e);
                ACTION_PLAN_FALLBACK.to_string()
            }
        }
    }
}
