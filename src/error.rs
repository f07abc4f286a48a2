//! Error taxonomy for the report pipeline.
//!
//! Only `UnreadableInput` and `NoGroupingColumnFound` are meant to reach the
//! user as failures. The other variants are recovered close to where they
//! happen and show up as log lines or placeholder content.

use thiserror::Error;

/// Errors raised while turning a survey export into report documents.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Neither the spreadsheet nor the delimited-text parser could read the file.
    #[error("Unreadable input '{path}': {reason}")]
    UnreadableInput { path: String, reason: String },

    /// Classification produced zero category groups.
    #[error("No qualifying rating columns found in '{0}'")]
    NoQualifyingColumns(String),

    /// Grouped cohorts were requested but no column matched a grouping alias.
    #[error("Grouped report requested but no grouping column was found (looked for: {aliases})")]
    NoGroupingColumnFound { aliases: String },

    /// The external summarizer timed out, errored, or returned garbage.
    #[error("External service unavailable: {0}")]
    ExternalServiceUnavailable(String),

    /// A single document or chart could not be rendered or written.
    #[error("Failed to write artifact '{name}': {reason}")]
    ArtifactWriteFailure { name: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl PipelineError {
    pub fn unreadable(path: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::UnreadableInput {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn artifact(name: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::ArtifactWriteFailure {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error must be surfaced to the caller instead of being
    /// recovered locally.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            PipelineError::UnreadableInput { .. } | PipelineError::NoGroupingColumnFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
