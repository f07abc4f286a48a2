//! Report generation.
//!
//! Charts, page layout, document composition and PDF serialization.

pub mod chart;
pub mod composer;
pub mod layout;
pub mod pdf;

use crate::error::Result;
use crate::models::ReportDocument;

pub use chart::{ChartArtifact, LabelWrap};
pub use composer::{compose, compose_insights, ComposeOptions};
pub use pdf::PdfWriter;

/// Turns a composed document into file bytes.
pub trait DocumentWriter: Send + Sync {
    /// File extension of the produced documents, without the dot.
    fn extension(&self) -> &str;

    fn write(&self, document: &ReportDocument) -> Result<Vec<u8>>;
}
