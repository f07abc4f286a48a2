//! Data models for the report pipeline.
//!
//! This module contains the core data structures shared by every stage:
//! the immutable dataset, category groups, cohorts, rating distributions
//! and the composed report documents.

use crate::report::chart::ChartArtifact;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Lowest value on the rating scale.
pub const SCALE_MIN: u8 = 1;
/// Highest value on the rating scale.
pub const SCALE_MAX: u8 = 5;
/// Number of points on the rating scale.
pub const SCALE_LEN: usize = (SCALE_MAX - SCALE_MIN + 1) as usize;

/// A single spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    Missing,
}

impl Cell {
    /// Parse raw text the way a spreadsheet would: blanks and the usual
    /// "not available" markers are missing, numeric text becomes a number.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Missing;
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "na" | "n/a" | "nan" | "null" | "none" | "-" => return Cell::Missing,
            _ => {}
        }

        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Cell::Number(n),
            _ => Cell::Text(trimmed.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    /// Numeric value of the cell, if any.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The rating this cell holds, if it is a whole number on the 1-5 scale.
    pub fn rating(&self) -> Option<u8> {
        let n = self.as_number()?;
        if n.fract() != 0.0 {
            return None;
        }
        if n >= SCALE_MIN as f64 && n <= SCALE_MAX as f64 {
            Some(n as u8)
        } else {
            None
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Missing => Ok(()),
        }
    }
}

/// An immutable table of survey responses read from one input file.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Display name, usually the input file stem.
    pub name: String,
    /// Hex SHA-256 of the input bytes (empty for in-memory datasets).
    pub digest: String,
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Dataset {
    /// Build a dataset, making header names unique and padding short rows.
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let columns = unique_headers(headers);
        let width = columns.len();

        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Missing);
                row
            })
            .collect();

        Self {
            name: name.into(),
            digest: String::new(),
            columns,
            rows,
        }
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = digest.into();
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        &self.rows[row][col]
    }

    /// Indices of every row, in file order.
    pub fn all_rows(&self) -> Vec<usize> {
        (0..self.rows.len()).collect()
    }

    /// Cells of one column restricted to the given rows.
    pub fn column_cells<'a>(
        &'a self,
        col: usize,
        rows: &'a [usize],
    ) -> impl Iterator<Item = &'a Cell> + 'a {
        rows.iter().map(move |&r| &self.rows[r][col])
    }

    /// Short run-scoped identifier derived from the input digest.
    pub fn run_id(&self) -> &str {
        let end = self.digest.len().min(8);
        &self.digest[..end]
    }
}

/// Make header names unique the way spreadsheet tools do (`Name`, `Name.1`).
fn unique_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut result = Vec::with_capacity(headers.len());

    for (i, header) in headers.into_iter().enumerate() {
        let base = match header.trim() {
            "" => format!("Unnamed: {}", i),
            trimmed => trimmed.to_string(),
        };

        let mut candidate = base.clone();
        let mut n = 1;
        while seen.contains(&candidate) {
            candidate = format!("{}.{}", base, n);
            n += 1;
        }

        seen.insert(candidate.clone());
        result.push(candidate);
    }

    result
}

/// Which cohorts to produce documents for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Choice {
    /// One document over every respondent
    #[default]
    Overall,
    /// One document per value of the detected grouping column
    Grouped,
    /// The overall document followed by one per group
    Both,
}

/// How rating columns are assigned to categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    /// Group by bracketed header suffix and keyword vocabulary
    #[default]
    #[value(alias = "stakeholder")]
    Structural,
    /// Ask the external summarizer for a column-to-category mapping
    #[value(alias = "subject")]
    Classifier,
}

impl fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackType::Structural => write!(f, "structural"),
            FeedbackType::Classifier => write!(f, "classifier"),
        }
    }
}

/// Presentation variant of the document composer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderMode {
    /// Tables first, charts collated after them; rows labelled by bracket text.
    Collated,
    /// Each chart directly after its table; rows labelled by full header.
    Inline,
}

impl RenderMode {
    /// Name of the feedback type this mode renders, used in file names.
    pub fn tag(&self) -> &'static str {
        match self {
            RenderMode::Collated => "structural",
            RenderMode::Inline => "classifier",
        }
    }
}

impl From<FeedbackType> for RenderMode {
    fn from(feedback_type: FeedbackType) -> Self {
        match feedback_type {
            FeedbackType::Structural => RenderMode::Collated,
            FeedbackType::Classifier => RenderMode::Inline,
        }
    }
}

/// A named cluster of rating columns reported together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub name: String,
    pub columns: Vec<String>,
}

impl CategoryGroup {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }
}

/// How complete a classification pass was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationOutcome {
    /// Every rating column landed in a group.
    Complete,
    /// Some rating columns were left out by the classifier.
    Partial,
    /// No group survived.
    Empty,
}

/// Result of one classification pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub groups: Vec<CategoryGroup>,
    /// Rating columns the classifier did not assign (before any recovery).
    pub unassigned: Vec<String>,
    pub outcome: ClassificationOutcome,
    /// True when the external classifier failed and structural grouping was used.
    pub fell_back: bool,
}

impl Classification {
    pub fn column_count(&self) -> usize {
        self.groups.iter().map(|g| g.columns.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// A named subset of respondents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cohort {
    /// "Overall" or the grouping column's header.
    pub group: String,
    /// Respondent label or the grouping value.
    pub value: String,
    /// Row indices into the dataset.
    pub rows: Vec<usize>,
}

impl Cohort {
    pub fn title(&self) -> String {
        format!("{} Feedback Report: {}", self.group, self.value)
    }
}

/// Counts and percentages for one source column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionRow {
    /// Row label shown in tables and on the chart axis.
    pub label: String,
    /// Source column header.
    pub column: String,
    /// Counts indexed by rating - 1.
    pub counts: [u32; SCALE_LEN],
    pub total: u32,
    /// Percentages indexed by rating - 1, rounded to two decimals.
    pub percents: [f64; SCALE_LEN],
}

impl DistributionRow {
    pub fn count(&self, rating: u8) -> u32 {
        self.counts[(rating - SCALE_MIN) as usize]
    }

    pub fn percent(&self, rating: u8) -> f64 {
        self.percents[(rating - SCALE_MIN) as usize]
    }
}

/// Rating breakdown of one category group within one cohort.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Distribution {
    pub category: String,
    pub rows: Vec<DistributionRow>,
}

impl Distribution {
    /// True when there is nothing to draw: no rows, or no valid responses at all.
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.total == 0)
    }
}

/// One free-text summary, attributed to its source column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryBlock {
    pub source: String,
    pub text: String,
}

/// A section of a report document.
#[derive(Debug, Clone)]
pub enum Section {
    Title { text: String, subtitle: Option<String> },
    Table { category: String, distribution: Distribution },
    Chart { category: String, artifact: ChartArtifact },
    Summary { heading: String, blocks: Vec<SummaryBlock> },
    Notice(String),
}

/// A composed, paginatable document owned by one cohort.
#[derive(Debug, Clone)]
pub struct ReportDocument {
    /// Running header printed on every page.
    pub header: String,
    /// Archive entry stem, not yet sanitized.
    pub file_stem: String,
    pub mode: RenderMode,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<Section>,
}

impl ReportDocument {
    pub fn charts(&self) -> impl Iterator<Item = &ChartArtifact> {
        self.sections.iter().filter_map(|s| match s {
            Section::Chart { artifact, .. } => Some(artifact),
            _ => None,
        })
    }

    pub fn tables(&self) -> impl Iterator<Item = &Distribution> {
        self.sections.iter().filter_map(|s| match s {
            Section::Table { distribution, .. } => Some(distribution),
            _ => None,
        })
    }

    pub fn summary_blocks(&self) -> Vec<&SummaryBlock> {
        self.sections
            .iter()
            .filter_map(|s| match s {
                Section::Summary { blocks, .. } => Some(blocks.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

#[cfg(test)]
impl Dataset {
    /// Build a dataset from string literals, parsing each cell.
    pub fn from_strs(headers: &[&str], rows: &[&[&str]]) -> Self {
        Dataset::new(
            "test",
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|raw| Cell::parse(raw)).collect())
                .collect(),
        )
    }
}
