//! Column classification.
//!
//! Decides which dataset columns hold 1-5 ratings and which category each
//! belongs to. Structural classification reads the headers; external
//! classification asks the summarizer and treats its answer as untrusted.

use crate::config::ClassifierConfig;
use crate::models::{
    CategoryGroup, Classification, ClassificationOutcome, Dataset, FeedbackType, RenderMode,
};
use crate::summarizer::GuardedSummarizer;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

fn bracket_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^([^\[]*)\[([^\]]+)\]").ok())
        .as_ref()
}

/// Split `"Prefix [Suffix]"` into its trimmed parts.
pub fn split_bracketed(header: &str) -> Option<(&str, &str)> {
    let caps = bracket_pattern()?.captures(header.trim())?;
    let prefix = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
    let suffix = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
    if suffix.is_empty() {
        return None;
    }
    Some((prefix, suffix))
}

/// Label a column's row in tables and charts.
pub fn display_label(column: &str, mode: RenderMode) -> String {
    match mode {
        RenderMode::Collated => split_bracketed(column)
            .map(|(_, suffix)| suffix.to_string())
            .unwrap_or_else(|| column.to_string()),
        RenderMode::Inline => column.to_string(),
    }
}

/// Fraction of non-missing values that are whole numbers on the 1-5 scale.
///
/// `None` when the column has no values at all.
pub fn validity_ratio(dataset: &Dataset, column: &str) -> Option<f64> {
    let idx = dataset.column_index(column)?;
    let rows = dataset.all_rows();

    let mut present = 0usize;
    let mut in_scale = 0usize;
    for cell in dataset.column_cells(idx, &rows) {
        if cell.is_missing() {
            continue;
        }
        present += 1;
        if cell.rating().is_some() {
            in_scale += 1;
        }
    }

    if present == 0 {
        None
    } else {
        Some(in_scale as f64 / present as f64)
    }
}

/// Whether a column qualifies as a rating column.
pub fn is_rating_column(dataset: &Dataset, column: &str, threshold: f64) -> bool {
    validity_ratio(dataset, column).is_some_and(|ratio| ratio >= threshold)
}

/// Category name for a header under structural classification.
fn structural_category(header: &str, keywords: &[String]) -> String {
    if let Some((prefix, _)) = split_bracketed(header) {
        if !prefix.is_empty() {
            return prefix.to_string();
        }
    }

    let lower = header.to_lowercase();
    keywords
        .iter()
        .find(|k| !k.is_empty() && lower.contains(&k.to_lowercase()))
        .map(|k| title_case(k))
        .unwrap_or_else(|| header.trim().to_string())
}

fn title_case(word: &str) -> String {
    let mut chars = word.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

/// Accumulates groups in first-seen order.
#[derive(Default)]
struct GroupBuilder {
    groups: Vec<CategoryGroup>,
    index: HashMap<String, usize>,
    assigned: HashSet<String>,
}

impl GroupBuilder {
    fn push(&mut self, category: &str, column: &str) {
        if !self.assigned.insert(column.to_string()) {
            return;
        }
        match self.index.get(category) {
            Some(&i) => self.groups[i].columns.push(column.to_string()),
            None => {
                self.index.insert(category.to_string(), self.groups.len());
                self.groups
                    .push(CategoryGroup::new(category, vec![column.to_string()]));
            }
        }
    }

    fn finish(self) -> Vec<CategoryGroup> {
        self.groups
    }
}

/// Group rating columns by bracketed prefix, keyword, or as singletons.
pub fn classify_structural(dataset: &Dataset, config: &ClassifierConfig) -> Classification {
    let mut builder = GroupBuilder::default();

    for column in dataset.columns() {
        if !is_rating_column(dataset, column, config.validity_threshold) {
            debug!("Column '{}' is not a rating column", column);
            continue;
        }
        let category = structural_category(column, &config.keywords);
        builder.push(&category, column);
    }

    let groups = builder.finish();
    let outcome = if groups.is_empty() {
        ClassificationOutcome::Empty
    } else {
        ClassificationOutcome::Complete
    };

    Classification {
        groups,
        unassigned: Vec::new(),
        outcome,
        fell_back: false,
    }
}

/// Render the first rows of the dataset as CSV text for the classifier prompt.
pub fn sample_text(dataset: &Dataset, rows: usize) -> String {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let _ = writer.write_record(dataset.columns());

    let take: Vec<usize> = dataset.all_rows().into_iter().take(rows).collect();
    for &row in &take {
        let record: Vec<String> = (0..dataset.columns().len())
            .map(|col| dataset.cell(row, col).to_string())
            .collect();
        let _ = writer.write_record(&record);
    }

    writer
        .into_inner()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Build groups from an externally produced column-to-category mapping.
///
/// Mapped columns that do not exist or fail the rating test are discarded.
/// Rating columns the mapping leaves out are reported as `unassigned` and,
/// if configured, kept as singleton groups.
pub fn classify_from_mapping(
    dataset: &Dataset,
    mapping: &HashMap<String, String>,
    config: &ClassifierConfig,
) -> Classification {
    let unknown = mapping.keys().filter(|c| !dataset.has_column(c)).count();
    if unknown > 0 {
        warn!("Discarded {} classifier columns not present in the dataset", unknown);
    }

    let mut builder = GroupBuilder::default();
    let mut unassigned = Vec::new();

    for column in dataset.columns() {
        let is_rating = is_rating_column(dataset, column, config.validity_threshold);
        match mapping.get(column) {
            Some(category) if is_rating => {
                let category = category.trim();
                let category = if category.is_empty() { column.as_str() } else { category };
                builder.push(category, column);
            }
            Some(_) => debug!("Classifier mapped non-rating column '{}', discarded", column),
            None if is_rating => unassigned.push(column.clone()),
            None => {}
        }
    }

    let mut groups = builder.finish();
    if groups.is_empty() {
        return Classification {
            groups,
            unassigned,
            outcome: ClassificationOutcome::Empty,
            fell_back: false,
        };
    }

    let outcome = if unassigned.is_empty() {
        ClassificationOutcome::Complete
    } else {
        warn!(
            "Classifier left {} rating column(s) unassigned: {}",
            unassigned.len(),
            unassigned.join(", ")
        );
        ClassificationOutcome::Partial
    };

    if config.recover_unassigned {
        for column in &unassigned {
            groups.push(CategoryGroup::new(column.clone(), vec![column.clone()]));
        }
    }

    Classification {
        groups,
        unassigned,
        outcome,
        fell_back: false,
    }
}

/// Classify a dataset with the strategy selected by the feedback type.
pub async fn classify(
    dataset: &Dataset,
    feedback_type: FeedbackType,
    config: &ClassifierConfig,
    summarizer: &GuardedSummarizer,
) -> Classification {
    let classification = match feedback_type {
        FeedbackType::Structural => classify_structural(dataset, config),
        FeedbackType::Classifier => {
            let sample = sample_text(dataset, config.sample_rows);
            let mapping = summarizer.classify_columns(&sample).await;
            let external = classify_from_mapping(dataset, &mapping, config);

            if external.outcome == ClassificationOutcome::Empty && config.fallback_to_structural {
                warn!(
                    "External classifier produced no groups for {}; using structural grouping",
                    dataset.name
                );
                let mut structural = classify_structural(dataset, config);
                structural.fell_back = true;
                structural
            } else {
                external
            }
        }
    };

    info!(
        "Classified {}: {} group(s), {} rating column(s), outcome {:?}",
        dataset.name,
        classification.groups.len(),
        classification.column_count(),
        classification.outcome
    );

    classification
}

/// Free-text feedback columns: non-rating columns whose header contains a
/// feedback keyword.
pub fn feedback_columns(
    dataset: &Dataset,
    keywords: &[String],
    classification: &Classification,
) -> Vec<String> {
    let rating: HashSet<&String> = classification
        .groups
        .iter()
        .flat_map(|g| g.columns.iter())
        .collect();

    dataset
        .columns()
        .iter()
        .filter(|c| !rating.contains(c))
        .filter(|c| {
            let lower = c.to_lowercase();
            keywords.iter().any(|k| lower.contains(&k.to_lowercase()))
        })
        .cloned()
        .collect()
}
