//! Cohort partitioning.

use super::classifier::is_rating_column;
use crate::config::CohortConfig;
use crate::error::{PipelineError, Result};
use crate::models::{Choice, Cohort, Dataset};
use std::collections::HashMap;
use tracing::{debug, info};

/// Group name of the cohort covering every respondent.
pub const OVERALL_GROUP: &str = "Overall";

/// Find the grouping column for a dataset.
///
/// Aliases are tried in order. An exact (case-insensitive) header match on
/// any alias wins; otherwise the first header containing an alias as a whole
/// word is used, unless that column itself holds 1-5 ratings.
pub fn find_grouping_column<'a>(
    dataset: &'a Dataset,
    aliases: &[String],
    rating_threshold: f64,
) -> Option<&'a str> {
    grouping_index(dataset, aliases, rating_threshold).map(|idx| dataset.columns()[idx].as_str())
}

fn grouping_index(dataset: &Dataset, aliases: &[String], rating_threshold: f64) -> Option<usize> {
    let aliases: Vec<String> = aliases
        .iter()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .collect();
    let columns = dataset.columns();

    let exact = aliases.iter().find_map(|alias| {
        columns
            .iter()
            .position(|column| column.trim().to_lowercase() == *alias)
    });

    exact.or_else(|| {
        aliases.iter().find_map(|alias| {
            columns.iter().position(|column| {
                column
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .any(|word| word == alias)
                    && !is_rating_column(dataset, column, rating_threshold)
            })
        })
    })
}

fn overall(dataset: &Dataset, config: &CohortConfig) -> Cohort {
    Cohort {
        group: OVERALL_GROUP.to_string(),
        value: config.overall_label.clone(),
        rows: dataset.all_rows(),
    }
}

fn grouped(dataset: &Dataset, config: &CohortConfig, rating_threshold: f64) -> Result<Vec<Cohort>> {
    let idx = grouping_index(dataset, &config.grouping_aliases, rating_threshold).ok_or_else(|| {
        PipelineError::NoGroupingColumnFound {
            aliases: config.grouping_aliases.join(", "),
        }
    })?;
    let column = dataset.columns()[idx].as_str();

    debug!("Grouping {} by column '{}'", dataset.name, column);

    let mut cohorts: Vec<Cohort> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0usize;

    for row in dataset.all_rows() {
        let cell = dataset.cell(row, idx);
        if cell.is_missing() {
            skipped += 1;
            continue;
        }
        let value = cell.to_string().trim().to_string();
        if value.is_empty() {
            skipped += 1;
            continue;
        }

        match index.get(&value) {
            Some(&i) => cohorts[i].rows.push(row),
            None => {
                index.insert(value.clone(), cohorts.len());
                cohorts.push(Cohort {
                    group: column.to_string(),
                    value,
                    rows: vec![row],
                });
            }
        }
    }

    if skipped > 0 {
        debug!("{} row(s) have no '{}' value and join no group", skipped, column);
    }

    Ok(cohorts)
}

/// Split a dataset into the cohorts requested by `choice`.
///
/// Grouped modes fail with [`PipelineError::NoGroupingColumnFound`] rather
/// than quietly producing an overall report. `rating_threshold` is the
/// classifier's validity threshold, used to keep rating columns from being
/// picked as the grouping column.
pub fn partition(
    dataset: &Dataset,
    choice: Choice,
    config: &CohortConfig,
    rating_threshold: f64,
) -> Result<Vec<Cohort>> {
    let cohorts = match choice {
        Choice::Overall => vec![overall(dataset, config)],
        Choice::Grouped => grouped(dataset, config, rating_threshold)?,
        Choice::Both => {
            let mut cohorts = vec![overall(dataset, config)];
            cohorts.extend(grouped(dataset, config, rating_threshold)?);
            cohorts
        }
    };

    info!(
        "Partitioned {} into {} cohort(s)",
        dataset.name,
        cohorts.len()
    );
    Ok(cohorts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: f64 = 0.8;

    fn config() -> CohortConfig {
        CohortConfig::default()
    }

    fn branches() -> Dataset {
        Dataset::from_strs(
            &["Name", "Branch", "Teaching [Clarity]"],
            &[&["a", "CS", "5"], &["b", "CS", "4"], &["c", "IT", "3"]],
        )
    }

    #[test]
    fn test_overall_is_whole_dataset() {
        let ds = branches();
        let cohorts = partition(&ds, Choice::Overall, &config(), THRESHOLD).unwrap();
        assert_eq!(cohorts.len(), 1);
        assert_eq!(cohorts[0].group, OVERALL_GROUP);
        assert_eq!(cohorts[0].value, config().overall_label);
        assert_eq!(cohorts[0].rows, vec![0, 1, 2]);
    }

    #[test]
    fn test_grouped_scenario() {
        let ds = branches();
        let cohorts = partition(&ds, Choice::Grouped, &config(), THRESHOLD).unwrap();
        assert_eq!(cohorts.len(), 2);
        assert_eq!(cohorts[0].value, "CS");
        assert_eq!(cohorts[0].rows, vec![0, 1]);
        assert_eq!(cohorts[1].value, "IT");
        assert_eq!(cohorts[1].rows, vec![2]);
        assert_eq!(cohorts[0].title(), "Branch Feedback Report: CS");
    }

    #[test]
    fn test_grouped_partitions_rows_exactly() {
        let ds = Dataset::from_strs(
            &["Department"],
            &[&["Maths"], &["Physics"], &["Maths"], &["Chemistry"], &["Physics"]],
        );
        let cohorts = partition(&ds, Choice::Grouped, &config(), THRESHOLD).unwrap();

        let mut rows: Vec<usize> = cohorts.iter().flat_map(|c| c.rows.clone()).collect();
        rows.sort_unstable();
        assert_eq!(rows, ds.all_rows());

        let values: Vec<&str> = cohorts.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["Maths", "Physics", "Chemistry"]);
    }

    #[test]
    fn test_missing_group_values_are_excluded() {
        let ds = Dataset::from_strs(&["Class"], &[&["A"], &[""], &["A"]]);
        let cohorts = partition(&ds, Choice::Grouped, &config(), THRESHOLD).unwrap();
        assert_eq!(cohorts.len(), 1);
        assert_eq!(cohorts[0].rows, vec![0, 2]);
    }

    #[test]
    fn test_no_grouping_column_is_an_error() {
        let ds = Dataset::from_strs(&["Name", "Rating"], &[&["a", "5"]]);
        let err = partition(&ds, Choice::Grouped, &config(), THRESHOLD).unwrap_err();
        assert!(matches!(err, PipelineError::NoGroupingColumnFound { .. }));

        let err = partition(&ds, Choice::Both, &config(), THRESHOLD).unwrap_err();
        assert!(matches!(err, PipelineError::NoGroupingColumnFound { .. }));
    }

    #[test]
    fn test_both_is_overall_then_groups() {
        let ds = branches();
        let cohorts = partition(&ds, Choice::Both, &config(), THRESHOLD).unwrap();
        assert_eq!(cohorts.len(), 3);
        assert_eq!(cohorts[0].group, OVERALL_GROUP);
        assert_eq!(cohorts[1].value, "CS");
    }

    #[test]
    fn test_find_grouping_column() {
        let aliases = config().grouping_aliases;

        let ds = Dataset::from_strs(&["Your Department Name", "BRANCH"], &[]);
        assert_eq!(find_grouping_column(&ds, &aliases, THRESHOLD), Some("BRANCH"));

        let ds = Dataset::from_strs(&["Your Department Name", "Score"], &[]);
        assert_eq!(find_grouping_column(&ds, &aliases, THRESHOLD), Some("Your Department Name"));

        let ds = Dataset::from_strs(&["Classroom Comfort"], &[]);
        assert_eq!(find_grouping_column(&ds, &aliases, THRESHOLD), None);
    }

    #[test]
    fn test_aliases_are_tried_in_priority_order() {
        let aliases = vec!["department".to_string(), "branch".to_string()];
        let ds = Dataset::from_strs(&["Branch", "Department"], &[]);
        assert_eq!(find_grouping_column(&ds, &aliases, THRESHOLD), Some("Department"));

        let ds = Dataset::from_strs(&["Home Branch", "Department Name"], &[]);
        assert_eq!(find_grouping_column(&ds, &aliases, THRESHOLD), Some("Department Name"));
    }

    #[test]
    fn test_rating_column_is_never_the_grouping_column() {
        let ds = Dataset::from_strs(
            &["Faculty Knowledge", "Dept", "Library"],
            &[&["5", "CS", "4"], &["4", "CS", "3"], &["5", "IT", "2"]],
        );
        assert_eq!(find_grouping_column(&ds, &config().grouping_aliases, THRESHOLD), None);
        let err = partition(&ds, Choice::Grouped, &config(), THRESHOLD).unwrap_err();
        assert!(matches!(err, PipelineError::NoGroupingColumnFound { .. }));

        let ds = Dataset::from_strs(
            &["Faculty Knowledge", "Faculty Name"],
            &[&["5", "Dr. Rao"], &["4", "Dr. Iyer"], &["5", "Dr. Rao"]],
        );
        let cohorts = partition(&ds, Choice::Grouped, &config(), THRESHOLD).unwrap();
        assert_eq!(cohorts[0].group, "Faculty Name");
        assert_eq!(cohorts.len(), 2);
    }

    #[test]
    fn test_numeric_group_values() {
        let ds = Dataset::from_strs(&["Class"], &[&["10"], &["11"], &["10"]]);
        let cohorts = partition(&ds, Choice::Grouped, &config(), THRESHOLD).unwrap();
        assert_eq!(cohorts[0].value, "10");
        assert_eq!(cohorts[0].rows, vec![0, 2]);
    }
}
