//! Rating aggregation and statistics.
//!
//! Turns the rating columns of one category group, restricted to one cohort's
//! rows, into per-column counts and percentages.

use super::classifier::display_label;
use crate::models::{
    CategoryGroup, Dataset, Distribution, DistributionRow, RenderMode, SCALE_LEN, SCALE_MIN,
};

/// Round to two decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Count ratings of one column over the given rows.
///
/// Non-numeric, fractional and out-of-scale values are ignored.
pub fn count_column(dataset: &Dataset, rows: &[usize], column: &str) -> [u32; SCALE_LEN] {
    let mut counts = [0u32; SCALE_LEN];
    let Some(idx) = dataset.column_index(column) else {
        return counts;
    };

    for cell in dataset.column_cells(idx, rows) {
        if let Some(rating) = cell.rating() {
            counts[(rating - SCALE_MIN) as usize] += 1;
        }
    }

    counts
}

/// Build a distribution row from raw counts.
pub fn distribution_row(label: String, column: String, counts: [u32; SCALE_LEN]) -> DistributionRow {
    let total: u32 = counts.iter().sum();
    let mut percents = [0.0; SCALE_LEN];
    if total > 0 {
        for (pct, &count) in percents.iter_mut().zip(counts.iter()) {
            *pct = round2(count as f64 * 100.0 / total as f64);
        }
    }

    DistributionRow {
        label,
        column,
        counts,
        total,
        percents,
    }
}

/// Aggregate one category group over a row subset.
///
/// Rows come out in the group's column order. An empty column set gives an
/// empty distribution.
pub fn aggregate(
    dataset: &Dataset,
    rows: &[usize],
    group: &CategoryGroup,
    mode: RenderMode,
) -> Distribution {
    let rows = group
        .columns
        .iter()
        .map(|column| {
            let counts = count_column(dataset, rows, column);
            distribution_row(display_label(column, mode), column.clone(), counts)
        })
        .collect();

    Distribution {
        category: group.name.clone(),
        rows,
    }
}

/// Aggregate every group for one cohort.
pub fn aggregate_all(
    dataset: &Dataset,
    rows: &[usize],
    groups: &[CategoryGroup],
    mode: RenderMode,
) -> Vec<Distribution> {
    groups
        .iter()
        .map(|g| aggregate(dataset, rows, g, mode))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teaching() -> CategoryGroup {
        CategoryGroup::new(
            "Teaching",
            vec!["Teaching [Clarity]".to_string(), "Teaching [Pace]".to_string()],
        )
    }

    fn dataset() -> Dataset {
        Dataset::from_strs(
            &["Teaching [Clarity]", "Teaching [Pace]", "Comment"],
            &[
                &["5", "4", "ok"],
                &["5", "2", ""],
                &["4", "x", ""],
                &["1", "7", ""],
                &["", "2.5", ""],
                &["3", "3", ""],
            ],
        )
    }

    #[test]
    fn test_counts_ignore_invalid_values() {
        let ds = dataset();
        let counts = count_column(&ds, &ds.all_rows(), "Teaching [Pace]");
        assert_eq!(counts, [0, 1, 1, 1, 0]);
        assert_eq!(count_column(&ds, &ds.all_rows(), "Missing"), [0; SCALE_LEN]);
    }

    #[test]
    fn test_aggregate_rows_and_labels() {
        let ds = dataset();
        let dist = aggregate(&ds, &ds.all_rows(), &teaching(), RenderMode::Collated);

        assert_eq!(dist.category, "Teaching");
        assert_eq!(dist.rows.len(), 2);

        let clarity = &dist.rows[0];
        assert_eq!(clarity.label, "Clarity");
        assert_eq!(clarity.column, "Teaching [Clarity]");
        assert_eq!(clarity.counts, [1, 0, 1, 1, 2]);
        assert_eq!(clarity.total, 5);
        assert_eq!(clarity.percent(5), 40.0);
        assert_eq!(clarity.percent(2), 0.0);

        let inline = aggregate(&ds, &ds.all_rows(), &teaching(), RenderMode::Inline);
        assert_eq!(inline.rows[1].label, "Teaching [Pace]");
    }

    #[test]
    fn test_percentages_sum_to_hundred() {
        let ds = Dataset::from_strs(
            &["Q"],
            &[&["1"], &["2"], &["2"], &["3"], &["3"], &["3"], &["5"]],
        );
        let group = CategoryGroup::new("Q", vec!["Q".to_string()]);
        let dist = aggregate(&ds, &ds.all_rows(), &group, RenderMode::Inline);
        let row = &dist.rows[0];

        assert_eq!(row.total, 7);
        assert_eq!(row.percent(1), 14.29);
        assert_eq!(row.percent(3), 42.86);
        for pct in row.percents {
            assert!((0.0..=100.0).contains(&pct));
        }
        let sum: f64 = row.percents.iter().sum();
        assert!((sum - 100.0).abs() < 0.05, "sum was {}", sum);
    }

    #[test]
    fn test_zero_total_never_divides() {
        let ds = Dataset::from_strs(&["Q"], &[&["bad"], &["9"], &[""]]);
        let group = CategoryGroup::new("Q", vec!["Q".to_string()]);
        let dist = aggregate(&ds, &ds.all_rows(), &group, RenderMode::Inline);

        assert_eq!(dist.rows[0].total, 0);
        assert_eq!(dist.rows[0].percents, [0.0; SCALE_LEN]);
        assert!(dist.is_empty());
    }

    #[test]
    fn test_empty_column_set() {
        let ds = dataset();
        let group = CategoryGroup::new("Nothing", vec![]);
        let dist = aggregate(&ds, &ds.all_rows(), &group, RenderMode::Collated);
        assert!(dist.rows.is_empty());
        assert!(dist.is_empty());
    }

    #[test]
    fn test_row_subset_and_idempotence() {
        let ds = dataset();
        let first = aggregate(&ds, &[0, 1], &teaching(), RenderMode::Collated);
        let second = aggregate(&ds, &[0, 1], &teaching(), RenderMode::Collated);

        assert_eq!(first, second);
        assert_eq!(first.rows[0].counts, [0, 0, 0, 0, 2]);
        assert_eq!(first.rows[0].percent(5), 100.0);
    }

    #[test]
    fn test_aggregate_all_keeps_group_order() {
        let ds = dataset();
        let groups = vec![
            CategoryGroup::new("Pace", vec!["Teaching [Pace]".to_string()]),
            CategoryGroup::new("Clarity", vec!["Teaching [Clarity]".to_string()]),
        ];
        let all = aggregate_all(&ds, &ds.all_rows(), &groups, RenderMode::Inline);
        let names: Vec<&str> = all.iter().map(|d| d.category.as_str()).collect();
        assert_eq!(names, vec!["Pace", "Clarity"]);
    }
}
