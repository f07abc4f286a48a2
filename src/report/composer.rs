//! Document composition.
//!
//! One composer, parameterised by [`RenderMode`], assembles the sections of
//! a cohort's document from its distributions, charts and summaries.

use crate::models::{
    CategoryGroup, Cohort, Distribution, RenderMode, ReportDocument, Section, SummaryBlock,
};
use super::chart::ChartArtifact;
use chrono::{DateTime, Utc};

pub const SUMMARY_HEADING: &str = "Suggestion Summary";
pub const NO_RATING_DATA: &str =
    "No rating data: no column in this dataset holds 1-5 ratings, so no tables or charts are shown.";
pub const INSIGHTS_TITLE: &str = "Batch Insights";

/// Document-level settings shared by every cohort of a run.
#[derive(Debug, Clone)]
pub struct ComposeOptions {
    /// Running header, usually the configured report title.
    pub header: String,
    /// Input-derived prefix of the archive entry name.
    pub file_stem: String,
    pub mode: RenderMode,
    pub generated_at: DateTime<Utc>,
}

/// Compose one cohort's document.
///
/// `distributions` and `charts` run parallel to `groups`. Empty
/// distributions and missing charts are left out; a `None` summary means
/// the dataset has no free-text columns.
pub fn compose(
    cohort: &Cohort,
    groups: &[CategoryGroup],
    distributions: &[Distribution],
    charts: &[Option<ChartArtifact>],
    summary: Option<Vec<SummaryBlock>>,
    options: &ComposeOptions,
) -> ReportDocument {
    let mut sections = vec![Section::Title {
        text: cohort.title(),
        subtitle: Some(format!(
            "{} respondent(s) - generated {}",
            cohort.rows.len(),
            options.generated_at.format("%Y-%m-%d %H:%M UTC")
        )),
    }];

    if groups.is_empty() {
        sections.push(Section::Notice(NO_RATING_DATA.to_string()));
    }

    let mut tables = Vec::new();
    let mut chart_sections = Vec::new();

    for (i, group) in groups.iter().enumerate() {
        let Some(distribution) = distributions.get(i) else {
            continue;
        };
        if distribution.is_empty() {
            continue;
        }

        let table = Section::Table {
            category: group.name.clone(),
            distribution: distribution.clone(),
        };
        let chart = charts.get(i).cloned().flatten().map(|artifact| Section::Chart {
            category: group.name.clone(),
            artifact,
        });

        match options.mode {
            RenderMode::Inline => {
                sections.push(table);
                sections.extend(chart);
            }
            RenderMode::Collated => {
                tables.push(table);
                chart_sections.extend(chart);
            }
        }
    }

    sections.extend(tables);
    sections.extend(chart_sections);

    if let Some(blocks) = summary {
        if !blocks.is_empty() {
            sections.push(Section::Summary {
                heading: SUMMARY_HEADING.to_string(),
                blocks,
            });
        }
    }

    ReportDocument {
        header: options.header.clone(),
        file_stem: format!(
            "{}_{}_{}_{}",
            options.file_stem,
            options.mode.tag(),
            cohort.group,
            cohort.value
        ),
        mode: options.mode,
        generated_at: options.generated_at,
        sections,
    }
}

/// Compose the batch-wide themes and action plan document.
pub fn compose_insights(
    themes: &str,
    action_plan: &str,
    sources: usize,
    options: &ComposeOptions,
) -> ReportDocument {
    ReportDocument {
        header: options.header.clone(),
        file_stem: format!("{}_insights", options.file_stem),
        mode: options.mode,
        generated_at: options.generated_at,
        sections: vec![
            Section::Title {
                text: INSIGHTS_TITLE.to_string(),
                subtitle: Some(format!("Drawn from {} cohort summaries", sources)),
            },
            Section::Summary {
                heading: "Common Themes".to_string(),
                blocks: vec![SummaryBlock {
                    source: String::new(),
                    text: themes.to_string(),
                }],
            },
            Section::Summary {
                heading: "Action Plan".to_string(),
                blocks: vec![SummaryBlock {
                    source: String::new(),
                    text: action_plan.to_string(),
                }],
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregator::distribution_row;
    use crate::report::chart::{render, LabelWrap};

    fn options(mode: RenderMode) -> ComposeOptions {
        ComposeOptions {
            header: "Ratings Report".to_string(),
            file_stem: "survey".to_string(),
            mode,
            generated_at: Utc::now(),
        }
    }

    fn cohort() -> Cohort {
        Cohort {
            group: "Branch".to_string(),
            value: "CS".to_string(),
            rows: vec![0, 1],
        }
    }

    fn fixture() -> (Vec<CategoryGroup>, Vec<Distribution>, Vec<Option<ChartArtifact>>) {
        let groups = vec![
            CategoryGroup::new("Teaching", vec!["t".to_string()]),
            CategoryGroup::new("Library", vec!["l".to_string()]),
            CategoryGroup::new("Hostel", vec!["h".to_string()]),
        ];
        let distributions = vec![
            Distribution {
                category: "Teaching".into(),
                rows: vec![distribution_row("t".into(), "t".into(), [0, 0, 1, 1, 0])],
            },
            Distribution {
                category: "Library".into(),
                rows: vec![distribution_row("l".into(), "l".into(), [0; 5])],
            },
            Distribution {
                category: "Hostel".into(),
                rows: vec![distribution_row("h".into(), "h".into(), [2, 0, 0, 0, 0])],
            },
        ];
        let charts = distributions
            .iter()
            .map(|d| render(d, &d.category, format!("{}.svg", d.category), LabelWrap::default()))
            .collect();
        (groups, distributions, charts)
    }

    fn kinds(doc: &ReportDocument) -> Vec<String> {
        doc.sections
            .iter()
            .map(|s| match s {
                Section::Title { .. } => "title".to_string(),
                Section::Table { category, .. } => format!("table:{}", category),
                Section::Chart { category, .. } => format!("chart:{}", category),
                Section::Summary { .. } => "summary".to_string(),
                Section::Notice(_) => "notice".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_collated_layout() {
        let (groups, dists, charts) = fixture();
        let doc = compose(&cohort(), &groups, &dists, &charts, None, &options(RenderMode::Collated));
        assert_eq!(
            kinds(&doc),
            vec!["title", "table:Teaching", "table:Hostel", "chart:Teaching", "chart:Hostel"]
        );
        assert_eq!(doc.file_stem, "survey_structural_Branch_CS");
    }

    #[test]
    fn test_inline_layout() {
        let (groups, dists, charts) = fixture();
        let summary = vec![SummaryBlock {
            source: "Suggestions".to_string(),
            text: "More labs".to_string(),
        }];
        let doc = compose(
            &cohort(),
            &groups,
            &dists,
            &charts,
            Some(summary),
            &options(RenderMode::Inline),
        );
        assert_eq!(
            kinds(&doc),
            vec![
                "title",
                "table:Teaching",
                "chart:Teaching",
                "table:Hostel",
                "chart:Hostel",
                "summary"
            ]
        );
        assert_eq!(doc.summary_blocks().len(), 1);
        assert_eq!(doc.file_stem, "survey_classifier_Branch_CS");
    }

    #[test]
    fn test_empty_distribution_is_skipped_without_chart() {
        let (groups, dists, charts) = fixture();
        assert!(charts[1].is_none());
        let doc = compose(&cohort(), &groups, &dists, &charts, None, &options(RenderMode::Inline));
        assert_eq!(doc.charts().count(), 2);
        assert_eq!(doc.tables().count(), 2);
    }

    #[test]
    fn test_no_groups_gives_notice() {
        let doc = compose(&cohort(), &[], &[], &[], None, &options(RenderMode::Collated));
        assert_eq!(kinds(&doc), vec!["title", "notice"]);
    }

    #[test]
    fn test_empty_summary_is_omitted() {
        let (groups, dists, charts) = fixture();
        let doc = compose(
            &cohort(),
            &groups,
            &dists,
            &charts,
            Some(vec![]),
            &options(RenderMode::Collated),
        );
        assert!(doc.summary_blocks().is_empty());
    }

    #[test]
    fn test_insights_document() {
        let doc = compose_insights("themes", "plan", 3, &options(RenderMode::Collated));
        assert_eq!(doc.file_stem, "survey_insights");
        let texts: Vec<&str> = doc.summary_blocks().iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["themes", "plan"]);
    }
}
