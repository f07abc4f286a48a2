//! Per-file pipeline and batch orchestration.
//!
//! classify -> partition -> (aggregate -> render) per cohort and category ->
//! compose -> package. Every collaborator comes in through
//! [`PipelineContext`], so tests can swap in fakes.

use crate::analysis::{aggregate_all, classify, feedback_columns, find_grouping_column, partition};
use crate::archive::{self, Archive};
use crate::config::Config;
use crate::dataset::read_dataset;
use crate::error::{PipelineError, Result};
use crate::models::{
    CategoryGroup, Choice, Classification, Cohort, Dataset, FeedbackType, RenderMode,
    ReportDocument, SummaryBlock,
};
use crate::report::chart::{self, ChartArtifact};
use crate::report::{compose, compose_insights, ComposeOptions, DocumentWriter, LabelWrap};
use crate::store::ChartStore;
use crate::summarizer::GuardedSummarizer;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const NO_SUMMARIES: &str = "No free-text summaries were available for this batch.";

/// Everything a run depends on.
pub struct PipelineContext {
    pub config: Config,
    pub summarizer: GuardedSummarizer,
    pub store: ChartStore,
    pub writer: Arc<dyn DocumentWriter>,
}

impl PipelineContext {
    fn label_wrap(&self) -> LabelWrap {
        LabelWrap {
            width: self.config.report.label_wrap_width,
            max_lines: self.config.report.label_max_lines,
        }
    }
}

/// Mode selectors for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub choice: Choice,
    pub feedback_type: FeedbackType,
    /// Render and store charts only; no summaries, documents or archive.
    pub charts_only: bool,
}

/// Result of one file's run.
#[derive(Debug)]
pub struct FileOutcome {
    pub source: PathBuf,
    pub documents: Vec<ReportDocument>,
    /// Stored chart names.
    pub charts: Vec<String>,
    /// Summarizer output for every feedback block, for batch insights.
    pub summaries: Vec<String>,
    pub classification: Classification,
}

/// Result of a batch.
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
    pub failures: Vec<(PathBuf, PipelineError)>,
    /// `None` for charts-only runs.
    pub archive: Option<Archive>,
}

impl BatchReport {
    pub fn document_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.documents.len()).sum()
    }

    pub fn chart_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.charts.len()).sum()
    }

    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
            || self.archive.as_ref().is_some_and(|a| !a.skipped.is_empty())
    }
}

/// Non-missing text responses of one column within a cohort.
fn responses(dataset: &Dataset, cohort: &Cohort, column: &str, limit: usize) -> Vec<String> {
    let Some(idx) = dataset.column_index(column) else {
        return Vec::new();
    };
    dataset
        .column_cells(idx, &cohort.rows)
        .filter(|cell| !cell.is_missing())
        .map(|cell| cell.to_string())
        .filter(|text| !text.trim().is_empty())
        .take(limit)
        .collect()
}

async fn summarize_cohort(
    ctx: &PipelineContext,
    dataset: &Dataset,
    cohort: &Cohort,
    columns: &[String],
) -> Vec<SummaryBlock> {
    let mut blocks = Vec::new();
    for column in columns {
        let texts = responses(dataset, cohort, column, ctx.config.summarizer.max_responses);
        if texts.is_empty() {
            debug!("No responses in '{}' for {}", column, cohort.value);
            continue;
        }
        let text = ctx.summarizer.summarize(&texts.join("\n")).await;
        blocks.push(SummaryBlock {
            source: column.clone(),
            text,
        });
    }
    blocks
}

/// Render and store one chart per non-empty distribution.
fn render_charts(
    ctx: &PipelineContext,
    dataset: &Dataset,
    cohort: &Cohort,
    groups: &[CategoryGroup],
    distributions: &[crate::models::Distribution],
    stored: &mut Vec<String>,
) -> Vec<Option<ChartArtifact>> {
    groups
        .iter()
        .zip(distributions)
        .map(|(group, distribution)| {
            let name = chart::chart_file_name(
                dataset.run_id(),
                &ctx.config.report.title,
                &cohort.value,
                &group.name,
            );
            let title = format!("{} Ratings - {}", group.name, cohort.value);
            let artifact = chart::render(distribution, &title, name, ctx.label_wrap())?;

            match ctx.store.save(&artifact) {
                Ok(_) => stored.push(artifact.name.clone()),
                Err(e) => warn!("{}", e),
            }
            Some(artifact)
        })
        .collect()
}

/// Run the pipeline for one input file.
///
/// Only unreadable input and a missing grouping column fail the file;
/// everything else degrades in place.
pub async fn run_file(
    ctx: &PipelineContext,
    path: &Path,
    options: RunOptions,
) -> Result<FileOutcome> {
    let dataset = read_dataset(path)?;
    let classification = classify(
        &dataset,
        options.feedback_type,
        &ctx.config.classifier,
        &ctx.summarizer,
    )
    .await;

    if classification.is_empty() {
        warn!("{}", PipelineError::NoQualifyingColumns(dataset.name.clone()));
    }

    let cohorts = partition(
        &dataset,
        options.choice,
        &ctx.config.cohort,
        ctx.config.classifier.validity_threshold,
    )?;
    let feedback = feedback_columns(
        &dataset,
        &ctx.config.report.feedback_keywords,
        &classification,
    );
    let mode = RenderMode::from(options.feedback_type);
    let compose_options = ComposeOptions {
        header: ctx.config.report.title.clone(),
        file_stem: dataset.name.clone(),
        mode,
        generated_at: Utc::now(),
    };

    let mut documents = Vec::new();
    let mut charts = Vec::new();
    let mut summaries = Vec::new();

    for cohort in &cohorts {
        let distributions = aggregate_all(&dataset, &cohort.rows, &classification.groups, mode);
        let artifacts = render_charts(
            ctx,
            &dataset,
            cohort,
            &classification.groups,
            &distributions,
            &mut charts,
        );

        if options.charts_only {
            continue;
        }

        let summary = if feedback.is_empty() {
            None
        } else {
            let blocks = summarize_cohort(ctx, &dataset, cohort, &feedback).await;
            summaries.extend(blocks.iter().map(|b| b.text.clone()));
            Some(blocks)
        };

        documents.push(compose(
            cohort,
            &classification.groups,
            &distributions,
            &artifacts,
            summary,
            &compose_options,
        ));
    }

    info!(
        "{}: {} document(s), {} chart(s)",
        dataset.name,
        documents.len(),
        charts.len()
    );

    Ok(FileOutcome {
        source: path.to_path_buf(),
        documents,
        charts,
        summaries,
        classification,
    })
}

/// Build the batch-wide themes and action plan document.
async fn batch_insights(ctx: &PipelineContext, outcomes: &[FileOutcome]) -> ReportDocument {
    let summaries: Vec<String> = outcomes
        .iter()
        .flat_map(|o| o.summaries.iter().cloned())
        .collect();

    let (themes, plan) = if summaries.is_empty() {
        (NO_SUMMARIES.to_string(), NO_SUMMARIES.to_string())
    } else {
        let themes = ctx.summarizer.find_common_themes(&summaries).await;
        let plan = ctx.summarizer.propose_action_plan(&themes).await;
        (themes, plan)
    };

    let options = ComposeOptions {
        header: ctx.config.report.title.clone(),
        file_stem: "batch".to_string(),
        mode: RenderMode::Collated,
        generated_at: Utc::now(),
    };
    compose_insights(&themes, &plan, summaries.len(), &options)
}

/// Run every input, then package the surviving documents.
///
/// Files run concurrently up to the configured limit; results are merged in
/// input order once all of them have finished. Fails only when every input
/// failed.
pub async fn run_batch(
    ctx: &PipelineContext,
    inputs: &[PathBuf],
    options: RunOptions,
    progress: &ProgressBar,
) -> Result<BatchReport> {
    let concurrency = ctx.config.general.concurrency.max(1);

    let mut results: Vec<(usize, PathBuf, Result<FileOutcome>)> =
        stream::iter(inputs.iter().enumerate())
            .map(|(i, path)| async move {
                let result = run_file(ctx, path, options).await;
                progress.inc(1);
                (i, path.clone(), result)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
    results.sort_by_key(|(i, _, _)| *i);

    let mut outcomes = Vec::new();
    let mut failures = Vec::new();
    for (_, path, result) in results {
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                failures.push((path, e));
            }
        }
    }

    if outcomes.is_empty() && !failures.is_empty() {
        let (_, first) = failures.remove(0);
        return Err(first);
    }

    let archive = if options.charts_only {
        None
    } else {
        let mut documents: Vec<ReportDocument> = outcomes
            .iter()
            .flat_map(|o| o.documents.iter().cloned())
            .collect();
        if ctx.config.report.action_plan {
            documents.push(batch_insights(ctx, &outcomes).await);
        }
        Some(archive::package(&documents, ctx.writer.as_ref())?)
    };

    if !ctx.config.report.keep_charts && !options.charts_only {
        let names: Vec<&String> = outcomes.iter().flat_map(|o| o.charts.iter()).collect();
        let removed = ctx.store.remove(&names);
        debug!("Removed {} chart(s) of this run", removed);
    }

    Ok(BatchReport {
        outcomes,
        failures,
        archive,
    })
}

/// Dry-run view of one input.
#[derive(Debug, Serialize)]
pub struct Inspection {
    pub source: PathBuf,
    pub rows: usize,
    pub columns: Vec<String>,
    /// Column grouped cohorts would be split on, if any.
    pub grouping_column: Option<String>,
    pub classification: Classification,
    pub feedback_columns: Vec<String>,
    pub cohorts: Vec<CohortSummary>,
}

#[derive(Debug, Serialize)]
pub struct CohortSummary {
    pub group: String,
    pub value: String,
    pub rows: usize,
}

/// Read and classify one input without rendering anything.
pub async fn inspect_file(
    ctx: &PipelineContext,
    path: &Path,
    options: RunOptions,
) -> Result<Inspection> {
    let dataset = read_dataset(path)?;
    let classification = classify(
        &dataset,
        options.feedback_type,
        &ctx.config.classifier,
        &ctx.summarizer,
    )
    .await;
    let cohorts = partition(
        &dataset,
        options.choice,
        &ctx.config.cohort,
        ctx.config.classifier.validity_threshold,
    )?;
    let feedback_columns = feedback_columns(
        &dataset,
        &ctx.config.report.feedback_keywords,
        &classification,
    );

    let grouping_column = find_grouping_column(
        &dataset,
        &ctx.config.cohort.grouping_aliases,
        ctx.config.classifier.validity_threshold,
    )
    .map(str::to_string);

    Ok(Inspection {
        source: path.to_path_buf(),
        rows: dataset.row_count(),
        columns: dataset.columns().to_vec(),
        grouping_column,
        classification,
        feedback_columns,
        cohorts: cohorts
            .into_iter()
            .map(|c| CohortSummary {
                group: c.group,
                value: c.value,
                rows: c.rows.len(),
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Section;
    use crate::report::PdfWriter;
    use crate::summarizer::fake::FakeSummarizer;
    use crate::summarizer::SUMMARY_FALLBACK;
    use std::fs;
    use std::io::Cursor;
    use std::time::Duration;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn context(dir: &TempDir, fake: FakeSummarizer) -> PipelineContext {
        let mut config = Config::default();
        config.report.charts_dir = dir.path().join("charts").display().to_string();
        PipelineContext {
            store: ChartStore::new(&config.report.charts_dir),
            config,
            summarizer: GuardedSummarizer::new(Arc::new(fake), Duration::from_millis(200)),
            writer: Arc::new(PdfWriter),
        }
    }

    fn options(choice: Choice) -> RunOptions {
        RunOptions {
            choice,
            feedback_type: FeedbackType::Structural,
            charts_only: false,
        }
    }

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn zip_names(archive: &Archive) -> Vec<String> {
        let zip = ZipArchive::new(Cursor::new(archive.bytes.as_slice())).unwrap();
        let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    const BRANCH_CSV: &str = "Branch,Teaching [Clarity],Teaching [Pace],Suggestions\n\
                              CS,5,4,More labs\n\
                              CS,4,4,\n\
                              IT,3,2,Better wifi\n";

    #[tokio::test]
    async fn test_scenario_a_single_bracket_group() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir, FakeSummarizer::succeeding());
        let path = write(
            &dir,
            "teaching.csv",
            "Teaching [Clarity],Teaching [Pace]\n5,4\n3,2\n1,5\n4,4\n",
        );

        let outcome = run_file(&ctx, &path, options(Choice::Overall)).await.unwrap();

        assert_eq!(outcome.classification.groups.len(), 1);
        assert_eq!(outcome.classification.groups[0].name, "Teaching");
        assert_eq!(outcome.classification.groups[0].columns.len(), 2);

        assert_eq!(outcome.documents.len(), 1);
        let tables: Vec<_> = outcome.documents[0].tables().collect();
        assert_eq!(tables.len(), 1);
        for row in &tables[0].rows {
            assert_eq!(row.total, 4);
        }
        assert_eq!(outcome.charts.len(), 1);
        assert!(ctx.store.lookup(&outcome.charts[0]).is_some());
    }

    #[tokio::test]
    async fn test_scenario_b_grouped_archive() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir, FakeSummarizer::succeeding());
        let path = write(&dir, "survey.csv", BRANCH_CSV);

        let report = run_batch(
            &ctx,
            &[path],
            options(Choice::Grouped),
            &ProgressBar::hidden(),
        )
        .await
        .unwrap();

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.documents.len(), 2);
        assert_eq!(outcome.documents[0].file_stem, "survey_structural_Branch_CS");
        assert_eq!(outcome.documents[1].file_stem, "survey_structural_Branch_IT");

        let archive = report.archive.as_ref().unwrap();
        assert_eq!(
            zip_names(archive),
            vec![
                "survey_structural_Branch_CS_report.pdf",
                "survey_structural_Branch_IT_report.pdf"
            ]
        );
        assert!(!report.is_partial());
    }

    #[tokio::test]
    async fn test_entry_names_carry_feedback_type() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir, FakeSummarizer::succeeding());
        let path = write(&dir, "survey.csv", BRANCH_CSV);

        let structural = run_batch(
            &ctx,
            &[path.clone()],
            options(Choice::Grouped),
            &ProgressBar::hidden(),
        )
        .await
        .unwrap();
        let classifier = run_batch(
            &ctx,
            &[path],
            RunOptions {
                feedback_type: FeedbackType::Classifier,
                ..options(Choice::Grouped)
            },
            &ProgressBar::hidden(),
        )
        .await
        .unwrap();

        let structural = zip_names(structural.archive.as_ref().unwrap());
        let classifier = zip_names(classifier.archive.as_ref().unwrap());
        assert_ne!(structural, classifier);
        assert_eq!(
            classifier,
            vec![
                "survey_classifier_Branch_CS_report.pdf",
                "survey_classifier_Branch_IT_report.pdf"
            ]
        );
    }

    #[tokio::test]
    async fn test_grouped_without_grouping_column_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir, FakeSummarizer::succeeding());
        let path = write(&dir, "plain.csv", "Teaching [Clarity]\n5\n4\n");

        let err = run_batch(&ctx, &[path], options(Choice::Grouped), &ProgressBar::hidden())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoGroupingColumnFound { .. }));
    }

    #[tokio::test]
    async fn test_scenario_c_empty_distribution_is_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir, FakeSummarizer::succeeding());
        // IT never answered the library question.
        let path = write(
            &dir,
            "library.csv",
            "Branch,Teaching [Clarity],Library Hours\nCS,5,4\nCS,4,3\nIT,3,\n",
        );

        let outcome = run_file(&ctx, &path, options(Choice::Grouped)).await.unwrap();
        let it = &outcome.documents[1];
        assert_eq!(it.file_stem, "library_structural_Branch_IT");

        let categories: Vec<&str> = it
            .sections
            .iter()
            .filter_map(|s| match s {
                Section::Chart { category, .. } | Section::Table { category, .. } => {
                    Some(category.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(categories, vec!["Teaching", "Teaching"]);
        assert_eq!(outcome.documents[0].charts().count(), 2);
        assert!(ctx.writer.write(it).is_ok());
    }

    #[tokio::test]
    async fn test_scenario_d_failing_summarizer_uses_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir, FakeSummarizer::failing());
        let path = write(&dir, "survey.csv", BRANCH_CSV);

        let report = run_batch(&ctx, &[path], options(Choice::Overall), &ProgressBar::hidden())
            .await
            .unwrap();

        let blocks = report.outcomes[0].documents[0].summary_blocks();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].source, "Suggestions");
        assert_eq!(blocks[0].text, SUMMARY_FALLBACK);
        assert_eq!(report.archive.unwrap().entries.len(), 1);
    }

    #[tokio::test]
    async fn test_scenario_e_corrupt_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir, FakeSummarizer::succeeding());
        let first = write(&dir, "first.csv", "Library\n5\n4\n");
        let corrupt = dir.path().join("corrupt.xlsx");
        fs::write(&corrupt, [0xffu8, 0xfe, 0x00, 0x9c, 0x80, 0x0a, 0xc3, 0x28]).unwrap();
        let third = write(&dir, "third.csv", "Library\n2\n1\n");

        let report = run_batch(
            &ctx,
            &[first, corrupt.clone(), third],
            options(Choice::Overall),
            &ProgressBar::hidden(),
        )
        .await
        .unwrap();

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, corrupt);
        assert!(matches!(
            report.failures[0].1,
            PipelineError::UnreadableInput { .. }
        ));
        assert!(report.is_partial());

        let archive = report.archive.as_ref().unwrap();
        assert_eq!(
            zip_names(archive),
            vec![
                "first_structural_Overall_All_Respondents_report.pdf",
                "third_structural_Overall_All_Respondents_report.pdf"
            ]
        );
    }

    #[tokio::test]
    async fn test_every_file_failing_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir, FakeSummarizer::succeeding());
        let missing = dir.path().join("missing.csv");

        let err = run_batch(&ctx, &[missing], options(Choice::Overall), &ProgressBar::hidden())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnreadableInput { .. }));
    }

    #[tokio::test]
    async fn test_failed_classifier_without_fallback_gives_notice() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(&dir, FakeSummarizer::failing());
        ctx.config.classifier.fallback_to_structural = false;
        let path = write(&dir, "survey.csv", BRANCH_CSV);

        let run = RunOptions {
            feedback_type: FeedbackType::Classifier,
            ..options(Choice::Overall)
        };
        let outcome = run_file(&ctx, &path, run).await.unwrap();

        assert!(outcome.classification.is_empty());
        let doc = &outcome.documents[0];
        assert!(doc
            .sections
            .iter()
            .any(|s| matches!(s, Section::Notice(_))));
        assert_eq!(doc.summary_blocks().len(), 1);
    }

    #[tokio::test]
    async fn test_action_plan_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(&dir, FakeSummarizer::succeeding());
        ctx.config.report.action_plan = true;
        let path = write(&dir, "survey.csv", BRANCH_CSV);

        let report = run_batch(&ctx, &[path], options(Choice::Grouped), &ProgressBar::hidden())
            .await
            .unwrap();

        let archive = report.archive.unwrap();
        assert_eq!(archive.entries.len(), 3);
        assert_eq!(archive.entries[2], "batch_insights_report.pdf");
    }

    #[tokio::test]
    async fn test_charts_only_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir, FakeSummarizer::succeeding());
        let path = write(&dir, "survey.csv", BRANCH_CSV);

        let run = RunOptions {
            charts_only: true,
            ..options(Choice::Both)
        };
        let report = run_batch(&ctx, &[path.clone()], run, &ProgressBar::hidden())
            .await
            .unwrap();
        assert!(report.archive.is_none());
        assert_eq!(report.document_count(), 0);
        assert_eq!(report.chart_count(), 3);
        assert_eq!(ctx.store.list().unwrap().len(), 3);

        let mut ctx = ctx;
        ctx.config.report.keep_charts = false;
        ctx.store.clear().unwrap();
        run_batch(&ctx, &[path], options(Choice::Both), &ProgressBar::hidden())
            .await
            .unwrap();
        assert!(ctx.store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inspect_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir, FakeSummarizer::succeeding());
        let path = write(&dir, "survey.csv", BRANCH_CSV);

        let inspection = inspect_file(&ctx, &path, options(Choice::Both)).await.unwrap();
        assert_eq!(inspection.rows, 3);
        assert_eq!(inspection.grouping_column.as_deref(), Some("Branch"));
        assert_eq!(inspection.feedback_columns, vec!["Suggestions"]);
        assert_eq!(inspection.cohorts.len(), 3);
        assert_eq!(inspection.cohorts[1].rows, 2);

        let json = serde_json::to_string(&inspection).unwrap();
        assert!(json.contains("\"Teaching\""));
        assert!(ctx.store.list().unwrap().is_empty());
    }
}
