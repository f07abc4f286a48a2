//! Feedback Catalyst - per-cohort rating reports from survey exports
//!
//! A CLI tool that reads CSV/XLSX survey responses, groups the 1-5 rating
//! columns into categories, and writes a ZIP archive with one PDF report
//! per cohort, optionally with AI-written free-text summaries from Ollama.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (unreadable input, missing grouping column, config, etc.)
//!   2 - Archive written, but at least one input or document was skipped

mod analysis;
mod archive;
mod cli;
mod config;
mod dataset;
mod error;
mod models;
mod pipeline;
mod report;
mod scanner;
mod store;
mod summarizer;

use anyhow::{bail, Context, Result};
use cli::Args;
use config::{Config, CONFIG_FILE_NAME};
use indicatif::{ProgressBar, ProgressStyle};
use pipeline::{PipelineContext, RunOptions};
use report::PdfWriter;
use scanner::{InputScanner, ScanConfig};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use store::ChartStore;
use summarizer::GuardedSummarizer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("Feedback Catalyst v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Run failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default configuration file.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize the model, grouping aliases, keywords, and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Warning: a tracing subscriber was already installed");
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}

/// Run the requested command. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let store = ChartStore::new(&config.report.charts_dir);

    if args.clear_cache {
        let removed = store.clear()?;
        println!(
            "🧹 Removed {} chart(s) from {}",
            removed,
            store.dir().display()
        );
        return Ok(0);
    }

    if let Some(ref name) = args.show_chart {
        return Ok(match store.lookup(name) {
            Some(path) => {
                println!("{}", path.display());
                0
            }
            None => {
                eprintln!("Chart not found: {}", name);
                1
            }
        });
    }

    let files = InputScanner::new(ScanConfig::default()).scan(&args.inputs);
    if files.is_empty() {
        bail!("No survey files found in the given inputs");
    }
    for file in &files {
        debug!("Input {} ({} bytes)", file.path.display(), file.size);
    }
    let inputs: Vec<PathBuf> = files.into_iter().map(|f| f.path).collect();

    let summarizer = GuardedSummarizer::from_config(&config.summarizer);
    let options = RunOptions {
        choice: args.choice,
        feedback_type: args.feedback_type,
        charts_only: args.charts_only,
    };
    let output = PathBuf::from(&config.general.output);
    let ctx = PipelineContext {
        config,
        summarizer,
        store,
        writer: Arc::new(PdfWriter),
    };

    if args.dry_run {
        return handle_dry_run(&ctx, &inputs, options, args.json).await;
    }

    if !args.quiet {
        println!("📊 Processing {} survey file(s)", inputs.len());
        println!("   Cohorts: {:?}", options.choice);
        println!("   Feedback type: {}", options.feedback_type);
        println!("   Summarizer: {}", ctx.summarizer.backend_name());
    }

    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(inputs.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    };

    let report = pipeline::run_batch(&ctx, &inputs, options, &progress).await?;
    progress.finish_and_clear();

    for (path, e) in &report.failures {
        if e.is_user_facing() {
            eprintln!("❌ {}: {}", path.display(), e);
        } else {
            eprintln!("⚠️  Skipped {}: {}", path.display(), e);
        }
    }

    if options.charts_only {
        println!(
            "\n✅ Stored {} chart(s) in {}",
            report.chart_count(),
            ctx.store.dir().display()
        );
        return Ok(if report.is_partial() { 2 } else { 0 });
    }

    let Some(archive) = report.archive.as_ref() else {
        bail!("No archive was produced");
    };
    write_atomically(&output, &archive.bytes)?;

    let duration = start_time.elapsed().as_secs_f64();
    println!("\n📝 Report Summary:");
    println!("   Files processed: {}", report.outcomes.len());
    println!("   Files skipped: {}", report.failures.len());
    println!("   Documents: {}", archive.entries.len());
    if !archive.skipped.is_empty() {
        println!("   Documents skipped: {}", archive.skipped.len());
    }
    println!("   Charts: {}", report.chart_count());
    println!("   Duration: {:.1}s", duration);
    println!("\n✅ Done! Archive saved to: {}", output.display());

    Ok(if report.is_partial() { 2 } else { 0 })
}

/// Write the archive through a temporary file in the target directory, so
/// an interrupted run never leaves a truncated archive behind.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)
        .with_context(|| format!("Failed to create a temporary file in {}", dir.display()))?;
    tmp.write_all(bytes)
        .context("Failed to write archive contents")?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write archive to {}", path.display()))?;

    Ok(())
}

/// Handle --dry-run: read and classify inputs, print the result, exit.
async fn handle_dry_run(
    ctx: &PipelineContext,
    inputs: &[PathBuf],
    options: RunOptions,
    json: bool,
) -> Result<i32> {
    let mut inspections = Vec::new();
    let mut failed = 0;

    for path in inputs {
        match pipeline::inspect_file(ctx, path, options).await {
            Ok(inspection) => inspections.push(inspection),
            Err(e) => {
                failed += 1;
                eprintln!("⚠️  {}: {}", path.display(), e);
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&inspections)?);
    } else {
        println!("\n🔍 Dry run: no documents rendered\n");
        for inspection in &inspections {
            println!(
                "📄 {} ({} rows, {} columns)",
                inspection.source.display(),
                inspection.rows,
                inspection.columns.len()
            );
            if let Some(ref column) = inspection.grouping_column {
                println!("   Grouping column: {}", column);
            }
            println!(
                "   Classification: {:?}{}",
                inspection.classification.outcome,
                if inspection.classification.fell_back {
                    " (structural fallback)"
                } else {
                    ""
                }
            );
            for group in &inspection.classification.groups {
                println!("   📁 {} ({} columns)", group.name, group.columns.len());
                for column in &group.columns {
                    println!("      - {}", column);
                }
            }
            for column in &inspection.classification.unassigned {
                println!("   ❔ Unassigned: {}", column);
            }
            if !inspection.feedback_columns.is_empty() {
                println!(
                    "   💬 Free-text: {}",
                    inspection.feedback_columns.join(", ")
                );
            }
            for cohort in &inspection.cohorts {
                println!(
                    "   👥 {}: {} ({} rows)",
                    cohort.group, cohort.value, cohort.rows
                );
            }
            println!();
        }
    }

    if inspections.is_empty() {
        bail!("None of the inputs could be inspected");
    }
    Ok(if failed > 0 { 2 } else { 0 })
}
