//! cardsieve: filter and project a card dataset
//!
//! Usage:
//!   # Keep white cards, write to stdout
//!   cardsieve AllPrintings.json --filter '{"colors": {"contains": "W"}}'
//!
//!   # Project to a few fields, drop sets left empty
//!   cardsieve AllPrintings.json --fields name,rarity --drop-empty-sets -o out.json
//!
//!   # Settings from a file, overridden by CARDSIEVE_* variables and flags
//!   cardsieve --config run.yaml --workers 4
//!
//!   # Write the default projection schema
//!   cardsieve --dump-schema schema.json

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use cardsieve::logging::{init_logging, LogSettings};
use cardsieve::pipeline::{FilterSource, ProjectionSource};
use cardsieve::project::DEFAULT_FIELDS;
use cardsieve::{Pipeline, PipelineConfig, ProgressState, RecordErrorPolicy};
use clap::Parser;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cardsieve")]
#[command(about = "Filter and project a card dataset, keeping its envelope", long_about = None)]
struct Args {
    /// Input dataset (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output file (stdout if omitted)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Run settings file (.json, .yaml or .yml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Inline filter spec as JSON
    #[arg(long, conflicts_with = "filter_file")]
    filter: Option<String>,

    /// File holding the filter spec
    #[arg(long)]
    filter_file: Option<PathBuf>,

    /// Comma-separated fields to keep
    #[arg(long, conflicts_with = "fields_file")]
    fields: Option<String>,

    /// File holding the fields to keep (JSON list or one per line)
    #[arg(long)]
    fields_file: Option<PathBuf>,

    /// Leave out sets with no surviving cards
    #[arg(long)]
    drop_empty_sets: bool,

    /// What to do with a card that fails validation
    #[arg(long, value_enum)]
    on_record_error: Option<RecordErrorPolicy>,

    /// Threads evaluating filter and projection
    #[arg(long)]
    workers: Option<usize>,

    /// Cards handed to the workers at a time
    #[arg(long)]
    batch_size: Option<usize>,

    /// Comma-separated languages to keep in foreignData
    #[arg(long)]
    languages: Option<String>,

    /// Write the default projection schema to this path and exit
    #[arg(long, value_name = "PATH")]
    dump_schema: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Log level when no -v or -q is given
    #[arg(long, value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// Also append logs to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = build_config(&args)?;
    let _guard = init_logging(&LogSettings {
        verbose: args.verbose,
        quiet: args.quiet,
        ..config.log_settings()
    })?;

    if let Some(path) = &args.dump_schema {
        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &DEFAULT_FIELDS)?;
        info!(path = %path.display(), "wrote default schema");
        return Ok(());
    }

    let progress = Arc::new(ProgressState::new());
    let mut pipeline = Pipeline::from_config(&config)?.with_progress(Arc::clone(&progress));

    let reader: Box<dyn Read + Send> = match &config.input {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => Box::new(io::stdin()),
    };
    let writer: Box<dyn Write> = match &config.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };

    let done = Arc::new(AtomicBool::new(false));
    let reporter = spawn_reporter(
        Arc::clone(&progress),
        Arc::clone(&done),
        Duration::from_millis(config.progress_interval_ms.max(1)),
    );

    let result = pipeline.run(reader, writer);
    done.store(true, Ordering::Relaxed);
    let _ = reporter.join();

    let summary = result?;
    eprintln!(
        "✓ {} of {} cards kept in {} sets ({} skipped, {} sets dropped) in {:.2?}",
        summary.cards_written,
        summary.progress.records_seen,
        summary.sets_written,
        summary.progress.records_skipped,
        summary.sets_dropped,
        summary.elapsed
    );
    Ok(())
}

/// Config file, then environment, then flags
fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.apply_env().context("Invalid CARDSIEVE_* environment setting")?;

    if args.input.is_some() {
        config.input = args.input.clone();
    }
    if args.output.is_some() {
        config.output = args.output.clone();
    }
    if let Some(spec) = &args.filter {
        config.filter = Some(FilterSource::Spec(serde_json::Value::String(spec.clone())));
    }
    if let Some(file) = &args.filter_file {
        config.filter = Some(FilterSource::file(file));
    }
    if let Some(fields) = &args.fields {
        config.projection = Some(ProjectionSource::Fields(split_list(fields)));
    }
    if let Some(file) = &args.fields_file {
        config.projection = Some(ProjectionSource::file(file));
    }
    if args.drop_empty_sets {
        config.drop_empty_sets = true;
    }
    if let Some(policy) = args.on_record_error {
        config.on_record_error = policy;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if args.log_json {
        config.log_json = true;
    }
    if args.log_level.is_some() {
        config.log_level = args.log_level.clone();
    }
    if args.log_file.is_some() {
        config.log_file = args.log_file.clone();
    }
    if let Some(languages) = &args.languages {
        config.foreign_languages = Some(split_list(languages));
    }

    config.validate()?;
    Ok(config)
}

fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn spawn_reporter(
    progress: Arc<ProgressState>,
    done: Arc<AtomicBool>,
    interval: Duration,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let tick = interval.min(Duration::from_millis(100));
        let mut waited = Duration::ZERO;
        while !done.load(Ordering::Relaxed) {
            thread::sleep(tick);
            waited += tick;
            if waited >= interval {
                waited = Duration::ZERO;
                let snapshot = progress.snapshot();
                info!(
                    records_seen = snapshot.records_seen,
                    records_matched = snapshot.records_matched,
                    records_skipped = snapshot.records_skipped,
                    bytes_read = snapshot.bytes_read,
                    "progress"
                );
            }
        }
    })
}
