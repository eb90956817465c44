//! rusty-harvest - Collect marked table values from Word documents
//!
//! Indexes the `{{markers}}` of a template document, reads the same logical
//! table cells from every matching document and writes one spreadsheet row per
//! document.

use anyhow::Context;
use anyhow::Result;
use clap::ArgAction;
use clap::Parser;
use clap::ValueEnum;
use log::info;
use log::warn;
use rusty_harvest::discover_documents;
use rusty_harvest::extract::Progress;
use rusty_harvest::marker;
use rusty_harvest::BatchExtractor;
use rusty_harvest::DocxSource;
use rusty_harvest::HarvestConfig;
use rusty_harvest::TabularSink;
use rusty_harvest::UnsetMergePolicy;
use rusty_harvest::XlsxSink;
use std::path::PathBuf;

/// Reading of a `vMerge` element without a value.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum UnsetMerge {
    /// Continue the region above (default)
    #[default]
    Continue,
    /// Start a new region
    Restart,
}

impl From<UnsetMerge> for UnsetMergePolicy {
    fn from(value: UnsetMerge) -> Self {
        match value {
            UnsetMerge::Continue => UnsetMergePolicy::Continue,
            UnsetMerge::Restart => UnsetMergePolicy::Restart,
        }
    }
}

/// Collect the values marked in a template from a batch of Word documents
/// into a single spreadsheet.
#[derive(Parser, Debug)]
#[command(name = "rusty-harvest")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Template document with `{{name}}` markers
    template: PathBuf,

    /// Directory containing the documents to read
    #[arg(short = 'i', long = "input-dir", default_value = "Files")]
    input_dir: PathBuf,

    /// File name pattern inside the input directory
    #[arg(short = 'p', long, default_value = "*.docx")]
    pattern: String,

    /// Spreadsheet to write
    #[arg(short = 'o', long, default_value = "summary.xlsx")]
    output: PathBuf,

    /// Worker threads (defaults to the available parallelism)
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Header of the document identifier column
    #[arg(long = "id-column", default_value = "file_name")]
    id_column: String,

    /// Name of the output worksheet
    #[arg(long = "sheet-name", default_value = "Extraction")]
    sheet_name: String,

    /// How to read a vertical merge without a value
    #[arg(long = "unset-merge", value_enum, default_value_t = UnsetMerge::Continue)]
    unset_merge: UnsetMerge,

    /// Keep rows whose values are all empty
    #[arg(long = "keep-empty-rows", action = ArgAction::SetTrue)]
    keep_empty_rows: bool,

    /// Opening marker delimiter
    #[arg(long = "open", default_value = "{{")]
    open_delimiter: String,

    /// Closing marker delimiter
    #[arg(long = "close", default_value = "}}")]
    close_delimiter: String,

    /// Only print the markers found in the template
    #[arg(long = "preview-only", action = ArgAction::SetTrue)]
    preview_only: bool,

    /// Use debug logging level
    #[arg(short = 'd', long, action = ArgAction::SetTrue)]
    debug: bool,
}

impl From<Args> for HarvestConfig {
    fn from(args: Args) -> Self {
        HarvestConfig {
            template: args.template,
            input_dir: args.input_dir,
            pattern: args.pattern,
            output: args.output,
            sheet_name: args.sheet_name,
            id_column: args.id_column,
            threads: args.threads,
            policy: args.unset_merge.into(),
            keep_empty_rows: args.keep_empty_rows,
            open_delimiter: args.open_delimiter,
            close_delimiter: args.close_delimiter,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    let preview_only = args.preview_only;
    let config = HarvestConfig::from(args);
    run(&config, preview_only)
}

fn run(config: &HarvestConfig, preview_only: bool) -> Result<()> {
    let source = DocxSource;
    let syntax = config.syntax().context("Invalid marker delimiters")?;
    let markers = marker::collect_markers_from_path(&source, &config.template, &syntax, config.policy)
        .with_context(|| format!("Failed to read template '{}'", config.template.display()))?;

    if markers.is_empty() {
        warn!("No markers found in template '{}'", config.template.display());
        return Ok(());
    }
    println!("{}", marker::preview(&markers));
    if preview_only {
        return Ok(());
    }

    let paths = discover_documents(config)
        .with_context(|| format!("Failed to list documents in '{}'", config.input_dir.display()))?;
    if paths.is_empty() {
        warn!(
            "No documents match '{}' in '{}'",
            config.pattern,
            config.input_dir.display()
        );
        return Ok(());
    }
    info!("Reading {} document(s) from '{}'", paths.len(), config.input_dir.display());

    let extractor = BatchExtractor::new(&source, &markers, config.extract_options()?);
    let report = extractor.extract_with_progress(
        &paths,
        |progress: Progress<'_>| {
            info!(
                "[{}/{}] {}",
                progress.completed,
                progress.total,
                progress.document.display()
            )
        },
        None,
    )?;
    for diagnostic in &report.diagnostics {
        warn!("{}", diagnostic);
    }

    let header = marker::header(&config.id_column, &markers);
    let records: Vec<Vec<String>> = report.rows.iter().map(|row| row.to_record()).collect();
    XlsxSink::new(&config.output, &config.sheet_name)
        .write(&header, &records)
        .with_context(|| format!("Failed to write '{}'", config.output.display()))?;
    Ok(())
}
