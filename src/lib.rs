//! Formdiff: pairwise comparison of scanned form revisions.
//!
//! Formdiff sends every unordered pair of document images in a directory to
//! a vision-capable model and collects the answers into one report, in a
//! fixed pair order, with failed pairs reported rather than dropped. A
//! separate pipeline OCRs documents, masks personally identifiable
//! information, diffs the extracted text pairwise and can summarize the
//! masked diff with a text model.
//!
//! The CLI runs every batch to completion. Stopping a batch early is a
//! library feature: pass a [`compare::CancelFlag`] to
//! [`compare::compare_images`] and call [`compare::CancelFlag::cancel`] from
//! another thread.
//!
//! # Modules
//!
//! - [`source`]: Image discovery and loading
//! - [`pairs`]: Unordered pair generation
//! - [`client`]: Vision-model backend client
//! - [`compare`]: Batch orchestration and the report writer
//! - [`response`]: Optional numbered-list validation of model answers
//! - [`redact`]: OCR, PII detection and anonymization
//! - [`error`]: Error types for formdiff operations

pub mod client;
pub mod compare;
pub mod error;
pub mod pairs;
pub mod redact;
pub mod response;
pub mod source;

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

pub use error::{ComparisonError, FormdiffError};

/// Default file name of the comparison report.
pub const DEFAULT_REPORT_FILE: &str = "form_1042_image_comparison.txt";

/// The formdiff CLI application.
#[derive(Parser)]
#[command(name = "formdiff")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Compare every pair of form images in a directory with a vision model.
    Compare(CompareArgs),
    /// OCR documents, mask personally identifiable information and diff them.
    Redact(RedactArgs),
    /// Summarize a masked diff report with a text model.
    Summarize(SummarizeArgs),
}

/// Arguments for the compare subcommand.
#[derive(clap::Args)]
struct CompareArgs {
    /// Directory containing the form images.
    input: PathBuf,

    /// Report destination (overwritten if it exists).
    #[arg(short, long, default_value = DEFAULT_REPORT_FILE)]
    output: PathBuf,

    /// Case-insensitive substring every image file name must contain.
    #[arg(long, default_value = source::DEFAULT_MARKER)]
    marker: String,

    /// Accepted image extensions.
    #[arg(long = "ext", value_delimiter = ',', default_values_t = default_extensions())]
    extensions: Vec<String>,

    /// PDF rasterizer, invoked as `<cmd> -jpeg -r 200 -f 1 -l 1 -singlefile <pdf>`.
    #[arg(long, env = "FORMDIFF_PDF_COMMAND", default_value = source::DEFAULT_PDF_COMMAND)]
    pdf_command: String,

    /// Vision model to query.
    #[arg(long, env = "FORMDIFF_MODEL", default_value = client::DEFAULT_MODEL)]
    model: String,

    /// Backend address (Ollama-compatible).
    #[arg(long, env = "OLLAMA_HOST", default_value = client::DEFAULT_HOST)]
    host: String,

    /// Per-request deadline in seconds.
    #[arg(
        long,
        env = "FORMDIFF_TIMEOUT_SECS",
        default_value_t = client::DEFAULT_TIMEOUT_SECS
    )]
    timeout_secs: u64,

    /// Maximum concurrent requests to the backend.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    concurrency: u16,

    /// Reject answers whose numbered list falls outside this size (e.g. 5-7).
    #[arg(long)]
    expect_items: Option<response::ItemRange>,

    /// Report format ('text' or 'json').
    #[arg(long, default_value = "text")]
    format: String,
}

/// Arguments for the redact subcommand.
#[derive(clap::Args)]
struct RedactArgs {
    /// Directory containing document images (or extracted .txt files).
    input: PathBuf,

    /// Directory for masked documents.
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Case-insensitive substring every file name must contain.
    #[arg(long, default_value = "")]
    marker: String,

    /// OCR command, invoked as `<cmd> <image> stdout -l <lang>`.
    #[arg(long, env = "FORMDIFF_OCR_COMMAND", default_value = redact::DEFAULT_OCR_COMMAND)]
    ocr_command: String,

    /// OCR language.
    #[arg(long, default_value = "eng")]
    lang: String,

    /// PDF rasterizer used before OCR.
    #[arg(long, env = "FORMDIFF_PDF_COMMAND", default_value = source::DEFAULT_PDF_COMMAND)]
    pdf_command: String,

    /// Minimum recognizer score for an entity to be masked.
    #[arg(long, default_value_t = redact::DEFAULT_SCORE_THRESHOLD)]
    threshold: f64,
}

/// Arguments for the summarize subcommand.
#[derive(clap::Args)]
struct SummarizeArgs {
    /// Diff report to summarize (usually diff_report_masked.txt).
    input: PathBuf,

    /// Directory for the readable report.
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Text model to query.
    #[arg(long, env = "FORMDIFF_SUMMARY_MODEL", default_value = client::DEFAULT_SUMMARY_MODEL)]
    model: String,

    /// Backend address (Ollama-compatible).
    #[arg(long, env = "OLLAMA_HOST", default_value = client::DEFAULT_HOST)]
    host: String,

    /// Per-request deadline in seconds.
    #[arg(
        long,
        env = "FORMDIFF_TIMEOUT_SECS",
        default_value_t = client::DEFAULT_TIMEOUT_SECS
    )]
    timeout_secs: u64,
}

fn default_extensions() -> Vec<String> {
    source::DEFAULT_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

/// Run the formdiff CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), FormdiffError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Some(Commands::Compare(args)) => run_compare(args),
        Some(Commands::Redact(args)) => run_redact(args),
        Some(Commands::Summarize(args)) => run_summarize(args),
        None => {
            println!("formdiff {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Pairwise vision-model comparison of scanned form revisions.");
            println!();
            println!("Run 'formdiff --help' for usage information.");
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Execute the compare subcommand.
fn run_compare(args: CompareArgs) -> Result<(), FormdiffError> {
    let format = match args.format.as_str() {
        "text" => compare::ReportFormat::Text,
        "json" => compare::ReportFormat::Json,
        other => {
            return Err(FormdiffError::InvalidOption(format!(
                "report format '{}' (supported: text, json)",
                other
            )));
        }
    };

    let source_opts = source::SourceOptions {
        marker: args.marker,
        extensions: args.extensions,
        rasterizer: source::PdfRasterizer {
            command: args.pdf_command,
            ..Default::default()
        },
    };
    let compare_opts = compare::CompareOptions {
        concurrency: usize::from(args.concurrency),
        expect_items: args.expect_items,
    };

    // Fail on input problems before contacting the backend. Files that
    // cannot be read only fail their own pairs.
    let paths = source::enumerate_images(&args.input, &source_opts)?;
    let images = source::load_images(&paths, &source_opts);

    let report = {
        let backend = client::OllamaClient::new(client::ClientConfig {
            host: args.host,
            model: args.model,
            timeout: Duration::from_secs(args.timeout_secs),
        });
        compare::compare_images(&images, &backend, &compare_opts, &compare::CancelFlag::new())
    };

    compare::write_report(&report, &args.output, format)?;

    println!(
        "Comparison results saved to {} ({} succeeded, {} failed)",
        args.output.display(),
        report.succeeded_count(),
        report.failed_count()
    );
    Ok(())
}

/// Execute the redact subcommand.
fn run_redact(args: RedactArgs) -> Result<(), FormdiffError> {
    if !(0.0..=1.0).contains(&args.threshold) {
        return Err(FormdiffError::InvalidOption(format!(
            "--threshold must be in [0.0, 1.0], got {}",
            args.threshold
        )));
    }

    let mut opts = redact::RedactOptions::default();
    opts.source.marker = args.marker;

    let extractor = redact::OcrExtractor {
        command: args.ocr_command,
        language: args.lang,
        rasterizer: source::PdfRasterizer {
            command: args.pdf_command,
            ..Default::default()
        },
    };
    let detector = redact::PatternDetector::with_threshold(args.threshold);

    let summary = redact::redact_directory(
        &args.input,
        &args.output,
        &extractor,
        &detector,
        &redact::ReplaceAnonymizer,
        &opts,
    )?;

    print!("{}", summary);
    Ok(())
}

/// Execute the summarize subcommand.
fn run_summarize(args: SummarizeArgs) -> Result<(), FormdiffError> {
    let backend = client::OllamaClient::new(client::ClientConfig {
        host: args.host,
        model: args.model,
        timeout: Duration::from_secs(args.timeout_secs),
    });
    let run = redact::summarize_report_file(&args.input, &args.output, &backend)?;

    println!(
        "Readable report saved to {} ({} section(s), {} failed)",
        run.output.display(),
        run.sections,
        run.failed
    );
    Ok(())
}
