//! CLI binary for filing-ingest.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `IngestConfig` / `VisionConfig`, runs the agent over every input and
//! prints a per-document summary.

use anyhow::{Context, Result};
use clap::Parser;
use filing_ingest::output::IngestionResult;
use filing_ingest::source::markdown::MarkdownSource;
use filing_ingest::source::pdfium::PdfiumSource;
use filing_ingest::source::snapshot::SnapshotSource;
use filing_ingest::source::vision::VisionSource;
use filing_ingest::source::AutoSource;
use filing_ingest::validate::load_ground_truth;
use filing_ingest::{
    validate_record, DocumentSource, IngestConfig, IngestProgressCallback, IngestionAgent,
    MappingRecord, MatrixShape, ProgressCallback, SourceKind, TextCorrections, ValidationOptions,
    VisionConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar for the whole batch; one log line per finished document.
struct CliProgressCallback {
    bar: ProgressBar,
    failures: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Ingesting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            failures: AtomicUsize::new(0),
        })
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.reset_eta();
    }

    fn on_document_start(&self, path: &str) {
        self.bar.set_message(short_name(path));
    }

    fn on_document_complete(&self, path: &str, success: bool, tables: usize, text_blocks: usize) {
        if success {
            self.bar.println(format!(
                "  {} {}  {}",
                green("✓"),
                path,
                dim(&format!("{tables} tables, {text_blocks} text blocks")),
            ));
        } else {
            self.failures.fetch_add(1, Ordering::SeqCst);
            self.bar.println(format!("  {} {}", red("✗"), path));
        }
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, succeeded: usize) {
        self.bar.finish_and_clear();
        let failed = self.failures.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} documents ingested",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents ingested  ({} failed)",
                if succeeded == 0 { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total_documents,
                red(&failed.to_string()),
            );
        }
    }
}

fn short_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Ingest one filing from its text layer, write ingested_data/AFS-2024_ingested.json
  ingest AFS-2024.pdf

  # Scanned filings: transcribe with a vision model, fix common OCR misreadings
  ingest --source vision --ocr-fixes --recover-footnotes scans/*.pdf

  # Re-ingest a pre-converted JSON snapshot without writing anything
  ingest --no-persist --json statements.json

  # Check a persisted record against the PDF it came from
  ingest --validate ingested_data/AFS-2024_ingested.json AFS-2024.pdf \
         --phrase "*Deemed interest by virtue of her spouse's interest"

SOURCES:
  auto       .json → snapshot, .md → markdown, anything else → pdfium (default)
  pdfium     PDF text layer; text only, no tables
  vision     rasterise pages and transcribe with a vision LLM; tables + text
  markdown   Markdown export, pages split by <!-- page N --> or form feeds
  snapshot   JSON export of an already converted document

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (vision source)
  ANTHROPIC_API_KEY       Anthropic API key (vision source)
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium (skips auto-download)
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory

EXIT STATUS:
  0 every document was ingested (or validation found no issue)
  1 at least one document failed (or validation found issues)
"#;

/// Ingest financial filings into ordered tables and text blocks.
#[derive(Parser, Debug)]
#[command(
    name = "ingest",
    version,
    about = "Ingest financial filings (PDF) into tables and text blocks for mapping",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Documents to ingest (PDF, Markdown export or JSON snapshot).
    #[arg(required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Document source backend.
    #[arg(long, env = "INGEST_SOURCE", value_enum, default_value = "auto")]
    source: SourceArg,

    /// Directory receiving <stem>_ingested.json records.
    #[arg(short, long, env = "INGEST_OUTPUT_DIR", default_value = "ingested_data")]
    output_dir: PathBuf,

    /// Do not write mapping records.
    #[arg(long, env = "INGEST_NO_PERSIST")]
    no_persist: bool,

    /// Print results as JSON instead of a summary.
    #[arg(long, env = "INGEST_JSON")]
    json: bool,

    /// Per-document conversion timeout in seconds.
    #[arg(long, env = "INGEST_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// Documents processed at once.
    #[arg(short, long, env = "INGEST_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Row shape of persisted table matrices.
    #[arg(long, env = "INGEST_MATRIX_SHAPE", value_enum, default_value = "ragged")]
    matrix_shape: MatrixShapeArg,

    /// Fix known OCR misreadings (Kegistration → Registration, t0 → to, …).
    #[arg(long, env = "INGEST_OCR_FIXES")]
    ocr_fixes: bool,

    /// Keep only numeric content in persisted table cells.
    #[arg(long, env = "INGEST_NUMERIC_CELLS")]
    numeric_cells: bool,

    /// Recover marked footnotes from the bottom of each page (vision source).
    #[arg(long, env = "INGEST_RECOVER_FOOTNOTES")]
    recover_footnotes: bool,

    /// Vision LLM model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Vision LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Longest edge of rendered page images, in pixels (vision source).
    #[arg(long, env = "INGEST_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// Retries per page on LLM failure (vision source).
    #[arg(long, env = "INGEST_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-page LLM call timeout in seconds (vision source).
    #[arg(long, env = "INGEST_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "INGEST_PASSWORD")]
    password: Option<String>,

    /// Validate this persisted record against the (single) input instead of
    /// ingesting.
    #[arg(long, value_name = "RECORD")]
    validate: Option<PathBuf>,

    /// Phrase that must survive extraction (with --validate; repeatable).
    #[arg(long = "phrase", value_name = "TEXT")]
    phrases: Vec<String>,

    /// Disable progress bar.
    #[arg(long, env = "INGEST_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INGEST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "INGEST_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SourceArg {
    Auto,
    Pdfium,
    Vision,
    Markdown,
    Snapshot,
}

impl From<SourceArg> for SourceKind {
    fn from(v: SourceArg) -> Self {
        match v {
            SourceArg::Auto => SourceKind::Auto,
            SourceArg::Pdfium => SourceKind::Pdfium,
            SourceArg::Vision => SourceKind::Vision,
            SourceArg::Markdown => SourceKind::Markdown,
            SourceArg::Snapshot => SourceKind::Snapshot,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum MatrixShapeArg {
    Ragged,
    Pad,
}

impl From<MatrixShapeArg> for MatrixShape {
    fn from(v: MatrixShapeArg) -> Self {
        match v {
            MatrixShapeArg::Ragged => MatrixShape::Ragged,
            MatrixShapeArg::Pad => MatrixShape::PadToWidest,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs are hidden while the progress bar is up.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && cli.validate.is_none();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Ensure PDFium engine is available ───────────────────────────────
    if needs_pdfium(&cli) && !pdfium_auto::is_pdfium_cached() {
        download_pdfium(cli.quiet)?;
    }

    // ── Validate-only mode ───────────────────────────────────────────────
    if let Some(ref record_path) = cli.validate {
        let clean = run_validation(&cli, record_path).await?;
        if !clean {
            std::process::exit(1);
        }
        return Ok(());
    }

    // ── Ingest ───────────────────────────────────────────────────────────
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn IngestProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;
    let source = build_source(&cli)?;
    let agent = IngestionAgent::with_config(source, config);

    let results = agent.process_batch(&cli.inputs, !cli.no_persist).await;
    let failed = results.iter().filter(|r| !r.success).count();

    if cli.json {
        let json = if results.len() == 1 {
            serde_json::to_string_pretty(&results[0])
        } else {
            serde_json::to_string_pretty(&results)
        }
        .context("Failed to serialise results")?;
        println!("{json}");
    } else if !cli.quiet {
        for result in &results {
            print_summary(result);
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// PDFium is needed whenever some input will reach a PDF backend.
fn needs_pdfium(cli: &Cli) -> bool {
    if cli.validate.is_some() {
        return cli.inputs.iter().any(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        });
    }
    let kind: SourceKind = cli.source.into();
    cli.inputs
        .iter()
        .any(|p| matches!(kind.resolve(p), SourceKind::Pdfium | SourceKind::Vision))
}

/// First run downloads the pdfium library (~30 MB) into the local cache.
fn download_pdfium(quiet: bool) -> Result<()> {
    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

/// Map CLI args to `IngestConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<IngestConfig> {
    let mut builder = IngestConfig::builder()
        .output_dir(&cli.output_dir)
        .source_timeout_secs(cli.timeout)
        .concurrency(cli.concurrency)
        .matrix_shape(cli.matrix_shape.into())
        .clean_numeric_cells(cli.numeric_cells);

    if cli.ocr_fixes {
        builder = builder.corrections(TextCorrections::financial_filings());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Build the document source selected by `--source`.
fn build_source(cli: &Cli) -> Result<Arc<dyn DocumentSource>> {
    let mut pdfium = PdfiumSource::new();
    if let Some(ref pwd) = cli.password {
        pdfium = pdfium.with_password(pwd.clone());
    }

    Ok(match cli.source {
        SourceArg::Auto => Arc::new(AutoSource::new(Arc::new(pdfium))),
        SourceArg::Pdfium => Arc::new(pdfium),
        SourceArg::Vision => Arc::new(VisionSource::new(build_vision_config(cli)?)),
        SourceArg::Markdown => Arc::new(MarkdownSource::new()),
        SourceArg::Snapshot => Arc::new(SnapshotSource::new()),
    })
}

/// Map CLI args to `VisionConfig`.
fn build_vision_config(cli: &Cli) -> Result<VisionConfig> {
    let mut builder = VisionConfig::builder()
        .max_rendered_pixels(cli.max_pixels)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .recover_footnotes(cli.recover_footnotes);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }

    builder.build().context("Invalid vision configuration")
}

/// Returns `true` when the record has no issues.
async fn run_validation(cli: &Cli, record_path: &Path) -> Result<bool> {
    let [truth_path] = cli.inputs.as_slice() else {
        anyhow::bail!("--validate takes exactly one ground-truth input (got {})", cli.inputs.len());
    };

    let raw = tokio::fs::read_to_string(record_path)
        .await
        .with_context(|| format!("Failed to read record {}", record_path.display()))?;
    let record: MappingRecord = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a mapping record", record_path.display()))?;
    let truth = load_ground_truth(truth_path, cli.password.as_deref())
        .await
        .with_context(|| format!("Failed to read ground truth {}", truth_path.display()))?;

    let options = ValidationOptions::default().with_critical_phrases(cli.phrases.iter().cloned());
    let issues = validate_record(&record, &truth, &options).context("Validation failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&issues).context("Failed to serialise issues")?
        );
    } else if issues.is_empty() {
        println!("{} No issues found. Extraction appears accurate.", green("✔"));
    } else {
        println!("{} Found {} potential issues:\n", cyan("⚠"), issues.len());
        for issue in &issues {
            println!("- {issue}");
            println!("  Suggestion: {}\n", issue.suggestion());
        }
    }
    Ok(issues.is_empty())
}

/// Per-document summary with a preview of the first tables and text blocks.
fn print_summary(result: &IngestionResult) {
    let path = result.source_path.as_deref().unwrap_or("<unknown>");
    if !result.success {
        println!("{} {}  {}", red("✗"), bold(path), red(&result.message));
        return;
    }

    println!("{} {}  {}", green("✓"), bold(path), result.message);
    let pages = result
        .num_pages
        .map(|n| format!("{n} pages, "))
        .unwrap_or_default();
    println!(
        "   {}{} tables, {} text blocks, {} diagnostics, {}ms",
        pages,
        result.tables.len(),
        result.text_blocks.len(),
        result.diagnostics.len(),
        result.duration_ms
    );
    if let Some(ref saved) = result.persisted_path {
        println!("   saved → {}", saved);
    }
    if let Some(ref err) = result.persist_error {
        println!("   {} {}", red("not saved:"), err);
    }

    for table in result.tables.iter().take(2) {
        println!("\n   {}", cyan(&format!("Table_{}", table.index)));
        for line in table.markdown.lines().take(6) {
            println!("   {}", dim(line));
        }
    }
    for block in result.text_blocks.iter().take(2) {
        let preview: String = block.html.chars().take(160).collect();
        let ellipsis = if block.html.chars().count() > 160 { "…" } else { "" };
        println!("\n   {} {}{}", cyan(&format!("Text {}", block.index)), preview, ellipsis);
    }
    println!();
}
