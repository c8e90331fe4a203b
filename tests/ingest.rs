//! Integration tests for the ingestion agent.
//!
//! These run against the snapshot and Markdown sources plus a few scripted
//! sources, so they need neither a pdfium library nor LLM credentials.
//!
//! Run with:
//!   cargo test --test ingest

use filing_ingest::source::markdown::MarkdownSource;
use filing_ingest::source::snapshot::SnapshotSource;
use filing_ingest::source::{Document, DocumentSource};
use filing_ingest::{
    process_stream, DiagnosticScope, FailureKind, IngestConfig, IngestProgressCallback,
    IngestionAgent, MappingRecord, MatrixShape, SourceError, TextCorrections,
};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

const TABLE_AB: &str = "| A | B |\n| --- | --- |\n| 1 | 2 |";

/// Route library logs through the test harness; `RUST_LOG` overrides.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    init_tracing();
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn agent_with(source: Arc<dyn DocumentSource>, out: &Path) -> IngestionAgent {
    init_tracing();
    let config = IngestConfig::builder().output_dir(out).build().unwrap();
    IngestionAgent::with_config(source, config)
}

fn read_record(path: &Path) -> MappingRecord {
    let raw = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&raw).unwrap()
}

/// Fails every conversion with the given sub-errors.
struct FailingSource(Vec<String>);

impl DocumentSource for FailingSource {
    fn name(&self) -> &str {
        "failing"
    }

    fn convert<'a>(&'a self, _path: &'a Path) -> BoxFuture<'a, Result<Box<dyn Document>, SourceError>> {
        let errors = self.0.clone();
        async move { Err(SourceError::with_errors("engine gave up", errors)) }.boxed()
    }
}

/// Never finishes within a test's patience.
struct StalledSource;

impl DocumentSource for StalledSource {
    fn name(&self) -> &str {
        "stalled"
    }

    fn convert<'a>(&'a self, _path: &'a Path) -> BoxFuture<'a, Result<Box<dyn Document>, SourceError>> {
        async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(SourceError::new("unreachable"))
        }
        .boxed()
    }
}

struct PanickingSource;

impl DocumentSource for PanickingSource {
    fn name(&self) -> &str {
        "panicking"
    }

    fn convert<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Box<dyn Document>, SourceError>> {
        async move {
            if path.exists() {
                panic!("layout model exploded");
            }
            Err(SourceError::new("unreachable"))
        }
        .boxed()
    }
}

#[derive(Default)]
struct CountingCallback {
    batch_total: AtomicUsize,
    started: AtomicUsize,
    completed: AtomicUsize,
    succeeded_reported: AtomicUsize,
}

impl IngestProgressCallback for CountingCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.batch_total.store(total_documents, Ordering::SeqCst);
    }

    fn on_document_start(&self, _path: &str) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_document_complete(&self, _path: &str, _success: bool, _tables: usize, _texts: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_batch_complete(&self, _total_documents: usize, succeeded: usize) {
        self.succeeded_reported.store(succeeded, Ordering::SeqCst);
    }
}

// ── Failure envelope ─────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_input_fails_without_touching_the_source() {
    let out = tempfile::tempdir().unwrap();
    let agent = agent_with(Arc::new(PanickingSource), out.path());

    let result = agent.process("/no/such/file.pdf", true).await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::InputNotFound));
    assert!(result.message.contains("/no/such/file.pdf"), "{}", result.message);
    assert!(result.tables.is_empty());
    assert!(result.text_blocks.is_empty());
    assert!(!result.persisted);
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn directory_input_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let agent = agent_with(Arc::new(SnapshotSource::new()), dir.path());

    let result = agent.process(dir.path(), false).await;

    assert_eq!(result.failure, Some(FailureKind::InputNotFound));
}

#[tokio::test]
async fn conversion_failure_lists_engine_errors() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = write(&dir, "afs.pdf", "%PDF-1.7");
    let source = FailingSource(vec!["page 1: bad xref".into(), "page 2: bad xref".into()]);
    let agent = agent_with(Arc::new(source), dir.path());

    let result = agent.process(&pdf, true).await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::ConversionFailure));
    assert!(result.message.contains("failing"));
    assert!(result.message.contains("page 1: bad xref; page 2: bad xref"));
    assert!(!dir.path().join("afs_ingested.json").exists());
}

#[tokio::test]
async fn failed_snapshot_envelope_is_a_conversion_failure() {
    let dir = tempfile::tempdir().unwrap();
    let json = write(&dir, "afs.json", r#"{"document": null, "errors": ["OCR model missing"]}"#);
    let agent = agent_with(Arc::new(SnapshotSource::new()), dir.path());

    let result = agent.process(&json, false).await;

    assert_eq!(result.failure, Some(FailureKind::ConversionFailure));
    assert!(result.message.contains("OCR model missing"));
}

#[tokio::test]
async fn stalled_source_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = write(&dir, "slow.pdf", "%PDF-1.7");
    let config = IngestConfig::builder()
        .output_dir(dir.path())
        .source_timeout_secs(1)
        .build()
        .unwrap();
    let agent = IngestionAgent::with_config(Arc::new(StalledSource), config);

    let result = agent.process(&pdf, true).await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::Timeout));
    assert!(result.message.contains("1s"));
    assert!(result.duration_ms < 10_000);
}

#[tokio::test]
async fn cancellation_wins_over_conversion() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = write(&dir, "slow.pdf", "%PDF-1.7");
    let agent = agent_with(Arc::new(StalledSource), dir.path());

    let result = agent.process_until(&pdf, true, std::future::ready(())).await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::Cancelled));
}

#[tokio::test]
async fn panicking_source_becomes_unexpected_failure() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = write(&dir, "boom.pdf", "%PDF-1.7");
    let agent = agent_with(Arc::new(PanickingSource), dir.path());

    let result = agent.process(&pdf, true).await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::Unexpected));
    assert!(result.message.contains("layout model exploded"));
}

// ── Success path ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn snapshot_round_trips_into_mapping_record() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("ingested_data");
    let snapshot = serde_json::json!({
        "page_count": 2,
        "tables": [{ "markdown": TABLE_AB, "page": 2 }],
        "texts": [
            { "text": "Directors' report", "page": 1, "label": "heading" },
            { "text": "Profit & loss < budget", "page": 1 }
        ]
    });
    let json = write(&dir, "AFS-2024.json", &snapshot.to_string());
    let agent = agent_with(Arc::new(SnapshotSource::new()), &out);

    let result = agent.process(&json, true).await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.message, "PDF ingestion completed successfully.");
    assert_eq!(result.num_pages, Some(2));
    assert_eq!(result.tables.len(), 1);
    assert_eq!(result.tables[0].page_number, Some(2));
    assert_eq!(result.text_blocks[0].html, "<p>Directors' report</p>");
    assert_eq!(result.text_blocks[0].text_type.as_deref(), Some("heading"));
    assert_eq!(result.text_blocks[1].html, "<p>Profit &amp; loss &lt; budget</p>");
    assert_eq!(result.text_blocks[1].text_type.as_deref(), Some("paragraph"));
    assert!(result.diagnostics.is_empty());

    let record_path = out.join("AFS-2024_ingested.json");
    assert!(result.persisted);
    assert_eq!(
        result.persisted_path.as_deref(),
        Some(record_path.display().to_string().as_str())
    );

    let record = read_record(&record_path);
    assert_eq!(record.source_pdf, "AFS-2024.json");
    assert_eq!(record.tables[0].name, "Table_0");
    assert_eq!(record.tables[0].header_row_index, 0);
    assert_eq!(
        record.tables[0].data,
        vec![vec!["A".to_string(), "B".to_string()], vec!["1".to_string(), "2".to_string()]]
    );
    assert_eq!(record.text_blocks.len(), 2);
    assert_eq!(record.text_blocks[1].page_number, Some(1));
}

#[tokio::test]
async fn persist_false_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let json = write(&dir, "afs.json", r#"{"texts": [{"text": "hello"}]}"#);
    let agent = agent_with(Arc::new(SnapshotSource::new()), &out);

    let result = agent.process(&json, false).await;

    assert!(result.success);
    assert!(!result.persisted);
    assert!(result.persisted_path.is_none());
    assert!(!out.exists());
}

#[tokio::test]
async fn text_only_document_has_no_tables() {
    let dir = tempfile::tempdir().unwrap();
    let json = write(
        &dir,
        "notes.json",
        r#"{"texts": [{"text": "one"}, {"text": "two"}, {"text": "three"}]}"#,
    );
    let agent = agent_with(Arc::new(SnapshotSource::new()), dir.path());

    let result = agent.process(&json, true).await;

    assert!(result.success);
    assert!(result.tables.is_empty());
    let indices: Vec<usize> = result.text_blocks.iter().map(|b| b.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert!(read_record(&dir.path().join("notes_ingested.json")).tables.is_empty());
}

#[tokio::test]
async fn failing_elements_do_not_shift_indices() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = serde_json::json!({
        "tables": [
            { "markdown": TABLE_AB },
            { "error": "merged cells could not be exported", "page": 4 },
            { "markdown": "| X |\n| --- |\n| 9 |" }
        ],
        "texts": [{ "text": "kept" }, {}, { "text": "also kept" }]
    });
    let json = write(&dir, "afs.json", &snapshot.to_string());
    let agent = agent_with(Arc::new(SnapshotSource::new()), dir.path());

    let result = agent.process(&json, true).await;

    assert!(result.success);
    assert!(result.is_degraded());
    let table_idx: Vec<usize> = result.tables.iter().map(|t| t.index).collect();
    assert_eq!(table_idx, vec![0, 1]);
    assert!(result.tables[1].markdown.contains("| X |"));
    let text_idx: Vec<usize> = result.text_blocks.iter().map(|b| b.index).collect();
    assert_eq!(text_idx, vec![0, 1]);

    assert_eq!(result.diagnostics.len(), 2);
    assert_eq!(result.diagnostics[0].scope, DiagnosticScope::Table);
    assert_eq!(result.diagnostics[0].source_position, Some(1));
    assert_eq!(result.diagnostics[0].page_number, Some(4));
    assert_eq!(result.diagnostics[1].scope, DiagnosticScope::Text);

    let record = read_record(&dir.path().join("afs_ingested.json"));
    let names: Vec<&str> = record.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Table_0", "Table_1"]);
}

#[tokio::test]
async fn footnotes_follow_text_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = serde_json::json!({
        "texts": [{ "text": "Directors' interests", "page": 3 }],
        "footnotes": [{ "text": "*Deemed interest by virtue of her spouse's interest", "page": 3 }],
        "warnings": ["page 5 could not be transcribed"]
    });
    let json = write(&dir, "afs.json", &snapshot.to_string());
    let agent = agent_with(Arc::new(SnapshotSource::new()), dir.path());

    let result = agent.process(&json, false).await;

    assert!(result.success);
    assert_eq!(result.text_blocks.len(), 2);
    assert_eq!(result.text_blocks[1].index, 1);
    assert_eq!(result.text_blocks[1].text_type.as_deref(), Some("footnote"));
    assert!(result.text_blocks[1].html.starts_with("<p>*Deemed interest"));
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].scope, DiagnosticScope::Document);
}

#[tokio::test]
async fn markdown_export_is_paged_and_segmented() {
    let dir = tempfile::tempdir().unwrap();
    let md = format!(
        "<!-- page 1 -->\n# Statement of Profit or Loss\n\nRevenue grew & margins held.\n\n<!-- page 2 -->\n{TABLE_AB}\n"
    );
    let path = write(&dir, "afs.md", &md);
    let agent = agent_with(Arc::new(MarkdownSource::new()), dir.path());

    let result = agent.process(&path, false).await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.num_pages, Some(2));
    assert_eq!(result.tables.len(), 1);
    assert_eq!(result.tables[0].page_number, Some(2));
    assert_eq!(result.text_blocks.len(), 2);
    assert_eq!(result.text_blocks[0].text_type.as_deref(), Some("heading"));
    assert_eq!(result.text_blocks[1].html, "<p>Revenue grew &amp; margins held.</p>");
    assert_eq!(result.text_blocks[1].page_number, Some(1));
}

#[tokio::test]
async fn text_export_with_trailing_form_feed_counts_real_pages() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "afs.md", "Directors' report\u{000C}Auditors' report\u{000C}");
    let agent = agent_with(Arc::new(MarkdownSource::new()), dir.path());

    let result = agent.process(&path, false).await;

    assert!(result.success);
    assert_eq!(result.num_pages, Some(2));
    assert_eq!(result.text_blocks.len(), 2);
    assert_eq!(result.text_blocks[1].page_number, Some(2));
}

#[tokio::test]
async fn config_shapes_persisted_matrix_and_text() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = serde_json::json!({
        "tables": [{ "markdown": "| Item | 2024 | 2023 |\n| --- | --- | --- |\n| Loss | (418,988) |" }],
        "texts": [{ "text": "Kegistration No. 123" }]
    });
    let json = write(&dir, "afs.json", &snapshot.to_string());
    let config = IngestConfig::builder()
        .output_dir(dir.path())
        .matrix_shape(MatrixShape::PadToWidest)
        .corrections(TextCorrections::financial_filings())
        .build()
        .unwrap();
    let agent = IngestionAgent::with_config(Arc::new(SnapshotSource::new()), config);

    let result = agent.process(&json, true).await;

    assert!(result.success);
    assert_eq!(result.text_blocks[0].html, "<p>Registration No. 123</p>");
    let record = read_record(&dir.path().join("afs_ingested.json"));
    assert_eq!(record.tables[0].data[1], vec!["Loss", "(418,988)", ""]);
}

#[tokio::test]
async fn persist_failure_keeps_success() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = write(&dir, "not-a-dir", "");
    let json = write(&dir, "afs.json", r#"{"texts": [{"text": "hello"}]}"#);
    let agent = agent_with(Arc::new(SnapshotSource::new()), &blocker);

    let result = agent.process(&json, true).await;

    assert!(result.success);
    assert!(!result.persisted);
    assert!(result.persist_error.is_some());
    assert_eq!(result.text_blocks.len(), 1);
}

// ── Batch entry points ───────────────────────────────────────────────────────

#[tokio::test]
async fn batch_returns_one_result_per_input() {
    let dir = tempfile::tempdir().unwrap();
    let good = write(&dir, "good.json", r#"{"texts": [{"text": "ok"}]}"#);
    let bad = dir.path().join("missing.json");
    let callback = Arc::new(CountingCallback::default());
    let config = IngestConfig::builder()
        .output_dir(dir.path())
        .concurrency(2)
        .progress_callback(callback.clone())
        .build()
        .unwrap();
    let agent = IngestionAgent::with_config(Arc::new(SnapshotSource::new()), config);

    let results = agent.process_batch(&[good.clone(), bad.clone()], false).await;

    assert_eq!(results.len(), 2);
    let ok = results
        .iter()
        .find(|r| r.source_path.as_deref() == Some(good.display().to_string().as_str()))
        .unwrap();
    assert!(ok.success);
    let missing = results
        .iter()
        .find(|r| r.source_path.as_deref() == Some(bad.display().to_string().as_str()))
        .unwrap();
    assert_eq!(missing.failure, Some(FailureKind::InputNotFound));

    assert_eq!(callback.batch_total.load(Ordering::SeqCst), 2);
    assert_eq!(callback.started.load(Ordering::SeqCst), 2);
    assert_eq!(callback.completed.load(Ordering::SeqCst), 2);
    assert_eq!(callback.succeeded_reported.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stream_yields_every_document() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<PathBuf> = (0..3)
        .map(|i| write(&dir, &format!("doc{i}.json"), r#"{"texts": [{"text": "x"}]}"#))
        .collect();
    let agent = Arc::new(agent_with(Arc::new(SnapshotSource::new()), dir.path()));

    let results: Vec<_> = process_stream(agent, paths, true).collect().await;

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.success && r.persisted));
    for i in 0..3 {
        assert!(dir.path().join(format!("doc{i}_ingested.json")).exists());
    }
}

#[test]
fn sync_wrapper_runs_outside_a_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let json = write(&dir, "afs.json", r#"{"tables": [{"markdown": "| A |\n| --- |\n| 1 |"}]}"#);
    let agent = agent_with(Arc::new(SnapshotSource::new()), dir.path());

    let result = agent.process_sync(&json, false);

    assert!(result.success);
    assert_eq!(result.tables.len(), 1);
}
