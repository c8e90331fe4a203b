//! The ingestion agent: one document in, exactly one [`IngestionResult`] out.
//!
//! ```text
//! NotStarted ──▶ Converting ──▶ Extracting ──▶ Assembling ──▶ Done
//!      │              │
//!      └──────────────┴──────────────────────────────────────▶ Failed
//! ```
//!
//! Every failure (missing input, source error, timeout, cancellation, even
//! a panic inside a backend) is folded into a failed result. Nothing escapes
//! [`IngestionAgent::process`].

use crate::config::IngestConfig;
use crate::error::{panic_message, IngestError};
use crate::output::{IngestionResult, SUCCESS_MESSAGE};
use crate::pipeline::normalize::{self, NormalizeOptions};
use crate::pipeline::persist::{self, RecordOptions};
use crate::pipeline::input;
use crate::source::{Document, DocumentSource};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Where a document is in the ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    NotStarted,
    Converting,
    Extracting,
    Assembling,
    Done,
    Failed,
}

impl IngestStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, IngestStage::Done | IngestStage::Failed)
    }

    /// Allowed transitions: forward one step, or to `Failed` from any
    /// non-terminal stage.
    pub fn can_advance_to(self, next: IngestStage) -> bool {
        use IngestStage::*;
        match (self, next) {
            (NotStarted, Converting)
            | (Converting, Extracting)
            | (Extracting, Assembling)
            | (Assembling, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestStage::NotStarted => "not-started",
            IngestStage::Converting => "converting",
            IngestStage::Extracting => "extracting",
            IngestStage::Assembling => "assembling",
            IngestStage::Done => "done",
            IngestStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

struct StageTracker<'a> {
    path: &'a str,
    stage: IngestStage,
}

impl<'a> StageTracker<'a> {
    fn new(path: &'a str) -> Self {
        Self {
            path,
            stage: IngestStage::NotStarted,
        }
    }

    fn advance(&mut self, next: IngestStage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "illegal stage transition {} → {}",
            self.stage,
            next
        );
        debug!("{}: {} → {}", self.path, self.stage, next);
        self.stage = next;
    }
}

/// Drives one [`DocumentSource`] over documents.
///
/// # Example
/// ```rust,no_run
/// use filing_ingest::{IngestionAgent, source::snapshot::SnapshotSource};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() {
/// let agent = IngestionAgent::new(Arc::new(SnapshotSource::new()));
/// let result = agent.process("statements.json", true).await;
/// println!("{} ({} tables)", result.message, result.tables.len());
/// # }
/// ```
pub struct IngestionAgent {
    source: Arc<dyn DocumentSource>,
    config: IngestConfig,
}

impl fmt::Debug for IngestionAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionAgent")
            .field("source", &self.source.name())
            .field("config", &self.config)
            .finish()
    }
}

impl IngestionAgent {
    /// Agent with [`IngestConfig::default`].
    pub fn new(source: Arc<dyn DocumentSource>) -> Self {
        Self::with_config(source, IngestConfig::default())
    }

    pub fn with_config(source: Arc<dyn DocumentSource>, config: IngestConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Ingest one document; optionally persist its mapping record.
    pub async fn process(&self, path: impl AsRef<Path>, persist: bool) -> IngestionResult {
        self.process_until(path, persist, std::future::pending::<()>())
            .await
    }

    /// Like [`process`](Self::process), but gives up with a `Cancelled`
    /// failure as soon as `cancel` completes.
    pub async fn process_until<F>(
        &self,
        path: impl AsRef<Path>,
        persist: bool,
        cancel: F,
    ) -> IngestionResult
    where
        F: Future<Output = ()>,
    {
        let start = Instant::now();
        let path = path.as_ref();
        let source_path = path.display().to_string();

        let mut result = match AssertUnwindSafe(self.run(path, &source_path, persist, cancel))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!("Ingestion of {} panicked: {}", source_path, detail);
                IngestionResult::failed(source_path, &IngestError::Internal(detail))
            }
        };
        result.duration_ms = start.elapsed().as_millis() as u64;
        result
    }

    /// Blocking wrapper around [`process`](Self::process).
    ///
    /// Creates a temporary tokio runtime internally; do not call from within
    /// an async context.
    pub fn process_sync(&self, path: impl AsRef<Path>, persist: bool) -> IngestionResult {
        let path = path.as_ref();
        match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(self.process(path, persist)),
            Err(e) => IngestionResult::failed(
                path.display().to_string(),
                &IngestError::Internal(format!("Failed to create tokio runtime: {e}")),
            ),
        }
    }

    /// Ingest many documents, up to `config.concurrency` at a time.
    ///
    /// Returns one result per input, in completion order.
    pub async fn process_batch<P: AsRef<Path>>(
        &self,
        paths: &[P],
        persist: bool,
    ) -> Vec<IngestionResult> {
        let total = paths.len();
        info!(
            "Starting batch: {} documents, concurrency {}",
            total, self.config.concurrency
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(total);
        }

        let results: Vec<IngestionResult> = stream::iter(
            paths
                .iter()
                .map(|p| self.process_reporting(p.as_ref(), persist)),
        )
        .buffer_unordered(self.config.concurrency)
        .collect()
        .await;

        let succeeded = results.iter().filter(|r| r.success).count();
        info!("Batch complete: {}/{} succeeded", succeeded, total);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(total, succeeded);
        }
        results
    }

    /// [`process`](Self::process) wrapped in per-document progress events.
    pub(crate) async fn process_reporting(&self, path: &Path, persist: bool) -> IngestionResult {
        let label = path.display().to_string();
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_document_start(&label);
        }
        let result = self.process(path, persist).await;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_document_complete(
                &label,
                result.success,
                result.tables.len(),
                result.text_blocks.len(),
            );
        }
        result
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    async fn run<F>(&self, path: &Path, source_path: &str, persist: bool, cancel: F) -> IngestionResult
    where
        F: Future<Output = ()>,
    {
        let mut stage = StageTracker::new(source_path);
        info!("Starting ingestion: {} (source: {})", source_path, self.source.name());

        let path = match input::check_input(path).await {
            Ok(p) => p,
            Err(e) => return fail(&mut stage, source_path, e),
        };

        stage.advance(IngestStage::Converting);
        let doc = match self.convert(&path, cancel).await {
            Ok(doc) => doc,
            Err(e) => return fail(&mut stage, source_path, e),
        };

        stage.advance(IngestStage::Extracting);
        let options = NormalizeOptions {
            corrections: self.config.corrections.clone(),
        };
        let extraction = normalize::extract(&*doc, &options);
        drop(doc);

        stage.advance(IngestStage::Assembling);
        let mut result = IngestionResult {
            success: true,
            message: SUCCESS_MESSAGE.to_string(),
            tables: extraction.tables,
            text_blocks: extraction.text_blocks,
            source_path: Some(source_path.to_string()),
            num_pages: extraction.page_count,
            diagnostics: extraction.diagnostics,
            ..IngestionResult::default()
        };
        info!(
            "Extracted {} tables and {} text blocks from {}",
            result.tables.len(),
            result.text_blocks.len(),
            source_path
        );
        if !result.diagnostics.is_empty() {
            warn!(
                "{}: {} elements skipped or degraded",
                source_path,
                result.diagnostics.len()
            );
        }

        if persist {
            self.persist(&path, &mut result).await;
        }

        stage.advance(IngestStage::Done);
        result
    }

    /// Run the source under the configured timeout, racing `cancel`.
    async fn convert<F>(&self, path: &Path, cancel: F) -> Result<Box<dyn Document>, IngestError>
    where
        F: Future<Output = ()>,
    {
        let secs = self.config.source_timeout_secs;
        let conversion = tokio::time::timeout(Duration::from_secs(secs), self.source.convert(path));

        tokio::select! {
            biased;
            _ = cancel => Err(IngestError::Cancelled),
            outcome = conversion => match outcome {
                Ok(Ok(doc)) => Ok(doc),
                Ok(Err(e)) => {
                    let errors = if e.errors.is_empty() { vec![e.message] } else { e.errors };
                    Err(IngestError::ConversionFailed {
                        source_name: self.source.name().to_string(),
                        path: path.to_path_buf(),
                        errors,
                    })
                }
                Err(_) => Err(IngestError::Timeout { secs }),
            },
        }
    }

    async fn persist(&self, path: &Path, result: &mut IngestionResult) {
        let record = persist::build_record(
            persist::source_pdf_name(path),
            &result.tables,
            &result.text_blocks,
            RecordOptions {
                matrix_shape: self.config.matrix_shape,
                clean_numeric_cells: self.config.clean_numeric_cells,
            },
        );
        let out = persist::record_path(&self.config.output_dir, path);
        match persist::write_record(&out, &record).await {
            Ok(()) => {
                info!("Saved ingestion output to {}", out.display());
                result.persisted = true;
                result.persisted_path = Some(out.display().to_string());
            }
            Err(e) => {
                warn!("Could not persist ingestion output: {}", e);
                result.persist_error = Some(e.to_string());
            }
        }
    }
}

fn fail(stage: &mut StageTracker<'_>, source_path: &str, error: IngestError) -> IngestionResult {
    stage.advance(IngestStage::Failed);
    error!("Ingestion of {} failed: {}", source_path, error);
    IngestionResult::failed(source_path, &error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_only() {
        use IngestStage::*;
        assert!(NotStarted.can_advance_to(Converting));
        assert!(Converting.can_advance_to(Extracting));
        assert!(Assembling.can_advance_to(Done));
        assert!(!NotStarted.can_advance_to(Extracting));
        assert!(!Done.can_advance_to(Converting));
    }

    #[test]
    fn failed_reachable_from_any_live_stage() {
        use IngestStage::*;
        for s in [NotStarted, Converting, Extracting, Assembling] {
            assert!(s.can_advance_to(Failed), "{s}");
        }
        assert!(!Done.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Failed));
    }
}
