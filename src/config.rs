//! Configuration types for document ingestion.
//!
//! [`IngestConfig`] controls the agent (output directory, timeout, batch
//! concurrency, matrix shaping, text corrections). [`VisionConfig`] controls
//! the vision-LLM document source only. Both are built through builders whose
//! setters clamp to sane ranges and whose `build()` validates the rest.

use crate::error::IngestError;
use crate::pipeline::postprocess::TextCorrections;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default directory for persisted mapping records.
pub const DEFAULT_OUTPUT_DIR: &str = "ingested_data";

/// Configuration for an [`crate::ingest::IngestionAgent`].
///
/// # Example
/// ```rust
/// use filing_ingest::{IngestConfig, MatrixShape};
///
/// let config = IngestConfig::builder()
///     .output_dir("out")
///     .source_timeout_secs(120)
///     .matrix_shape(MatrixShape::PadToWidest)
///     .build()
///     .unwrap();
/// assert_eq!(config.source_timeout_secs, 120);
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    /// Directory receiving `<stem>_ingested.json` files. Created on demand.
    pub output_dir: PathBuf,

    /// Upper bound on a single document-source call, in seconds. Default: 300.
    ///
    /// Conversion engines can hang on pathological files. When the bound is
    /// hit the document is reported as failed and the worker moves on.
    pub source_timeout_secs: u64,

    /// Documents processed at once by batch entry points. Default: 4.
    pub concurrency: usize,

    /// How matrix rows of unequal width are written to the mapping record.
    pub matrix_shape: MatrixShape,

    /// OCR corrections applied to table markdown and plain text. Default: none.
    pub corrections: TextCorrections,

    /// Strip non-numeric characters from persisted table cells. Default: false.
    ///
    /// Only the persisted matrix is affected; `ExtractedTable::markdown`
    /// keeps the source rendering.
    pub clean_numeric_cells: bool,

    /// Per-document progress events (batch entry points).
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            source_timeout_secs: 300,
            concurrency: 4,
            matrix_shape: MatrixShape::default(),
            corrections: TextCorrections::default(),
            clean_numeric_cells: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("output_dir", &self.output_dir)
            .field("source_timeout_secs", &self.source_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("matrix_shape", &self.matrix_shape)
            .field("corrections", &self.corrections.len())
            .field("clean_numeric_cells", &self.clean_numeric_cells)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn IngestProgressCallback>"),
            )
            .finish()
    }
}

impl IngestConfig {
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn source_timeout_secs(mut self, secs: u64) -> Self {
        self.config.source_timeout_secs = secs.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn matrix_shape(mut self, shape: MatrixShape) -> Self {
        self.config.matrix_shape = shape;
        self
    }

    pub fn corrections(mut self, corrections: TextCorrections) -> Self {
        self.config.corrections = corrections;
        self
    }

    pub fn clean_numeric_cells(mut self, v: bool) -> Self {
        self.config.clean_numeric_cells = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, IngestError> {
        let c = &self.config;
        if c.output_dir.as_os_str().is_empty() {
            return Err(IngestError::InvalidConfig(
                "Output directory must not be empty".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(IngestError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.source_timeout_secs == 0 {
            return Err(IngestError::InvalidConfig(
                "Source timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Policy for table rows whose cell counts differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatrixShape {
    /// Keep every row exactly as parsed (default).
    #[default]
    Ragged,
    /// Right-pad short rows with empty cells up to the widest row.
    PadToWidest,
}

// ── Vision source ────────────────────────────────────────────────────────

/// Configuration for [`crate::source::vision::VisionSource`].
#[derive(Clone)]
pub struct VisionConfig {
    /// Maximum rendered image dimension in pixels. Default: 2000.
    ///
    /// Caps either edge regardless of physical page size so a poster-sized
    /// page cannot exhaust memory.
    pub max_rendered_pixels: u32,

    /// Concurrent VLM calls per document. Default: 10.
    pub concurrency: usize,

    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0, transcription should not be creative.
    pub temperature: f32,

    /// Maximum tokens generated per page. Default: 4096.
    pub max_tokens: usize,

    /// Retries per page on a failed VLM call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-VLM-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom system prompt. If None, uses [`crate::prompts::TRANSCRIBE_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Recover footnotes from the page text layer. Default: false.
    pub recover_footnotes: bool,

    /// Fraction of the page height, measured from the bottom, scanned for
    /// footnotes. Default: 0.1.
    pub footnote_band: f32,

    /// A line in the footnote band is kept when it starts with one of these.
    pub footnote_markers: Vec<String>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            max_rendered_pixels: 2000,
            concurrency: 10,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            password: None,
            system_prompt: None,
            recover_footnotes: false,
            footnote_band: 0.1,
            footnote_markers: vec!["*".into(), "†".into(), "‡".into()],
        }
    }
}

impl fmt::Debug for VisionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionConfig")
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("recover_footnotes", &self.recover_footnotes)
            .finish()
    }
}

impl VisionConfig {
    pub fn builder() -> VisionConfigBuilder {
        VisionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`VisionConfig`].
#[derive(Debug)]
pub struct VisionConfigBuilder {
    config: VisionConfig,
}

impl VisionConfigBuilder {
    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn recover_footnotes(mut self, v: bool) -> Self {
        self.config.recover_footnotes = v;
        self
    }

    pub fn footnote_band(mut self, fraction: f32) -> Self {
        self.config.footnote_band = fraction.clamp(0.01, 0.5);
        self
    }

    pub fn footnote_markers(mut self, markers: Vec<String>) -> Self {
        self.config.footnote_markers = markers;
        self
    }

    pub fn build(self) -> Result<VisionConfig, IngestError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(IngestError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.recover_footnotes && c.footnote_markers.iter().all(|m| m.trim().is_empty()) {
            return Err(IngestError::InvalidConfig(
                "Footnote recovery needs at least one non-empty marker".into(),
            ));
        }
        Ok(self.config)
    }
}
