//! # filing-ingest
//!
//! Ingestion stage for financial filings: turn a converted PDF into an
//! ordered, serializable list of tables (Markdown) and text blocks (minimal
//! HTML), and persist a mapping record for the downstream mapping stage.
//!
//! ## Pipeline Overview
//!
//! ```text
//! filing.pdf
//!  │
//!  ├─ 1. Input      must be an existing regular file
//!  ├─ 2. Source     pdfium text layer / vision LLM / Markdown / JSON snapshot
//!  ├─ 3. Normalize  index tables and texts, skip failing elements
//!  ├─ 4. Assemble   one IngestionResult per document, never an error
//!  └─ 5. Persist    <stem>_ingested.json (tables as cell matrices)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use filing_ingest::{IngestConfig, IngestionAgent};
//! use filing_ingest::source::pdfium::PdfiumSource;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = IngestConfig::builder().output_dir("ingested_data").build()?;
//!     let agent = IngestionAgent::with_config(Arc::new(PdfiumSource::new()), config);
//!     let result = agent.process("AFS-2024.pdf", true).await;
//!     println!("{}: {} tables, {} text blocks",
//!         result.message, result.tables.len(), result.text_blocks.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ingest` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! filing-ingest = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod source;
pub mod stream;
pub mod validate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IngestConfig, IngestConfigBuilder, MatrixShape, VisionConfig, VisionConfigBuilder};
pub use error::{ElementError, IngestError, SourceError};
pub use ingest::{IngestStage, IngestionAgent};
pub use output::{
    Diagnostic, DiagnosticScope, ExtractedTable, ExtractedTextBlock, FailureKind, IngestionResult,
    MappingRecord, MappingTable, MappingTextBlock,
};
pub use pipeline::postprocess::TextCorrections;
pub use pipeline::table::parse_markdown_table;
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use source::{Document, DocumentSource, SourceKind, TableElement, TextElement};
pub use stream::{process_stream, ResultStream};
pub use validate::{validate_record, ValidationIssue, ValidationOptions};
