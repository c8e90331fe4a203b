//! Output types: normalized records, the per-document result, and the
//! downstream-facing mapping record.

use crate::error::{ElementError, IngestError};
use serde::{Deserialize, Serialize};

/// Text type assigned when the document source gives no hint.
pub const DEFAULT_TEXT_TYPE: &str = "paragraph";

/// Message carried by every successful [`IngestionResult`].
pub const SUCCESS_MESSAGE: &str = "PDF ingestion completed successfully.";

/// A table extracted from the document, rendered as Markdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedTable {
    /// 0-based position among accepted tables, in discovery order.
    pub index: usize,
    pub markdown: String,
    /// 1-indexed page the table was found on, when the source knows it.
    pub page_number: Option<u32>,
}

/// A text block extracted from the document, wrapped in minimal HTML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedTextBlock {
    /// 0-based position among accepted text blocks, in discovery order.
    pub index: usize,
    pub html: String,
    pub page_number: Option<u32>,
    /// Source-provided classification; `"paragraph"` when unknown.
    pub text_type: Option<String>,
}

/// Why a document could not be ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InputNotFound,
    ConversionFailure,
    Timeout,
    Cancelled,
    Unexpected,
}

/// What a [`Diagnostic`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticScope {
    Table,
    Text,
    Footnote,
    Document,
}

/// A non-fatal problem observed while ingesting one document.
///
/// Every skipped element produces exactly one diagnostic, so a degraded
/// success is visible to callers without reading logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub scope: DiagnosticScope,
    /// Position of the element in the source's own collection (including
    /// rejected elements). `None` for document-level warnings.
    pub source_position: Option<usize>,
    pub page_number: Option<u32>,
    pub reason: String,
}

impl Diagnostic {
    pub fn skipped(
        scope: DiagnosticScope,
        source_position: usize,
        page_number: Option<u32>,
        error: &ElementError,
    ) -> Self {
        Self {
            scope,
            source_position: Some(source_position),
            page_number,
            reason: error.to_string(),
        }
    }

    pub fn document(reason: impl Into<String>) -> Self {
        Self {
            scope: DiagnosticScope::Document,
            source_position: None,
            page_number: None,
            reason: reason.into(),
        }
    }
}

/// The single outcome of processing one document. Always returned, never thrown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionResult {
    pub success: bool,
    pub message: String,
    pub tables: Vec<ExtractedTable>,
    pub text_blocks: Vec<ExtractedTextBlock>,
    pub source_path: Option<String>,
    pub num_pages: Option<usize>,
    /// Skipped elements and source warnings.
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    /// Set only when `success` is false.
    #[serde(default)]
    pub failure: Option<FailureKind>,
    /// Whether the mapping record was written.
    #[serde(default)]
    pub persisted: bool,
    #[serde(default)]
    pub persisted_path: Option<String>,
    /// Why persistence failed; never affects `success`.
    #[serde(default)]
    pub persist_error: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl IngestionResult {
    /// Build a failed result carrying the error's message and classification.
    pub fn failed(source_path: impl Into<String>, error: &IngestError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            source_path: Some(source_path.into()),
            failure: Some(error.failure_kind()),
            ..Self::default()
        }
    }

    /// `true` when the document succeeded but at least one element was skipped.
    pub fn is_degraded(&self) -> bool {
        self.success && !self.diagnostics.is_empty()
    }
}

// ── Persisted mapping record ─────────────────────────────────────────────

/// One table in the downstream mapping record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingTable {
    /// `"Table_<index>"`.
    pub name: String,
    pub data: Vec<Vec<String>>,
    pub header_row_index: usize,
}

/// One text block in the downstream mapping record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingTextBlock {
    pub text: String,
    pub page_number: Option<u32>,
}

/// The JSON document persisted for the mapping stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRecord {
    /// Base name of the source file.
    pub source_pdf: String,
    pub tables: Vec<MappingTable>,
    pub text_blocks: Vec<MappingTextBlock>,
}
