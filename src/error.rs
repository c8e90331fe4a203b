//! Error types for the filing-ingest library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`IngestError`] — **Fatal for one document**: the input is missing, the
//!   document source produced nothing, or the conversion timed out. It never
//!   escapes [`crate::ingest::IngestionAgent::process`]; the agent folds it
//!   into a failed [`crate::output::IngestionResult`].
//!
//! * [`ElementError`] — **Non-fatal**: a single table or text element could
//!   not be rendered. The element is skipped and the error is recorded as a
//!   [`crate::output::Diagnostic`] on the result.
//!
//! * [`SourceError`] — the structured failure a [`crate::source::DocumentSource`]
//!   backend reports, carrying every sub-error the engine produced.

use crate::output::FailureKind;
use std::any::Any;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort ingestion of a single document.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input path is missing or not a regular file.
    #[error("PDF file not found or is not a file: {}", path.display())]
    InputNotFound { path: PathBuf },

    // ── Source errors ─────────────────────────────────────────────────────
    /// The document source returned no document.
    #[error(
        "Document source '{source_name}' failed to create a document object for: {}. Errors: [{}]",
        path.display(),
        errors.join("; ")
    )]
    ConversionFailed {
        source_name: String,
        path: PathBuf,
        errors: Vec<String>,
    },

    /// The document source did not answer within the configured timeout.
    #[error("Document conversion timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The caller cancelled the conversion.
    #[error("Document conversion was cancelled")]
    Cancelled,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the persisted mapping record.
    #[error("Failed to write ingestion output '{}': {source}", path.display())]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (including caught panics).
    #[error("An error occurred during ingestion: {0}")]
    Internal(String),
}

impl IngestError {
    /// Classify this error for [`crate::output::IngestionResult::failure`].
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            IngestError::InputNotFound { .. } => FailureKind::InputNotFound,
            IngestError::ConversionFailed { .. } => FailureKind::ConversionFailure,
            IngestError::Timeout { .. } => FailureKind::Timeout,
            IngestError::Cancelled => FailureKind::Cancelled,
            IngestError::OutputWriteFailed { .. }
            | IngestError::InvalidConfig(_)
            | IngestError::Internal(_) => FailureKind::Unexpected,
        }
    }
}

/// A non-fatal failure to render one element.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ElementError {
    /// The element does not offer the requested rendering at all.
    #[error("element does not support {kind}")]
    Unsupported { kind: String },

    /// The element's rendering call failed.
    #[error("rendering failed: {detail}")]
    RenderFailed { detail: String },

    /// The element carries no readable text.
    #[error("text unavailable: {detail}")]
    TextUnavailable { detail: String },
}

/// Structured failure reported by a document source backend.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SourceError {
    pub message: String,
    /// Every sub-error the engine reported, in the order it reported them.
    pub errors: Vec<String>,
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            errors: vec![message.clone()],
            message,
        }
    }

    pub fn with_errors(message: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            message: message.into(),
            errors,
        }
    }
}

/// Readable text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
