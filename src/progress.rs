//! Progress-callback trait for per-document ingestion events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::IngestConfigBuilder::progress_callback`] to receive
//! events while a batch runs. The trait is `Send + Sync` because documents
//! are processed concurrently.
//!
//! # Example
//!
//! ```rust
//! use filing_ingest::{IngestConfig, IngestProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl IngestProgressCallback for Counter {
//!     fn on_document_complete(&self, _path: &str, _success: bool, _tables: usize, _texts: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = IngestConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch entry points as each document moves through ingestion.
///
/// All methods have default no-op implementations. `on_document_start` and
/// `on_document_complete` may be called concurrently from different tasks.
pub trait IngestProgressCallback: Send + Sync {
    /// Called once before any document is processed.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called just before a document is handed to the document source.
    fn on_document_start(&self, path: &str) {
        let _ = path;
    }

    /// Called when a document finished, successfully or not.
    fn on_document_complete(&self, path: &str, success: bool, tables: usize, text_blocks: usize) {
        let _ = (path, success, tables, text_blocks);
    }

    /// Called once after every document has been attempted.
    fn on_batch_complete(&self, total_documents: usize, succeeded: usize) {
        let _ = (total_documents, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::IngestConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;
