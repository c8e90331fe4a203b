//! JSON snapshot source.
//!
//! Many conversion engines can export their document tree as JSON. A
//! snapshot is the minimal shape this crate needs from such an export:
//!
//! ```json
//! {
//!   "page_count": 3,
//!   "tables": [{ "markdown": "| A | B |\n| --- | --- |\n| 1 | 2 |", "page": 2 }],
//!   "texts":  [{ "text": "Directors' report", "page": 1, "label": "heading" }]
//! }
//! ```
//!
//! An export that records a failed conversion is wrapped in an envelope,
//! `{"document": null, "errors": ["..."]}`, and surfaces as a [`SourceError`].

use crate::error::{ElementError, SourceError};
use crate::source::{Document, DocumentSource, TableElement, TextElement};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// A table entry in a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotTable {
    /// `None` when the engine could not export the table as Markdown.
    #[serde(default)]
    pub markdown: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    /// Export error recorded by the engine for this table.
    #[serde(default)]
    pub error: Option<String>,
}

impl SnapshotTable {
    pub fn new(markdown: impl Into<String>) -> Self {
        Self {
            markdown: Some(markdown.into()),
            ..Self::default()
        }
    }

    pub fn on_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }
}

/// A text entry in a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotText {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    /// Engine label such as `"heading"`, `"paragraph"`, `"list_item"`.
    #[serde(default)]
    pub label: Option<String>,
}

impl SnapshotText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn on_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// An owned, fully materialised document.
///
/// Also the in-memory document model other backends convert into, since
/// engine handles (pdfium documents) cannot outlive their conversion call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    #[serde(default)]
    pub page_count: Option<usize>,
    #[serde(default)]
    pub tables: Vec<SnapshotTable>,
    #[serde(default)]
    pub texts: Vec<SnapshotText>,
    #[serde(default)]
    pub footnotes: Vec<SnapshotText>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl TableElement for SnapshotTable {
    fn render_markdown(&self, _doc: &dyn Document) -> Result<String, ElementError> {
        if let Some(ref detail) = self.error {
            return Err(ElementError::RenderFailed {
                detail: detail.clone(),
            });
        }
        self.markdown.clone().ok_or_else(|| ElementError::Unsupported {
            kind: "markdown export".into(),
        })
    }

    fn page_number(&self) -> Option<u32> {
        self.page
    }
}

impl TextElement for SnapshotText {
    fn plain_text(&self) -> Result<String, ElementError> {
        self.text.clone().ok_or_else(|| ElementError::TextUnavailable {
            detail: "element has no text".into(),
        })
    }

    fn page_number(&self) -> Option<u32> {
        self.page
    }

    fn kind_hint(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl Document for DocumentSnapshot {
    fn tables(&self) -> Vec<&dyn TableElement> {
        self.tables.iter().map(|t| t as &dyn TableElement).collect()
    }

    fn texts(&self) -> Vec<&dyn TextElement> {
        self.texts.iter().map(|t| t as &dyn TextElement).collect()
    }

    fn page_count(&self) -> Option<usize> {
        self.page_count
    }

    fn footnotes(&self) -> Vec<&dyn TextElement> {
        self.footnotes.iter().map(|t| t as &dyn TextElement).collect()
    }

    fn warnings(&self) -> Vec<String> {
        self.warnings.clone()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotFile {
    Envelope {
        document: Option<DocumentSnapshot>,
        errors: Vec<String>,
    },
    Bare(DocumentSnapshot),
}

/// Parse snapshot JSON, honouring the failure envelope.
pub fn parse_snapshot(json: &str) -> Result<DocumentSnapshot, SourceError> {
    let file: SnapshotFile = serde_json::from_str(json)
        .map_err(|e| SourceError::new(format!("invalid document snapshot: {e}")))?;
    match file {
        SnapshotFile::Bare(doc) => Ok(doc),
        SnapshotFile::Envelope {
            document: Some(doc),
            ..
        } => Ok(doc),
        SnapshotFile::Envelope {
            document: None,
            errors,
        } => Err(SourceError::with_errors(
            "snapshot records a failed conversion",
            errors,
        )),
    }
}

/// Reads [`DocumentSnapshot`] JSON files.
#[derive(Debug, Clone, Default)]
pub struct SnapshotSource;

impl SnapshotSource {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentSource for SnapshotSource {
    fn name(&self) -> &str {
        "snapshot"
    }

    fn convert<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Box<dyn Document>, SourceError>> {
        async move {
            let json = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| SourceError::new(format!("cannot read {}: {e}", path.display())))?;
            let doc = parse_snapshot(&json)?;
            debug!(
                "Snapshot {}: {} tables, {} texts",
                path.display(),
                doc.tables.len(),
                doc.texts.len()
            );
            Ok(Box::new(doc) as Box<dyn Document>)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_snapshot() {
        let doc = parse_snapshot(
            r#"{"page_count": 2, "tables": [{"markdown": "| A |", "page": 1}], "texts": [{"text": "hi"}]}"#,
        )
        .unwrap();
        assert_eq!(doc.page_count, Some(2));
        assert_eq!(doc.tables[0].page, Some(1));
        assert_eq!(doc.texts[0].text.as_deref(), Some("hi"));
        assert!(doc.footnotes.is_empty());
    }

    #[test]
    fn envelope_with_document_is_accepted() {
        let doc = parse_snapshot(r#"{"document": {"texts": [{"text": "x"}]}, "errors": []}"#).unwrap();
        assert_eq!(doc.texts.len(), 1);
    }

    #[test]
    fn envelope_without_document_is_a_source_error() {
        let err = parse_snapshot(r#"{"document": null, "errors": ["layout model crashed", "no pages"]}"#)
            .unwrap_err();
        assert_eq!(err.errors, vec!["layout model crashed", "no pages"]);
    }

    #[test]
    fn malformed_json_is_a_source_error() {
        let err = parse_snapshot("{not json").unwrap_err();
        assert!(err.message.contains("invalid document snapshot"));
    }

    #[test]
    fn table_without_markdown_is_unsupported() {
        let doc = DocumentSnapshot::default();
        let t = SnapshotTable::default();
        assert!(matches!(
            t.render_markdown(&doc),
            Err(ElementError::Unsupported { .. })
        ));
    }

    #[test]
    fn table_error_wins_over_markdown() {
        let doc = DocumentSnapshot::default();
        let t = SnapshotTable {
            markdown: Some("| A |".into()),
            page: None,
            error: Some("cell grid inconsistent".into()),
        };
        assert_eq!(
            t.render_markdown(&doc),
            Err(ElementError::RenderFailed {
                detail: "cell grid inconsistent".into()
            })
        );
    }

    #[tokio::test]
    async fn source_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, r#"{"texts": [{"text": "a"}, {"text": "b"}]}"#).unwrap();
        let doc = SnapshotSource::new().convert(&path).await.unwrap();
        assert_eq!(doc.texts().len(), 2);
        assert_eq!(doc.page_count(), None);
    }
}
