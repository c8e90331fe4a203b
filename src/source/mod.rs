//! Document sources: anything that turns a file into tables and text.
//!
//! The normalizer never sees a conversion engine directly. It consumes the
//! [`Document`] capability, and each backend provides one via
//! [`DocumentSource::convert`]:
//!
//! | Backend | Input | Tables | Text |
//! |---------|-------|--------|------|
//! | [`snapshot::SnapshotSource`] | JSON export of a converted document | yes | yes |
//! | [`markdown::MarkdownSource`] | Markdown export, pages split by `<!-- page N -->` | yes | yes |
//! | [`pdfium::PdfiumSource`] | PDF text layer | no | yes |
//! | [`vision::VisionSource`] | PDF rasterised and transcribed by a vision LLM | yes | yes |
//!
//! [`AutoSource`] routes each file to one of these by extension.
//!
//! Element rendering is typed: an element that cannot render returns an
//! [`ElementError`] and the normalizer skips it.

pub mod markdown;
pub mod pdfium;
pub mod snapshot;
pub mod vision;

use crate::error::{ElementError, SourceError};
use futures::future::BoxFuture;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// A table-like element.
pub trait TableElement {
    /// Render the table as GFM pipe Markdown. Receives the owning document
    /// for engines whose table export needs document context.
    fn render_markdown(&self, doc: &dyn Document) -> Result<String, ElementError>;

    /// 1-indexed page the table sits on, if known.
    fn page_number(&self) -> Option<u32> {
        None
    }
}

/// A text-like element.
pub trait TextElement {
    fn plain_text(&self) -> Result<String, ElementError>;

    fn page_number(&self) -> Option<u32> {
        None
    }

    /// Best-effort classification such as `"heading"` or `"list_item"`.
    fn kind_hint(&self) -> Option<&str> {
        None
    }
}

/// A converted document. Owned by the agent for one normalization pass.
pub trait Document: Send {
    /// Table elements in reading order.
    fn tables(&self) -> Vec<&dyn TableElement>;

    /// Text elements in reading order.
    fn texts(&self) -> Vec<&dyn TextElement>;

    /// Number of pages, when the engine exposes a page collection.
    fn page_count(&self) -> Option<usize> {
        None
    }

    /// Footnotes recovered outside the main text flow. Appended after the
    /// regular text blocks.
    fn footnotes(&self) -> Vec<&dyn TextElement> {
        Vec::new()
    }

    /// Non-fatal problems the engine hit while converting (e.g. a page that
    /// could not be transcribed).
    fn warnings(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A conversion backend.
///
/// Implementations must be usable from several tasks at once; engines that
/// are not thread-safe create a fresh instance per call.
pub trait DocumentSource: Send + Sync {
    /// Short backend name for logs and error messages.
    fn name(&self) -> &str;

    /// Convert the file at `path`. The future may be dropped at any await
    /// point when the agent's timeout or cancellation fires.
    fn convert<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Box<dyn Document>, SourceError>>;
}

/// Which backend to build for an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// Pick by file extension: `.json` → snapshot, `.md` → markdown, else pdfium.
    #[default]
    Auto,
    Pdfium,
    Vision,
    Markdown,
    Snapshot,
}

impl SourceKind {
    /// Resolve `Auto` against a concrete path.
    pub fn resolve(self, path: &Path) -> SourceKind {
        if self != SourceKind::Auto {
            return self;
        }
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => SourceKind::Snapshot,
            Some("md") | Some("markdown") => SourceKind::Markdown,
            _ => SourceKind::Pdfium,
        }
    }
}

/// Picks a backend per file with [`SourceKind::Auto`] rules.
///
/// PDFs go to the configured PDF backend (text layer or vision).
pub struct AutoSource {
    pdf: Arc<dyn DocumentSource>,
    snapshot: snapshot::SnapshotSource,
    markdown: markdown::MarkdownSource,
}

impl AutoSource {
    pub fn new(pdf: Arc<dyn DocumentSource>) -> Self {
        Self {
            pdf,
            snapshot: snapshot::SnapshotSource::new(),
            markdown: markdown::MarkdownSource::new(),
        }
    }

    fn pick(&self, path: &Path) -> &dyn DocumentSource {
        match SourceKind::Auto.resolve(path) {
            SourceKind::Snapshot => &self.snapshot,
            SourceKind::Markdown => &self.markdown,
            _ => self.pdf.as_ref(),
        }
    }
}

impl DocumentSource for AutoSource {
    fn name(&self) -> &str {
        "auto"
    }

    fn convert<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Box<dyn Document>, SourceError>> {
        let source = self.pick(path);
        debug!("{} → {} source", path.display(), source.name());
        source.convert(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_resolves_by_extension() {
        assert_eq!(SourceKind::Auto.resolve(Path::new("a.json")), SourceKind::Snapshot);
        assert_eq!(SourceKind::Auto.resolve(Path::new("a.MD")), SourceKind::Markdown);
        assert_eq!(SourceKind::Auto.resolve(Path::new("a.pdf")), SourceKind::Pdfium);
        assert_eq!(SourceKind::Auto.resolve(Path::new("noext")), SourceKind::Pdfium);
    }

    #[test]
    fn explicit_kind_is_kept() {
        assert_eq!(SourceKind::Vision.resolve(Path::new("a.json")), SourceKind::Vision);
    }

    #[test]
    fn auto_source_dispatches_by_extension() {
        let auto = AutoSource::new(Arc::new(pdfium::PdfiumSource::new()));
        assert_eq!(auto.pick(Path::new("a.json")).name(), "snapshot");
        assert_eq!(auto.pick(Path::new("a.md")).name(), "markdown");
        assert_eq!(auto.pick(Path::new("a.pdf")).name(), "pdfium");
    }
}
