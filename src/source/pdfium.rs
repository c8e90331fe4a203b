//! PDF text-layer source via pdfium.
//!
//! Reads the embedded text of each page and yields one text element per
//! paragraph. No tables: the text layer carries no cell structure. Scanned
//! filings without a text layer produce an empty document; use the vision
//! source for those.
//!
//! pdfium is not safe to drive from async worker threads, so every call
//! binds a fresh instance inside `spawn_blocking`.

use crate::error::SourceError;
use crate::source::snapshot::{DocumentSnapshot, SnapshotText};
use crate::source::{Document, DocumentSource};
use futures::future::BoxFuture;
use futures::FutureExt;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// Reads the native text layer of a PDF.
#[derive(Debug, Clone, Default)]
pub struct PdfiumSource {
    password: Option<String>,
}

impl PdfiumSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// User password for encrypted filings.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

impl DocumentSource for PdfiumSource {
    fn name(&self) -> &str {
        "pdfium"
    }

    fn convert<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Box<dyn Document>, SourceError>> {
        let owned_path = path.to_path_buf();
        let password = self.password.clone();
        async move {
            let doc = tokio::task::spawn_blocking(move || {
                read_text_layer(&owned_path, password.as_deref())
            })
            .await
            .map_err(|e| SourceError::new(format!("text extraction task failed: {e}")))??;
            Ok(Box::new(doc) as Box<dyn Document>)
        }
        .boxed()
    }
}

fn read_text_layer(path: &Path, password: Option<&str>) -> Result<DocumentSnapshot, SourceError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, path, password)?;
    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let mut doc = DocumentSnapshot {
        page_count: Some(total_pages),
        ..DocumentSnapshot::default()
    };

    for (idx, page) in pages.iter().enumerate() {
        let page_num = idx as u32 + 1;
        match page.text() {
            Ok(text) => {
                let paragraphs = split_paragraphs(&text.all());
                debug!("Page {}: {} paragraphs", page_num, paragraphs.len());
                doc.texts.extend(
                    paragraphs
                        .into_iter()
                        .map(|p| SnapshotText::new(p).on_page(page_num)),
                );
            }
            Err(e) => {
                warn!("Page {}: text layer unavailable: {:?}", page_num, e);
                doc.warnings
                    .push(format!("page {page_num}: text layer unavailable: {e:?}"));
            }
        }
    }

    Ok(doc)
}

// ── Shared pdfium helpers ────────────────────────────────────────────────

/// Bind the pdfium library, downloading it into the local cache on first use.
pub(crate) fn bind_pdfium() -> Result<Pdfium, SourceError> {
    pdfium_auto::bind_pdfium_silent()
        .map_err(|e| SourceError::new(format!("PDFium engine unavailable: {e}")))
}

/// Open a PDF, classifying password failures apart from corrupt files.
pub(crate) fn open_document<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, SourceError> {
    pdfium.load_pdf_from_file(path, password).map_err(|e| {
        let detail = format!("{:?}", e);
        if detail.to_ascii_lowercase().contains("password") {
            if password.is_some() {
                SourceError::new(format!("wrong password for {}", path.display()))
            } else {
                SourceError::new(format!("{} is encrypted and needs a password", path.display()))
            }
        } else {
            SourceError::with_errors(
                format!("cannot open {} as PDF", path.display()),
                vec![detail],
            )
        }
    })
}

/// Text inside the bottom `band` fraction of the page.
pub(crate) fn bottom_band_text(page: &PdfPage<'_>, band: f32) -> Result<String, PdfiumError> {
    let text = page.text()?;
    let width = page.width().value;
    let height = page.height().value;
    // PDF user space has its origin at the bottom-left corner.
    let rect = PdfRect::new_from_values(0.0, 0.0, height * band, width);
    Ok(text.inside_rect(rect))
}

/// Lines of a footnote band that start with one of `markers`.
///
/// A line without a marker that directly follows a kept line is treated as
/// its continuation.
pub(crate) fn footnote_lines(band_text: &str, markers: &[String]) -> Vec<String> {
    let mut notes: Vec<String> = Vec::new();
    let mut continuing = false;
    for line in band_text.lines().map(str::trim) {
        if line.is_empty() {
            continuing = false;
            continue;
        }
        if markers.iter().any(|m| line.starts_with(m.as_str())) {
            notes.push(line.to_string());
            continuing = true;
        } else if continuing {
            if let Some(last) = notes.last_mut() {
                last.push(' ');
                last.push_str(line);
            }
        }
    }
    notes
}

/// Split a page's text into paragraphs on blank lines, joining wrapped lines
/// with single spaces.
pub(crate) fn split_paragraphs(page_text: &str) -> Vec<String> {
    let normalised = page_text.replace("\r\n", "\n").replace('\r', "\n");
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in normalised.lines().map(str::trim) {
        if line.is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }
    paragraphs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> Vec<String> {
        vec!["*".into(), "†".into()]
    }

    #[test]
    fn paragraphs_split_on_blank_lines() {
        let text = "STATEMENT OF\r\nFINANCIAL POSITION\r\n\r\nThe directors present\ntheir report.\n\n\n";
        assert_eq!(
            split_paragraphs(text),
            vec!["STATEMENT OF FINANCIAL POSITION", "The directors present their report."]
        );
    }

    #[test]
    fn empty_page_has_no_paragraphs() {
        assert!(split_paragraphs("  \n \n").is_empty());
    }

    #[test]
    fn footnotes_keep_marked_lines() {
        let band = "Page 12\n*Deemed interest by virtue of her spouse's\ninterest in the company.\n\n† pursuant to Section 59";
        assert_eq!(
            footnote_lines(band, &markers()),
            vec![
                "*Deemed interest by virtue of her spouse's interest in the company.",
                "† pursuant to Section 59",
            ]
        );
    }

    #[test]
    fn footnotes_ignore_unmarked_band() {
        assert!(footnote_lines("Page 3 of 40\nCompany No. 1234", &markers()).is_empty());
    }
}
