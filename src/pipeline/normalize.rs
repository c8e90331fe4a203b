//! Extraction normalizer: document elements → indexed records.
//!
//! Indices are assigned to *accepted* elements only, in the order the source
//! yields them. An element that fails to render is skipped with a
//! [`Diagnostic`] and never consumes an index, so later elements keep
//! contiguous numbering.

use crate::error::{panic_message, ElementError};
use crate::output::{
    Diagnostic, DiagnosticScope, ExtractedTable, ExtractedTextBlock, DEFAULT_TEXT_TYPE,
};
use crate::pipeline::postprocess::TextCorrections;
use crate::source::{Document, TextElement};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// Text type given to recovered footnotes.
pub const FOOTNOTE_TEXT_TYPE: &str = "footnote";

/// Knobs for [`extract`].
#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    /// Applied to table markdown and plain text before wrapping.
    pub corrections: TextCorrections,
}

/// Everything the normalizer pulled out of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub tables: Vec<ExtractedTable>,
    pub text_blocks: Vec<ExtractedTextBlock>,
    pub page_count: Option<usize>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Walk the document's tables, texts and footnotes.
pub fn extract(doc: &dyn Document, options: &NormalizeOptions) -> Extraction {
    let mut out = Extraction {
        page_count: doc.page_count(),
        ..Extraction::default()
    };

    for (position, element) in doc.tables().into_iter().enumerate() {
        let page_number = element.page_number();
        match guarded(|| element.render_markdown(doc)) {
            Ok(markdown) => out.tables.push(ExtractedTable {
                index: out.tables.len(),
                markdown: correct(&options.corrections, markdown),
                page_number,
            }),
            Err(e) => {
                warn!("Skipping table {} (page {:?}): {}", position, page_number, e);
                out.diagnostics.push(Diagnostic::skipped(
                    DiagnosticScope::Table,
                    position,
                    page_number,
                    &e,
                ));
            }
        }
    }

    push_texts(&mut out, doc.texts(), DiagnosticScope::Text, None, options);
    push_texts(
        &mut out,
        doc.footnotes(),
        DiagnosticScope::Footnote,
        Some(FOOTNOTE_TEXT_TYPE),
        options,
    );

    for warning in doc.warnings() {
        warn!("Source warning: {}", warning);
        out.diagnostics.push(Diagnostic::document(warning));
    }

    debug!(
        "Normalized {} tables, {} text blocks, {} diagnostics",
        out.tables.len(),
        out.text_blocks.len(),
        out.diagnostics.len()
    );
    out
}

/// `forced_type` overrides the element's own hint (footnotes).
fn push_texts(
    out: &mut Extraction,
    elements: Vec<&dyn TextElement>,
    scope: DiagnosticScope,
    forced_type: Option<&str>,
    options: &NormalizeOptions,
) {
    for (position, element) in elements.into_iter().enumerate() {
        let page_number = element.page_number();
        match guarded(|| element.plain_text()) {
            Ok(text) => {
                let text_type = forced_type
                    .or_else(|| element.kind_hint())
                    .unwrap_or(DEFAULT_TEXT_TYPE);
                out.text_blocks.push(ExtractedTextBlock {
                    index: out.text_blocks.len(),
                    html: wrap_paragraph(&correct(&options.corrections, text)),
                    page_number,
                    text_type: Some(text_type.to_string()),
                });
            }
            Err(e) => {
                warn!("Skipping {:?} {} (page {:?}): {}", scope, position, page_number, e);
                out.diagnostics
                    .push(Diagnostic::skipped(scope, position, page_number, &e));
            }
        }
    }
}

/// Run one element call; a panic becomes [`ElementError::RenderFailed`].
fn guarded<T>(call: impl FnOnce() -> Result<T, ElementError>) -> Result<T, ElementError> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        Err(ElementError::RenderFailed {
            detail: format!("element panicked: {}", panic_message(payload.as_ref())),
        })
    })
}

fn correct(corrections: &TextCorrections, text: String) -> String {
    if corrections.is_empty() {
        text
    } else {
        corrections.apply(&text)
    }
}

/// Wrap plain text in a single `<p>` element, escaping `&`, `<` and `>`.
pub fn wrap_paragraph(text: &str) -> String {
    format!("<p>{}</p>", html_escape::encode_text(text))
}
