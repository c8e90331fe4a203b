//! Markdown source and the shared page segmenter.
//!
//! Converters that emit Markdown (including the vision backend in this
//! crate) produce one string per page. [`segment_markdown`] splits such a
//! string into table blocks and text blocks with a best-effort kind:
//!
//! | Markdown | Element | Hint |
//! |----------|---------|------|
//! | consecutive `|` rows | table | — |
//! | `# …` to `###### …` | text | `heading` |
//! | `- …`, `* …`, `1. …` | text | `list_item` |
//! | fenced block | text | `code` |
//! | anything else, split on blank lines | text | `paragraph` |
//!
//! [`MarkdownSource`] reads a whole export from disk. Pages are separated by
//! `<!-- page N -->` comments or form feeds.

use crate::error::SourceError;
use crate::pipeline::table::is_table_row;
use crate::source::snapshot::{DocumentSnapshot, SnapshotTable, SnapshotText};
use crate::source::{Document, DocumentSource};
use futures::future::BoxFuture;
use futures::FutureExt;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::debug;

/// One block of a segmented page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkdownBlock {
    Table(String),
    Text { text: String, kind: &'static str },
}

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s+(.*?)(?:\s+#+)?\s*$").unwrap());
static RE_LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*+]|\d{1,3}[.)])\s+(.*)$").unwrap());
static RE_PAGE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*<!--\s*page\s+(\d+)\s*-->\s*$").unwrap());
static RE_STRONG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*|__(.+?)__").unwrap());

/// Split one page of Markdown into blocks, in reading order.
pub fn segment_markdown(markdown: &str) -> Vec<MarkdownBlock> {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut table: Vec<&str> = Vec::new();
    let mut code: Option<Vec<&str>> = None;

    for line in markdown.lines() {
        let trimmed = line.trim();

        if let Some(ref mut code_lines) = code {
            if trimmed.starts_with("```") {
                let text = code_lines.join("\n");
                if !text.trim().is_empty() {
                    blocks.push(MarkdownBlock::Text { text, kind: "code" });
                }
                code = None;
            } else {
                code_lines.push(line);
            }
            continue;
        }

        if is_table_row(trimmed) {
            flush_paragraph(&mut paragraph, &mut blocks);
            table.push(trimmed);
            continue;
        }
        flush_table(&mut table, &mut blocks);

        if trimmed.is_empty() || (trimmed.starts_with("<!--") && trimmed.ends_with("-->")) {
            flush_paragraph(&mut paragraph, &mut blocks);
        } else if trimmed.starts_with("```") {
            flush_paragraph(&mut paragraph, &mut blocks);
            code = Some(Vec::new());
        } else if let Some(caps) = RE_HEADING.captures(trimmed) {
            flush_paragraph(&mut paragraph, &mut blocks);
            push_text(&mut blocks, &caps[1], "heading");
        } else if let Some(caps) = RE_LIST_ITEM.captures(line) {
            flush_paragraph(&mut paragraph, &mut blocks);
            push_text(&mut blocks, &caps[1], "list_item");
        } else {
            paragraph.push(trimmed);
        }
    }

    flush_table(&mut table, &mut blocks);
    flush_paragraph(&mut paragraph, &mut blocks);
    if let Some(code_lines) = code {
        // Unterminated fence: keep the content rather than drop it.
        let text = code_lines.join("\n");
        if !text.trim().is_empty() {
            blocks.push(MarkdownBlock::Text { text, kind: "code" });
        }
    }
    blocks
}

fn flush_table(table: &mut Vec<&str>, blocks: &mut Vec<MarkdownBlock>) {
    if !table.is_empty() {
        blocks.push(MarkdownBlock::Table(table.join("\n")));
        table.clear();
    }
}

fn flush_paragraph(paragraph: &mut Vec<&str>, blocks: &mut Vec<MarkdownBlock>) {
    if !paragraph.is_empty() {
        let joined = paragraph.join(" ");
        push_text(blocks, &joined, "paragraph");
        paragraph.clear();
    }
}

fn push_text(blocks: &mut Vec<MarkdownBlock>, raw: &str, kind: &'static str) {
    let text = strip_strong(raw.trim());
    if !text.is_empty() {
        blocks.push(MarkdownBlock::Text { text, kind });
    }
}

/// Drop `**bold**` / `__bold__` markers. Single `*` is left alone: filings
/// use it as a footnote marker.
fn strip_strong(text: &str) -> String {
    RE_STRONG
        .replace_all(text, |caps: &regex::Captures<'_>| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        })
        .into_owned()
}

/// Split a multi-page export into `(page_number, markdown)` pairs.
///
/// Returns a single `(None, whole)` pair when the export has no page markers.
pub fn split_pages(markdown: &str) -> Vec<(Option<u32>, String)> {
    if markdown.contains('\u{000C}') {
        let mut pages: Vec<&str> = markdown.split('\u{000C}').collect();
        // Text exports terminate every page with a form feed.
        if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
            pages.pop();
        }
        return pages
            .into_iter()
            .enumerate()
            .map(|(i, page)| (Some(i as u32 + 1), page.to_string()))
            .collect();
    }

    let markers: Vec<_> = RE_PAGE_MARKER.captures_iter(markdown).collect();
    if markers.is_empty() {
        return vec![(None, markdown.to_string())];
    }

    let mut pages = Vec::with_capacity(markers.len() + 1);
    let Some(first) = markers[0].get(0) else {
        return vec![(None, markdown.to_string())];
    };
    let first_page: Option<u32> = markers[0][1].parse().ok();
    let leading = &markdown[..first.start()];
    if !leading.trim().is_empty() {
        // Separators sit between pages, so content before the first marker
        // is the page preceding it.
        let page = first_page.and_then(|p| p.checked_sub(1)).filter(|p| *p >= 1);
        pages.push((page, leading.to_string()));
    }

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), page) = (caps.get(0), caps[1].parse::<u32>().ok()) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(markdown.len());
        pages.push((page, markdown[whole.end()..end].to_string()));
    }
    pages
}

/// Build a document from per-page Markdown.
pub fn snapshot_from_pages(pages: &[(Option<u32>, String)]) -> DocumentSnapshot {
    let mut doc = DocumentSnapshot::default();
    for (page, markdown) in pages {
        for block in segment_markdown(markdown) {
            match block {
                MarkdownBlock::Table(md) => doc.tables.push(SnapshotTable {
                    markdown: Some(md),
                    page: *page,
                    error: None,
                }),
                MarkdownBlock::Text { text, kind } => doc.texts.push(SnapshotText {
                    text: Some(text),
                    page: *page,
                    label: Some(kind.to_string()),
                }),
            }
        }
    }
    doc.page_count = pages.iter().filter_map(|(p, _)| *p).max().map(|p| p as usize);
    doc
}

/// Reads Markdown exports from disk.
#[derive(Debug, Clone, Default)]
pub struct MarkdownSource;

impl MarkdownSource {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentSource for MarkdownSource {
    fn name(&self) -> &str {
        "markdown"
    }

    fn convert<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Box<dyn Document>, SourceError>> {
        async move {
            let markdown = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| SourceError::new(format!("cannot read {}: {e}", path.display())))?;
            let pages = split_pages(&markdown);
            let doc = snapshot_from_pages(&pages);
            debug!(
                "Markdown {}: {} pages, {} tables, {} texts",
                path.display(),
                pages.len(),
                doc.tables.len(),
                doc.texts.len()
            );
            Ok(Box::new(doc) as Box<dyn Document>)
        }
        .boxed()
    }
}
