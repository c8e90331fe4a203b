//! Post-processing: deterministic text cleanup.
//!
//! Three independent concerns live here:
//!
//! 1. [`clean_markdown`] — normalises transcribed page Markdown before it is
//!    split into elements (fences, line endings, invisible characters,
//!    missing or duplicated table separators).
//! 2. [`TextCorrections`] — whole-word OCR fixes applied to extracted text
//!    and table markdown. Empty unless configured.
//! 3. [`clean_numeric_cell`] — reduces a table cell to its numeric content
//!    for the persisted matrix.

use crate::error::IngestError;
use crate::pipeline::table::{is_separator_row, is_table_row};
use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all Markdown cleanup rules, in order.
///
/// 1. Normalise line endings (CRLF/CR → LF)
/// 2. Strip outer ```` ```markdown ```` fences
/// 3. Trim trailing whitespace per line
/// 4. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 5. Insert a separator row under table headers that lack one
/// 6. Drop separator rows that appear inside a table body
pub fn clean_markdown(input: &str) -> String {
    let s = input.replace("\r\n", "\n").replace('\r', "\n");
    let s = strip_outer_fences(&s);
    let s = s
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let s = remove_invisible_chars(&s);
    let s = insert_missing_separators(&s);
    remove_body_separators(&s)
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\n(.*)\n```\s*$").unwrap());

fn strip_outer_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

/// A table block whose first two rows are both data rows gets a separator
/// after its first row, sized to the header's cell count.
fn insert_missing_separators(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 4);
    let mut prev_is_table = false;

    for (i, line) in lines.iter().enumerate() {
        out.push((*line).to_string());
        let starts_table = is_table_row(line) && !prev_is_table;
        prev_is_table = is_table_row(line);
        if !starts_table || is_separator_row(line) {
            continue;
        }
        let next = lines.get(i + 1).copied().unwrap_or("");
        if is_table_row(next) && !is_separator_row(next) {
            let cells = line
                .trim()
                .trim_start_matches('|')
                .trim_end_matches('|')
                .split('|')
                .count()
                .max(1);
            let mut sep = String::from("|");
            for _ in 0..cells {
                sep.push_str(" --- |");
            }
            out.push(sep);
        }
    }

    out.join("\n")
}

/// Only the second row of a table block may be a separator.
fn remove_body_separators(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut row_in_table = 0usize;

    for line in input.lines() {
        if is_table_row(line) {
            row_in_table += 1;
            if is_separator_row(line) && row_in_table != 2 {
                continue;
            }
        } else {
            row_in_table = 0;
        }
        out.push(line);
    }

    out.join("\n")
}

// ── OCR corrections ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Correction {
    pattern: Regex,
    replacement: String,
}

/// An ordered list of whole-word replacements for recurring OCR mistakes.
///
/// Matching is on word boundaries, so `t0` is fixed in "due t0 the" but not
/// in "t01".
#[derive(Debug, Clone, Default)]
pub struct TextCorrections {
    corrections: Vec<Correction>,
}

impl TextCorrections {
    /// Build from `(wrong, right)` pairs; `wrong` is matched literally.
    pub fn from_pairs<I, A, B>(pairs: I) -> Result<Self, IngestError>
    where
        I: IntoIterator<Item = (A, B)>,
        A: AsRef<str>,
        B: Into<String>,
    {
        let mut corrections = Vec::new();
        for (wrong, right) in pairs {
            let wrong = wrong.as_ref();
            if wrong.trim().is_empty() {
                return Err(IngestError::InvalidConfig(
                    "OCR correction pattern must not be empty".into(),
                ));
            }
            let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(wrong))).map_err(|e| {
                IngestError::InvalidConfig(format!("OCR correction '{wrong}': {e}"))
            })?;
            corrections.push(Correction {
                pattern,
                replacement: right.into(),
            });
        }
        Ok(Self { corrections })
    }

    /// Corrections observed on scanned Malaysian financial statements.
    ///
    /// Single-letter substitutions (`l`→`1`, `O`→`0`) are intentionally left
    /// out: they corrupt ordinary words.
    pub fn financial_filings() -> Self {
        const PAIRS: &[(&str, &str)] = &[
            ("Kegistration", "Registration"),
            ("Kegistraton", "Registration"),
            ("Kegisrraton", "Registration"),
            ("IVo", "No"),
            ("t0", "to"),
            ("comapny", "company"),
            ("concemn", "concern"),
            ("Zoumpad", "audited"),
            ("tnanaianpeaiod", "financial period"),
        ];
        // Every pattern is a literal word; compilation cannot fail.
        Self::from_pairs(PAIRS.iter().copied()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.corrections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.corrections.len()
    }

    /// Apply every correction in order.
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for c in &self.corrections {
            if c.pattern.is_match(&out) {
                out = c
                    .pattern
                    .replace_all(&out, regex::NoExpand(&c.replacement))
                    .into_owned();
            }
        }
        out
    }
}

// ── Numeric cells ────────────────────────────────────────────────────────

static RE_NON_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9,.\-()\s%]").unwrap());

/// Reduce a table cell to its numeric content.
///
/// Unbalanced parentheses are closed (or opened) after trimming OCR
/// underscores and tildes, then every character outside digits, `,`, `.`,
/// `-`, `(`, `)`, `%` and whitespace is removed. Blank cells are returned
/// unchanged.
pub fn clean_numeric_cell(cell: &str) -> String {
    if cell.trim().is_empty() {
        return cell.to_string();
    }
    let open = cell.matches('(').count();
    let close = cell.matches(')').count();
    let balanced = if open > close {
        format!("{})", cell.trim_end_matches(['_', '~', ' ']))
    } else if close > open {
        format!("({}", cell.trim_start_matches(['_', '~', ' ']))
    } else {
        cell.to_string()
    };
    RE_NON_NUMERIC.replace_all(&balanced, "").trim().to_string()
}
