//! Extraction validation against ground-truth text.
//!
//! Compares a persisted [`MappingRecord`] with text known to be correct
//! (typically the PDF's own text layer) and reports:
//!
//! - **NumericMismatch**: a numeric-looking table cell whose normalised
//!   value does not occur in the ground truth, e.g. a lost parenthesis in
//!   `(418,988`.
//! - **OcrCorruption**: a text block containing a known OCR misreading.
//! - **MissingContent**: a critical phrase present in the ground truth but
//!   absent from the record.

use crate::error::{IngestError, SourceError};
use crate::output::MappingRecord;
use crate::source::pdfium::{bind_pdfium, open_document};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// One discrepancy between a record and its ground truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ValidationIssue {
    NumericMismatch {
        /// `Table_<i>[row][col]`.
        location: String,
        extracted: String,
        cleaned: String,
    },
    OcrCorruption {
        /// `TextBlock_<i>`.
        location: String,
        wrong: String,
        right: String,
        /// First 100 characters of the block.
        excerpt: String,
    },
    MissingContent {
        phrase: String,
    },
}

impl ValidationIssue {
    pub fn suggestion(&self) -> String {
        match self {
            ValidationIssue::NumericMismatch { .. } => {
                "Check for missing parenthesis or OCR corruption".to_string()
            }
            ValidationIssue::OcrCorruption { wrong, right, .. } => {
                format!("Replace '{wrong}' → '{right}'")
            }
            ValidationIssue::MissingContent { .. } => {
                "Ensure footnote or critical value is captured".to_string()
            }
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::NumericMismatch {
                location,
                extracted,
                ..
            } => write!(f, "[NumericMismatch] {location}: extracted {extracted:?}"),
            ValidationIssue::OcrCorruption {
                location, excerpt, ..
            } => write!(f, "[OcrCorruption] {location}: {excerpt:?}"),
            ValidationIssue::MissingContent { phrase } => {
                write!(f, "[MissingContent] {phrase:?}")
            }
        }
    }
}

/// What to look for.
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    /// `(wrong, right)` whole-word OCR misreadings.
    pub ocr_patterns: Vec<(String, String)>,
    /// Phrases that must survive extraction whenever the ground truth has them.
    pub critical_phrases: Vec<String>,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        const PATTERNS: &[(&str, &str)] = &[
            ("Kegistration", "Registration"),
            ("t0", "to"),
            ("comapny", "company"),
            ("concemn", "concern"),
            ("Zoumpad", "audited"),
            ("tnanaianpeaiod", "financial period"),
        ];
        Self {
            ocr_patterns: PATTERNS
                .iter()
                .map(|(w, r)| (w.to_string(), r.to_string()))
                .collect(),
            critical_phrases: Vec::new(),
        }
    }
}

impl ValidationOptions {
    pub fn with_critical_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.critical_phrases = phrases.into_iter().map(Into::into).collect();
        self
    }
}

static RE_LOOKS_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9,.()]").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static RE_NOT_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9,.\-()]").unwrap());

/// Normalise a numeric string for comparison: drop whitespace, balance
/// parentheses, keep digits, `,`, `.`, `-`, `(`, `)`.
pub fn normalize_numeric(value: &str) -> String {
    let compact = RE_WHITESPACE.replace_all(value, "");
    let open = compact.matches('(').count();
    let close = compact.matches(')').count();
    let balanced = if open > close {
        format!("{compact})")
    } else if close > open {
        format!("({compact}")
    } else {
        compact.into_owned()
    };
    RE_NOT_NUMERIC.replace_all(&balanced, "").into_owned()
}

/// Check `record` against `ground_truth`.
pub fn validate_record(
    record: &MappingRecord,
    ground_truth: &str,
    options: &ValidationOptions,
) -> Result<Vec<ValidationIssue>, IngestError> {
    let mut issues = Vec::new();

    for table in &record.tables {
        for (r, row) in table.data.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                if cell.trim().is_empty() || !RE_LOOKS_NUMERIC.is_match(cell) {
                    continue;
                }
                let cleaned = normalize_numeric(cell);
                if !cleaned.is_empty() && !ground_truth.contains(&cleaned) {
                    issues.push(ValidationIssue::NumericMismatch {
                        location: format!("{}[{r}][{c}]", table.name),
                        extracted: cell.clone(),
                        cleaned,
                    });
                }
            }
        }
    }

    let patterns = options
        .ocr_patterns
        .iter()
        .map(|(wrong, right)| {
            Regex::new(&format!(r"\b{}\b", regex::escape(wrong)))
                .map(|re| (re, wrong, right))
                .map_err(|e| IngestError::InvalidConfig(format!("OCR pattern '{wrong}': {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    for (i, block) in record.text_blocks.iter().enumerate() {
        for (re, wrong, right) in &patterns {
            if re.is_match(&block.text) {
                issues.push(ValidationIssue::OcrCorruption {
                    location: format!("TextBlock_{i}"),
                    wrong: wrong.to_string(),
                    right: right.to_string(),
                    excerpt: block.text.chars().take(100).collect(),
                });
            }
        }
    }

    let haystack = record_text(record);
    for phrase in &options.critical_phrases {
        if ground_truth.contains(phrase.as_str()) && !haystack.contains(phrase.as_str()) {
            issues.push(ValidationIssue::MissingContent {
                phrase: phrase.clone(),
            });
        }
    }

    debug!("Validation of {}: {} issues", record.source_pdf, issues.len());
    Ok(issues)
}

/// All record text, with HTML entities decoded, for phrase search.
fn record_text(record: &MappingRecord) -> String {
    let mut out = String::new();
    for table in &record.tables {
        for row in &table.data {
            out.push_str(&row.join(" "));
            out.push('\n');
        }
    }
    for block in &record.text_blocks {
        out.push_str(&html_escape::decode_html_entities(&block.text));
        out.push('\n');
    }
    out
}

/// Ground-truth text for `path`: the text layer of a PDF, or the contents of
/// any other file as-is.
pub async fn load_ground_truth(path: &Path, password: Option<&str>) -> Result<String, SourceError> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SourceError::new(format!("cannot read {}: {e}", path.display())));
    }

    let path = path.to_path_buf();
    let password = password.map(str::to_string);
    tokio::task::spawn_blocking(move || pdf_text(&path, password.as_deref()))
        .await
        .map_err(|e| SourceError::new(format!("text extraction task failed: {e}")))?
}

fn pdf_text(path: &Path, password: Option<&str>) -> Result<String, SourceError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, path, password)?;
    let mut text = String::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let page_text = page
            .text()
            .map_err(|e| SourceError::new(format!("page {}: {e:?}", idx + 1)))?;
        text.push_str(&page_text.all());
        text.push('\n');
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{MappingTable, MappingTextBlock};

    fn record(cells: &[&[&str]], texts: &[&str]) -> MappingRecord {
        MappingRecord {
            source_pdf: "afs.pdf".into(),
            tables: vec![MappingTable {
                name: "Table_0".into(),
                data: cells
                    .iter()
                    .map(|r| r.iter().map(|c| c.to_string()).collect())
                    .collect(),
                header_row_index: 0,
            }],
            text_blocks: texts
                .iter()
                .map(|t| MappingTextBlock {
                    text: t.to_string(),
                    page_number: None,
                })
                .collect(),
        }
    }

    #[test]
    fn normalize_numeric_balances_parentheses() {
        assert_eq!(normalize_numeric("(418,988"), "(418,988)");
        assert_eq!(normalize_numeric("418,988)"), "(418,988)");
        assert_eq!(normalize_numeric("RM 1 200.50"), "1200.50");
    }

    #[test]
    fn matching_numbers_pass() {
        let rec = record(&[&["Item", "2024"], &["Loss", "(418,988"]], &[]);
        let issues = validate_record(&rec, "Loss for the year (418,988) 2024", &ValidationOptions::default())
            .unwrap();
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn numeric_mismatch_is_located() {
        let rec = record(&[&["Revenue", "1,2OO"]], &[]);
        let issues = validate_record(&rec, "Revenue 1,500", &ValidationOptions::default()).unwrap();
        assert_eq!(
            issues,
            vec![ValidationIssue::NumericMismatch {
                location: "Table_0[0][1]".into(),
                extracted: "1,2OO".into(),
                cleaned: "1,2".into(),
            }]
        );
    }

    #[test]
    fn ocr_corruption_uses_whole_words() {
        let rec = record(&[], &["<p>Kegistration No. 12 due t0 the</p>", "<p>batch t01</p>"]);
        let issues = validate_record(&rec, "", &ValidationOptions::default()).unwrap();
        assert_eq!(issues.len(), 2);
        assert!(matches!(
            &issues[0],
            ValidationIssue::OcrCorruption { location, wrong, .. } if location == "TextBlock_0" && wrong == "Kegistration"
        ));
        assert_eq!(issues[1].suggestion(), "Replace 't0' → 'to'");
    }

    #[test]
    fn missing_phrase_only_when_in_ground_truth() {
        let opts = ValidationOptions::default()
            .with_critical_phrases(["*Deemed interest by virtue of her spouse's interest", "RM418,988"]);
        let rec = record(&[], &["<p>Directors &amp; officers</p>"]);
        let truth = "*Deemed interest by virtue of her spouse's interest in shares";
        let issues = validate_record(&rec, truth, &opts).unwrap();
        assert_eq!(
            issues,
            vec![ValidationIssue::MissingContent {
                phrase: "*Deemed interest by virtue of her spouse's interest".into()
            }]
        );
    }

    #[test]
    fn escaped_text_still_matches_phrases() {
        let opts = ValidationOptions::default().with_critical_phrases(["Bemed & Co"]);
        let rec = record(&[], &["<p>Omesti Bemed &amp; Co</p>"]);
        assert!(validate_record(&rec, "Omesti Bemed & Co", &opts).unwrap().is_empty());
    }

    #[test]
    fn issues_serialise_with_type_tag() {
        let issue = ValidationIssue::MissingContent { phrase: "x".into() };
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["type"], "MissingContent");
    }

    #[tokio::test]
    async fn plain_text_ground_truth_is_read_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("truth.txt");
        std::fs::write(&path, "Revenue 1,200").unwrap();
        assert_eq!(load_ground_truth(&path, None).await.unwrap(), "Revenue 1,200");
    }
}
