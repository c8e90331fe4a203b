//! Mapping record: build and write `<stem>_ingested.json`.
//!
//! The record is what the downstream mapping stage reads. Tables are stored
//! as cell matrices (re-parsed from their markdown), text blocks as their
//! HTML with page numbers.

use crate::config::MatrixShape;
use crate::error::IngestError;
use crate::output::{ExtractedTable, ExtractedTextBlock, MappingRecord, MappingTable, MappingTextBlock};
use crate::pipeline::postprocess::clean_numeric_cell;
use crate::pipeline::table::{parse_markdown_table, shape_matrix};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix appended to the source file stem.
pub const RECORD_SUFFIX: &str = "_ingested.json";

/// How table matrices are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordOptions {
    pub matrix_shape: MatrixShape,
    pub clean_numeric_cells: bool,
}

/// Build the mapping record for one document.
pub fn build_record(
    source_pdf: impl Into<String>,
    tables: &[ExtractedTable],
    text_blocks: &[ExtractedTextBlock],
    options: RecordOptions,
) -> MappingRecord {
    MappingRecord {
        source_pdf: source_pdf.into(),
        tables: tables.iter().map(|t| mapping_table(t, options)).collect(),
        text_blocks: text_blocks
            .iter()
            .map(|b| MappingTextBlock {
                text: b.html.clone(),
                page_number: b.page_number,
            })
            .collect(),
    }
}

fn mapping_table(table: &ExtractedTable, options: RecordOptions) -> MappingTable {
    let mut data = shape_matrix(parse_markdown_table(&table.markdown), options.matrix_shape);
    if options.clean_numeric_cells {
        for cell in data.iter_mut().flatten() {
            *cell = clean_numeric_cell(cell);
        }
    }
    MappingTable {
        name: format!("Table_{}", table.index),
        data,
        header_row_index: 0,
    }
}

/// Base name of the source file, as stored in `source_pdf`.
pub fn source_pdf_name(source: &Path) -> String {
    source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.display().to_string())
}

/// `<output_dir>/<stem>_ingested.json`.
pub fn record_path(output_dir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    output_dir.join(format!("{stem}{RECORD_SUFFIX}"))
}

/// Write the record as pretty JSON (2-space indent, non-ASCII verbatim).
///
/// The parent directory is created if needed. The JSON goes to a uniquely
/// named temp file in the same directory, which is then renamed into place:
/// readers never see a partial record, and concurrent writers of the same
/// record never share a temp file.
pub async fn write_record(path: &Path, record: &MappingRecord) -> Result<(), IngestError> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| IngestError::Internal(format!("cannot serialise mapping record: {e}")))?;

    let write_err = |source: std::io::Error| IngestError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
            parent.to_path_buf()
        }
        None => PathBuf::from("."),
    };

    let target = path.to_path_buf();
    let len = json.len();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".ingest-")
            .suffix(".json.tmp")
            .tempfile_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| IngestError::Internal(format!("record write task failed: {e}")))?
    .map_err(write_err)?;

    debug!("Wrote mapping record {} ({} bytes)", path.display(), len);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(index: usize, markdown: &str) -> ExtractedTable {
        ExtractedTable {
            index,
            markdown: markdown.to_string(),
            page_number: None,
        }
    }

    #[test]
    fn record_uses_table_index_names() {
        let tables = vec![table(0, "| A | B |\n| --- | --- |\n| 1 | 2 |"), table(1, "| x |")];
        let texts = vec![ExtractedTextBlock {
            index: 0,
            html: "<p>hello</p>".into(),
            page_number: Some(2),
            text_type: Some("paragraph".into()),
        }];
        let record = build_record("filing.pdf", &tables, &texts, RecordOptions::default());
        assert_eq!(record.source_pdf, "filing.pdf");
        assert_eq!(record.tables[0].name, "Table_0");
        assert_eq!(record.tables[0].data, vec![vec!["A", "B"], vec!["1", "2"]]);
        assert_eq!(record.tables[0].header_row_index, 0);
        assert_eq!(record.tables[1].name, "Table_1");
        assert_eq!(record.text_blocks[0].text, "<p>hello</p>");
        assert_eq!(record.text_blocks[0].page_number, Some(2));
    }

    #[test]
    fn numeric_cleanup_and_padding() {
        let tables = vec![table(0, "| Item | 2024 |\n| Loss | (418,988 |\n| x |")];
        let record = build_record(
            "a.pdf",
            &tables,
            &[],
            RecordOptions {
                matrix_shape: MatrixShape::PadToWidest,
                clean_numeric_cells: true,
            },
        );
        assert_eq!(record.tables[0].data[1], vec!["", "(418,988)"]);
        assert_eq!(record.tables[0].data[2], vec!["", ""]);
    }

    #[test]
    fn paths_from_source_name() {
        let src = Path::new("/filings/Annual Report 2024.pdf");
        assert_eq!(source_pdf_name(src), "Annual Report 2024.pdf");
        assert_eq!(
            record_path(Path::new("out"), src),
            PathBuf::from("out/Annual Report 2024_ingested.json")
        );
    }

    #[tokio::test]
    async fn write_creates_directory_and_keeps_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/report_ingested.json");
        let record = MappingRecord {
            source_pdf: "report.pdf".into(),
            tables: vec![],
            text_blocks: vec![MappingTextBlock {
                text: "<p>Société † RM</p>".into(),
                page_number: None,
            }],
        };
        write_record(&path, &record).await.unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("Société †"));
        assert!(raw.contains("\n  \"source_pdf\": \"report.pdf\""));
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        let back: MappingRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, record);
    }

    #[tokio::test]
    async fn write_into_a_file_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let err = write_record(&blocker.join("x_ingested.json"), &build_record("x", &[], &[], RecordOptions::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::OutputWriteFailed { .. }));
    }

    #[tokio::test]
    async fn concurrent_writers_of_one_record_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x_ingested.json");
        let first = build_record("a/x.pdf", &[table(0, "| A |")], &[], RecordOptions::default());
        let second = build_record("b/x.pdf", &[table(0, "| B |")], &[], RecordOptions::default());

        let (r1, r2) = tokio::join!(write_record(&path, &first), write_record(&path, &second));
        r1.unwrap();
        r2.unwrap();

        let back: MappingRecord =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(back == first || back == second);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
