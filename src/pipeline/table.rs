//! Markdown table → matrix of cell strings.
//!
//! The mapping stage consumes tables as `Vec<Vec<String>>`. The parser is
//! deliberately forgiving: empty or malformed input yields whatever rows can
//! be recognised, never an error.

use crate::config::MatrixShape;

/// Parse a markdown (GFM pipe) table into rows of trimmed cells.
///
/// Blank lines and alignment rows (`| --- | :---: |`) are dropped. One
/// leading and one trailing `|` are stripped from every remaining line
/// before splitting on `|`. Rows keep their own width.
pub fn parse_markdown_table(markdown: &str) -> Vec<Vec<String>> {
    markdown
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_separator_row(line))
        .map(split_row)
        .collect()
}

/// Apply a [`MatrixShape`] policy to a parsed matrix.
pub fn shape_matrix(mut rows: Vec<Vec<String>>, shape: MatrixShape) -> Vec<Vec<String>> {
    match shape {
        MatrixShape::Ragged => rows,
        MatrixShape::PadToWidest => {
            let width = rows.iter().map(Vec::len).max().unwrap_or(0);
            for row in &mut rows {
                row.resize(width, String::new());
            }
            rows
        }
    }
}

/// `true` for a GFM alignment row: a leading pipe followed only by dashes,
/// colons, spaces and pipes, with at least one dash.
pub fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix('|') else {
        return false;
    };
    rest.contains('-')
        && rest
            .chars()
            .all(|c| c == '|' || c == '-' || c == ':' || c == ' ' || c == '\t')
}

/// `true` when the line looks like a pipe-table row (including separators).
pub fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.len() > 1
}

fn split_row(line: &str) -> Vec<String> {
    let inner = line.strip_prefix('|').unwrap_or(line);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(|cell| cell.trim().to_string()).collect()
}
