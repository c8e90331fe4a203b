//! Input check: the path must name an existing regular file.
//!
//! Nothing else is validated here. Whether the file is a readable PDF (or
//! snapshot, or Markdown export) is the document source's call, and its
//! failure is reported as a conversion failure rather than a missing input.

use crate::error::IngestError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Confirm `path` is an existing regular file.
///
/// Symlinks are followed. Directories, dangling links and unreadable
/// metadata all count as "not found or not a file".
pub async fn check_input(path: &Path) -> Result<PathBuf, IngestError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {
            debug!("Input ok: {} ({} bytes)", path.display(), meta.len());
            Ok(path.to_path_buf())
        }
        _ => Err(IngestError::InputNotFound {
            path: path.to_path_buf(),
        }),
    }
}
