use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use harvest_core::HarvestRecord;
use harvest_logging::harvest_info;
use serde::Serialize;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub row_count: usize,
    pub column_count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("export directory {} is unusable: {message}", path.display())]
    OutputDir { path: PathBuf, message: String },
    #[error("could not write export: {0}")]
    Io(#[from] io::Error),
    #[error("could not serialize export: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid seller id for a file name: {0:?}")]
    InvalidSellerId(String),
}

#[derive(Serialize)]
struct ExportDocument<'a> {
    columns: &'a [String],
    rows: &'a [HarvestRecord],
}

/// `seller_{id}_{timestamp}.json`; the seller id must be a plain token.
pub fn export_filename(seller_id: &str, timestamp: &str) -> Result<String, ExportError> {
    let valid = !seller_id.is_empty()
        && seller_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ExportError::InvalidSellerId(seller_id.to_string()));
    }
    Ok(format!("seller_{seller_id}_{timestamp}.json"))
}

/// Writes `{"columns": [...], "rows": [...]}` to `dir/filename`.
///
/// Each row is an object whose keys follow `columns`.
pub fn export_records_json(
    dir: &Path,
    filename: &str,
    columns: &[String],
    records: &[HarvestRecord],
) -> Result<ExportSummary, ExportError> {
    let document = ExportDocument {
        columns,
        rows: records,
    };
    let bytes = serde_json::to_vec_pretty(&document)?;

    let path = write_replacing(dir, filename, &bytes)?;
    harvest_info!("Exported {} rows to {}", records.len(), path.display());

    Ok(ExportSummary {
        path,
        row_count: records.len(),
        column_count: columns.len(),
    })
}

/// Writes through a temp file in `dir` and renames it over `dir/filename`,
/// so an existing export is either kept whole or replaced whole.
fn write_replacing(dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf, ExportError> {
    let unusable = |message: String| ExportError::OutputDir {
        path: dir.to_path_buf(),
        message,
    };
    if dir.exists() && !dir.is_dir() {
        return Err(unusable("not a directory".to_string()));
    }
    fs::create_dir_all(dir).map_err(|e| unusable(e.to_string()))?;

    let target = dir.join(filename);
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| unusable(e.to_string()))?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(&target).map_err(|e| ExportError::Io(e.error))?;
    Ok(target)
}
