use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// A delimited file read as plain text cells, before any header handling.
#[derive(Debug, Clone, PartialEq)]
pub struct RawGrid {
    /// File name the grid was read from; used for indicator naming and errors.
    pub source_id: String,
    pub rows: Vec<Vec<String>>,
}

impl RawGrid {
    pub fn new(source_id: &str, rows: Vec<Vec<String>>) -> Self {
        Self {
            source_id: source_id.to_string(),
            rows,
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(col)).map(|s| s.as_str())
    }
}

/// Read a delimited file into a grid of cells.
///
/// Rows may have differing widths. Stray `;` characters left by the export
/// tool are removed, and files that are not valid UTF-8 are read as latin-1.
pub fn read_grid(path: &Path) -> Result<RawGrid> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    let mut latin1_cells = 0usize;
    for result in rdr.byte_records() {
        let record = result?;
        let row: Vec<String> = record
            .iter()
            .map(|field| {
                let text = match std::str::from_utf8(field) {
                    Ok(s) => s.to_string(),
                    Err(_) => {
                        latin1_cells += 1;
                        decode_latin1(field)
                    }
                };
                text.replace(';', "")
            })
            .collect();
        rows.push(row);
    }
    if latin1_cells > 0 {
        debug!(path = %path.display(), cells = latin1_cells, "decoded non-UTF-8 cells as latin-1");
    }
    let source_id = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    Ok(RawGrid { source_id, rows })
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// IFs files to process: the configured list, or every `*.csv` in `dir` in
/// name order.
pub fn list_ifs_files(dir: &Path, config: &PipelineConfig) -> Result<Vec<PathBuf>> {
    if !config.ifs_files.is_empty() {
        let mut files = Vec::with_capacity(config.ifs_files.len());
        for name in &config.ifs_files {
            let path = dir.join(name);
            if !path.is_file() {
                return Err(PipelineError::Config(format!(
                    "configured IFs file '{}' does not exist",
                    path.display()
                )));
            }
            files.push(path);
        }
        return Ok(files);
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    if files.is_empty() {
        warn!(dir = %dir.display(), "no IFs files found");
    }
    Ok(files)
}
