// Pipeline ingestion: the boundary where extraction output enters the core

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::types::{RawBatch, RawRecord, RawValue};

/// Supplier of a complete raw batch for one run.
///
/// Implementations either hand over every record or fail outright; the core
/// never sees a partial batch.
pub trait RawSource {
    /// Name used in logs
    fn source_name(&self) -> &str;

    /// Produce the full company and facility batches
    fn fetch(&self) -> Result<RawBatch>;
}

/// Raw batch stored as two files on disk, as left behind by the extraction
/// step. `.json` files hold an array of objects, `.csv` files a header row.
#[derive(Debug, Clone)]
pub struct FileSource {
    companies: PathBuf,
    facilities: PathBuf,
}

impl FileSource {
    pub fn new(companies: impl Into<PathBuf>, facilities: impl Into<PathBuf>) -> Self {
        Self {
            companies: companies.into(),
            facilities: facilities.into(),
        }
    }
}

impl RawSource for FileSource {
    fn source_name(&self) -> &str {
        "file"
    }

    fn fetch(&self) -> Result<RawBatch> {
        Ok(RawBatch {
            companies: load_raw_records(&self.companies)?,
            facilities: load_raw_records(&self.facilities)?,
        })
    }
}

/// In-memory source, handy for embedding the pipeline and for tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    batch: RawBatch,
}

impl MemorySource {
    pub fn new(companies: Vec<RawRecord>, facilities: Vec<RawRecord>) -> Self {
        Self {
            batch: RawBatch { companies, facilities },
        }
    }
}

impl RawSource for MemorySource {
    fn source_name(&self) -> &str {
        "memory"
    }

    fn fetch(&self) -> Result<RawBatch> {
        Ok(self.batch.clone())
    }
}

/// Load raw records from a `.json` or `.csv` file.
pub fn load_raw_records(path: impl AsRef<Path>) -> Result<Vec<RawRecord>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(PipelineError::ExtractionFailed(format!(
            "raw input '{}' does not exist",
            path.display()
        )));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let records = match extension.as_deref() {
        Some("json") => load_json(path)?,
        Some("csv") => load_csv(path)?,
        _ => {
            return Err(PipelineError::ExtractionFailed(format!(
                "unsupported raw input format '{}' (expected .json or .csv)",
                path.display()
            )))
        }
    };

    info!("Loaded {} raw records from {}", records.len(), path.display());
    Ok(records)
}

fn load_json(path: &Path) -> Result<Vec<RawRecord>> {
    let reader = BufReader::new(File::open(path)?);
    serde_json::from_reader(reader).map_err(|e| {
        PipelineError::ExtractionFailed(format!("'{}' is not a JSON array of flat objects: {}", path.display(), e))
    })
}

fn load_csv(path: &Path) -> Result<Vec<RawRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = RawRecord::new();
        for (header, cell) in headers.iter().zip(row.iter()) {
            let value = if cell.is_empty() {
                RawValue::Null
            } else {
                RawValue::Text(cell.to_string())
            };
            record = record.with(header, value);
        }
        records.push(record);
    }
    Ok(records)
}
