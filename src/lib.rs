pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod types;

pub use config::{CountryTable, PipelineConfig};
pub use domain::{CleanRecord, CompanyRecord, Country, FacilityRecord, Fingerprint};
pub use error::{PipelineError, RecordError, Result};
pub use pipeline::export::{export_tables, ExportedArtifacts};
pub use pipeline::ingestion::{load_raw_records, FileSource, MemorySource, RawSource};
pub use pipeline::{Pipeline, PipelineResult, RunSummary};
pub use types::{EntityKind, RawBatch, RawRecord, RawValue};
