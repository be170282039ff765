use serde::Serialize;
use thiserror::Error;

use crate::domain::Fingerprint;
use crate::types::EntityKind;

/// Per-record problems found while normalizing a raw batch.
///
/// These never abort a run: the offending record is skipped, counted and
/// sampled into the phase report.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordError {
    #[error("malformed {entity} record #{index}: field '{field}' {reason}")]
    MalformedRecord {
        entity: EntityKind,
        index: usize,
        field: String,
        reason: String,
    },

    #[error("unknown country '{value}' in {entity} record #{index}")]
    UnknownCountry {
        entity: EntityKind,
        index: usize,
        value: String,
    },
}

impl RecordError {
    /// Short label used for counting and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            RecordError::MalformedRecord { .. } => "malformed_record",
            RecordError::UnknownCountry { .. } => "unknown_country",
        }
    }
}

/// Errors that abort a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("identifier collision on {entity} id '{id}': '{existing}' and '{incoming}' truncate to the same id")]
    IdentifierCollision {
        entity: EntityKind,
        id: String,
        existing: Fingerprint,
        incoming: Fingerprint,
    },

    #[error("integrity invariant violated: {0}")]
    IntegrityInvariantViolated(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
