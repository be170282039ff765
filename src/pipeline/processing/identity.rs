use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, error, instrument};

use crate::domain::{CleanRecord, Fingerprint};
use crate::error::{PipelineError, Result};
use crate::metrics::PipelineMetrics;
use crate::types::EntityKind;

/// Hash-derived identifier scheme: SHA-256 of the fingerprint's canonical
/// string, lower-case hex, truncated to a fixed width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdScheme {
    width: usize,
}

impl IdScheme {
    pub fn new(width: usize) -> Self {
        // A SHA-256 digest has 64 hex characters
        Self { width: width.clamp(1, 64) }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn derive(&self, fingerprint: &Fingerprint) -> String {
        let mut hasher = Sha256::new();
        hasher.update(fingerprint.canonical().as_bytes());
        let mut id = hex::encode(hasher.finalize());
        id.truncate(self.width);
        id
    }
}

/// Assigns deterministic ids to deduplicated records and refuses to let two
/// different fingerprints share one truncated id.
#[derive(Debug)]
pub struct IdentifierAssigner {
    entity: EntityKind,
    scheme: IdScheme,
    issued: HashMap<String, Fingerprint>,
}

impl IdentifierAssigner {
    pub fn new(entity: EntityKind, scheme: IdScheme) -> Self {
        Self {
            entity,
            scheme,
            issued: HashMap::new(),
        }
    }

    /// Id for a single fingerprint, checked against everything issued so far
    /// in this run.
    pub fn issue(&mut self, fingerprint: &Fingerprint) -> Result<String> {
        let id = self.scheme.derive(fingerprint);
        match self.issued.get(&id) {
            Some(existing) if existing != fingerprint => {
                error!(
                    "{} id collision on '{}': '{}' vs '{}'",
                    self.entity, id, existing, fingerprint
                );
                Err(PipelineError::IdentifierCollision {
                    entity: self.entity,
                    id,
                    existing: existing.clone(),
                    incoming: fingerprint.clone(),
                })
            }
            Some(_) => Ok(id),
            None => {
                self.issued.insert(id.clone(), fingerprint.clone());
                Ok(id)
            }
        }
    }

    /// Assign ids to every record in order. Any collision aborts the whole
    /// batch; no partially-assigned records are returned.
    #[instrument(skip(self, records), fields(entity = %self.entity, count = records.len()))]
    pub fn assign<T: CleanRecord>(&mut self, mut records: Vec<T>) -> Result<Vec<T>> {
        for record in records.iter_mut() {
            let id = self.issue(&record.fingerprint())?;
            record.assign_id(id);
        }
        debug!("assigned {} {} ids", records.len(), self.entity);
        PipelineMetrics::record_ids_assigned(self.entity, records.len());
        Ok(records)
    }

    pub fn issued_count(&self) -> usize {
        self.issued.len()
    }
}
