use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::domain::{CleanRecord, Fingerprint};
use crate::metrics::PipelineMetrics;
use crate::types::EntityKind;

/// Result of collapsing duplicates in one record set.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupOutcome<T> {
    /// First-seen representatives, in input order
    pub records: Vec<T>,
    /// Records folded into an earlier representative
    pub collapsed: usize,
    /// Records dropped because their normalized name was empty
    pub dropped_unnamed: usize,
}

/// Collapses records sharing a `(normalized_name, country)` fingerprint,
/// keeping the first-seen record of each group.
#[derive(Debug, Clone, Copy)]
pub struct Deduplicator {
    entity: EntityKind,
}

impl Deduplicator {
    pub fn new(entity: EntityKind) -> Self {
        Self { entity }
    }

    #[instrument(skip(self, records), fields(entity = %self.entity, input = records.len()))]
    pub fn dedupe<T: CleanRecord>(&self, records: Vec<T>) -> DedupOutcome<T> {
        let mut kept: Vec<T> = Vec::with_capacity(records.len());
        let mut positions: HashMap<Fingerprint, usize> = HashMap::with_capacity(records.len());
        let mut collapsed = 0;
        let mut dropped_unnamed = 0;

        for record in records {
            // Unnamed records would otherwise all land in one bucket
            if record.normalized_name().is_empty() {
                dropped_unnamed += 1;
                continue;
            }

            let fingerprint = record.fingerprint();
            match positions.get(&fingerprint) {
                Some(&at) => {
                    kept[at].absorb_duplicate(record);
                    collapsed += 1;
                }
                None => {
                    positions.insert(fingerprint, kept.len());
                    kept.push(record);
                }
            }
        }

        debug!(
            "{} dedup: kept {}, collapsed {}, dropped {} unnamed",
            self.entity,
            kept.len(),
            collapsed,
            dropped_unnamed
        );
        PipelineMetrics::record_dedup(self.entity, collapsed, dropped_unnamed);

        DedupOutcome {
            records: kept,
            collapsed,
            dropped_unnamed,
        }
    }
}
