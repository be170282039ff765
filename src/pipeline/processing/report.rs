use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::error::RecordError;
use crate::metrics::PipelineMetrics;
use crate::types::EntityKind;

/// End-of-phase summary of recoverable per-record problems.
///
/// Records are never reported one by one mid-batch; they are counted here
/// and a bounded number of samples is kept for the operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseReport {
    pub phase: String,
    pub entity: EntityKind,
    pub input: usize,
    pub output: usize,
    /// Duplicates folded into a first-seen record. Not an error.
    pub collapsed: usize,
    pub skipped: BTreeMap<&'static str, usize>,
    pub samples: Vec<RecordError>,
    #[serde(skip)]
    max_samples: usize,
}

impl PhaseReport {
    pub fn new(phase: impl Into<String>, entity: EntityKind, input: usize, max_samples: usize) -> Self {
        Self {
            phase: phase.into(),
            entity,
            input,
            output: 0,
            collapsed: 0,
            skipped: BTreeMap::new(),
            samples: Vec::new(),
            max_samples,
        }
    }

    pub fn record(&mut self, error: RecordError) {
        let label = error.label();
        *self.skipped.entry(label).or_insert(0) += 1;
        PipelineMetrics::record_skipped(self.entity, label);
        if self.samples.len() < self.max_samples {
            self.samples.push(error);
        }
    }

    /// Count a drop that has no `RecordError` (e.g. empty names in dedup).
    pub fn record_drop(&mut self, label: &'static str, count: usize) {
        if count > 0 {
            *self.skipped.entry(label).or_insert(0) += count;
        }
    }

    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    pub fn skipped_count(&self, label: &str) -> usize {
        self.skipped.get(label).copied().unwrap_or(0)
    }

    /// Log the summary once, at the end of the phase.
    pub fn log_summary(&self) {
        info!(
            "{} [{}]: {} in, {} out, {} collapsed, {} skipped",
            self.phase,
            self.entity,
            self.input,
            self.output,
            self.collapsed,
            self.skipped_total()
        );
        for (label, count) in &self.skipped {
            warn!("{} [{}]: {} x {}", self.phase, self.entity, count, label);
        }
        for sample in &self.samples {
            warn!("  sample: {}", sample);
        }
    }
}
