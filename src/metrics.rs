//! Pipeline metrics.
//!
//! Counters and histograms are emitted through the `metrics` facade. The
//! binary does not install an exporter, so without a recorder these calls
//! are no-ops; embedding applications can install their own.

use std::time::Instant;

use crate::types::EntityKind;

/// A timing guard that records the phase duration when dropped.
pub struct PhaseTimer {
    start: Instant,
    phase: &'static str,
}

impl PhaseTimer {
    pub fn start(phase: &'static str) -> Self {
        Self {
            start: Instant::now(),
            phase,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        ::metrics::histogram!("oar_phase_duration_seconds", "phase" => self.phase).record(duration);
    }
}

/// Metric emitters for each cleaning and build phase.
pub struct PipelineMetrics;

impl PipelineMetrics {
    pub fn record_normalized(entity: EntityKind, accepted: usize) {
        ::metrics::counter!("oar_records_normalized_total", "entity" => entity.as_str())
            .increment(accepted as u64);
    }

    pub fn record_skipped(entity: EntityKind, reason: &'static str) {
        ::metrics::counter!("oar_records_skipped_total", "entity" => entity.as_str(), "reason" => reason)
            .increment(1);
    }

    pub fn record_dedup(entity: EntityKind, collapsed: usize, dropped_unnamed: usize) {
        ::metrics::counter!("oar_duplicates_collapsed_total", "entity" => entity.as_str())
            .increment(collapsed as u64);
        ::metrics::counter!("oar_unnamed_dropped_total", "entity" => entity.as_str())
            .increment(dropped_unnamed as u64);
    }

    pub fn record_ids_assigned(entity: EntityKind, count: usize) {
        ::metrics::counter!("oar_ids_assigned_total", "entity" => entity.as_str()).increment(count as u64);
    }

    pub fn record_tables(companies: usize, facilities: usize, links: usize) {
        ::metrics::gauge!("oar_table_rows", "table" => "companies").set(companies as f64);
        ::metrics::gauge!("oar_table_rows", "table" => "facilities").set(facilities as f64);
        ::metrics::gauge!("oar_table_rows", "table" => "links").set(links as f64);
    }

    pub fn record_integrity_warning(kind: &'static str) {
        ::metrics::counter!("oar_integrity_warnings_total", "kind" => kind).increment(1);
    }
}
