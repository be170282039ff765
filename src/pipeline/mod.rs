// Cleaning pipeline: ingestion, processing, and export

pub mod export;
pub mod ingestion;
pub mod processing;

use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::domain::CleanRecord;
use crate::error::Result;
use crate::metrics::PhaseTimer;
use crate::types::{EntityKind, RawBatch, RawRecord};
use ingestion::RawSource;
use processing::{
    BuildOutcome, Deduplicator, IdScheme, IdentifierAssigner, PhaseReport, RecordNormalizer, RelationalBuilder,
};

/// Result of a complete pipeline run
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub outcome: BuildOutcome,
    pub reports: Vec<PhaseReport>,
    pub duration_secs: f64,
}

impl PipelineResult {
    /// Compact per-run summary, suitable for logging or printing as JSON
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            companies: self.outcome.tables.companies().len(),
            facilities: self.outcome.tables.facilities().len(),
            links: self.outcome.tables.links().len(),
            integrity_warnings: self.outcome.warnings.len(),
            duplicates_collapsed: self.reports.iter().map(|r| r.collapsed).sum(),
            skipped_records: self.reports.iter().map(PhaseReport::skipped_total).sum(),
            duration_secs: self.duration_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub companies: usize,
    pub facilities: usize,
    pub links: usize,
    pub integrity_warnings: usize,
    pub duplicates_collapsed: usize,
    pub skipped_records: usize,
    pub duration_secs: f64,
}

/// Runs normalize, dedupe, identify and build over one raw batch.
pub struct Pipeline {
    config: PipelineConfig,
    normalizer: RecordNormalizer,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let normalizer = RecordNormalizer::from_config(
            &config.normalizer,
            IdScheme::new(config.identifiers.company_id_width),
        )?;
        Ok(Self { config, normalizer })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetch a batch from `source` and run it. An extraction failure aborts
    /// before any processing starts.
    pub fn run_source(&self, source: &dyn RawSource) -> Result<PipelineResult> {
        info!("Fetching raw batch from {} source", source.source_name());
        let batch = source.fetch()?;
        self.run(batch)
    }

    #[instrument(skip_all, fields(companies = batch.companies.len(), facilities = batch.facilities.len()))]
    pub fn run(&self, batch: RawBatch) -> Result<PipelineResult> {
        let timer = PhaseTimer::start("run");
        let run_id = Uuid::new_v4();
        info!("Starting pipeline run {}", run_id);

        let max_samples = self.config.report.max_error_samples;
        let (companies, company_report) = self.clean(
            EntityKind::Company,
            batch.companies,
            max_samples,
            |raw, n| self.normalizer.normalize_companies(raw, n),
        )?;
        let (facilities, facility_report) = self.clean(
            EntityKind::Facility,
            batch.facilities,
            max_samples,
            |raw, n| self.normalizer.normalize_facilities(raw, n),
        )?;

        let outcome = {
            let _build = PhaseTimer::start("build");
            RelationalBuilder::new(self.config.export.record_source.clone()).build(companies, facilities)?
        };

        for warning in &outcome.warnings {
            warn!("{}: {}", warning.kind.as_str(), warning.message);
        }

        let duration_secs = timer.elapsed_secs();
        info!(
            "Pipeline run {} complete: {} companies, {} facilities, {} links, {} warnings in {:.3}s",
            run_id,
            outcome.tables.companies().len(),
            outcome.tables.facilities().len(),
            outcome.tables.links().len(),
            outcome.warnings.len(),
            duration_secs
        );

        Ok(PipelineResult {
            run_id,
            outcome,
            reports: vec![company_report, facility_report],
            duration_secs,
        })
    }

    /// Normalize, dedupe and assign ids for one entity kind.
    fn clean<T, F>(
        &self,
        entity: EntityKind,
        raw: Vec<RawRecord>,
        max_samples: usize,
        normalize: F,
    ) -> Result<(Vec<T>, PhaseReport)>
    where
        T: CleanRecord,
        F: FnOnce(Vec<RawRecord>, usize) -> (Vec<T>, PhaseReport),
    {
        let (records, mut report) = {
            let _normalize = PhaseTimer::start("normalize");
            normalize(raw, max_samples)
        };

        let deduped = {
            let _dedup = PhaseTimer::start("dedup");
            Deduplicator::new(entity).dedupe(records)
        };
        report.record_drop("empty_name", deduped.dropped_unnamed);
        report.collapsed = deduped.collapsed;
        report.output = deduped.records.len();
        report.log_summary();

        let width = match entity {
            EntityKind::Company => self.config.identifiers.company_id_width,
            EntityKind::Facility => self.config.identifiers.facility_id_width,
        };
        let _identify = PhaseTimer::start("identify");
        let identified = IdentifierAssigner::new(entity, IdScheme::new(width)).assign(deduped.records)?;
        Ok((identified, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::pipeline::ingestion::MemorySource;
    use crate::pipeline::processing::IntegrityWarningKind;

    fn company(name: &str, country: &str) -> RawRecord {
        RawRecord::new().with("company_name", name).with("country", country)
    }

    fn facility(name: &str, country: &str, owner: &str) -> RawRecord {
        RawRecord::new()
            .with("facility_name", name)
            .with("country", country)
            .with("owner_company", owner)
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(PipelineConfig::default()).unwrap()
    }

    #[test]
    fn test_duplicate_companies_collapse_to_one_row() {
        let batch = RawBatch {
            companies: vec![
                company("Acme Textiles", "Morocco"),
                company(" ACME   Textiles ", "Morocco"),
            ],
            facilities: vec![],
        };

        let result = pipeline().run(batch).unwrap();
        let rows = result.outcome.tables.companies();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].normalized_name, "acme textiles");
        assert_eq!(rows[0].company_id.len(), 10);
        assert_eq!(result.reports[0].collapsed, 1);
        assert_eq!(result.reports[0].skipped_total(), 0);
        assert_eq!(result.summary().duplicates_collapsed, 1);
        assert_eq!(result.summary().skipped_records, 0);
    }

    #[test]
    fn test_orphan_facility_is_kept_without_link() {
        let batch = RawBatch {
            companies: vec![company("Acme Textiles", "Morocco")],
            facilities: vec![facility("Casablanca Plant", "Morocco", "Nobody Ltd")],
        };

        let result = pipeline().run(batch).unwrap();
        assert_eq!(result.outcome.tables.facilities().len(), 1);
        assert!(result.outcome.tables.links().is_empty());
        assert_eq!(result.outcome.warnings.len(), 1);
        assert_eq!(result.outcome.warnings[0].kind, IntegrityWarningKind::OrphanFacility);
    }

    #[test]
    fn test_facility_links_to_owner_across_suffix_variants() {
        let batch = RawBatch {
            companies: vec![company("Acme Textiles Ltd", "Morocco")],
            facilities: vec![facility("Casablanca Plant", "Morocco", "ACME TEXTILES")],
        };

        let result = pipeline().run(batch).unwrap();
        let tables = &result.outcome.tables;
        assert_eq!(tables.links().len(), 1);
        assert_eq!(tables.links()[0].company_id, tables.companies()[0].company_id);
        assert_eq!(tables.companies()[0].facility_count, 1);
        assert!(result.outcome.warnings.is_empty());
    }

    #[test]
    fn test_owner_named_only_by_later_duplicate_matches_link() {
        let batch = RawBatch {
            companies: vec![company("Acme", "Spain")],
            facilities: vec![
                RawRecord::new().with("facility_name", "Plant").with("country", "Spain"),
                facility("Plant", "Spain", "Acme"),
            ],
        };

        let result = pipeline().run(batch).unwrap();
        let tables = &result.outcome.tables;
        assert_eq!(tables.links().len(), 1);
        let link = &tables.links()[0];
        let row = tables.facility(&link.facility_id).unwrap();
        assert_eq!(row.owning_company_ref.as_deref(), Some(link.company_id.as_str()));
        assert!(result.outcome.warnings.is_empty());
    }

    #[test]
    fn test_hyphen_placeholder_names_are_dropped() {
        let batch = RawBatch {
            companies: vec![company("-", "Spain"), company("--", "Spain"), company("- -", "Spain")],
            facilities: vec![],
        };

        let result = pipeline().run(batch).unwrap();
        assert!(result.outcome.tables.companies().is_empty());
        assert_eq!(result.reports[0].skipped_count("empty_name"), 3);
    }

    #[test]
    fn test_unknown_country_is_reported_not_fatal() {
        let batch = RawBatch {
            companies: vec![company("Acme", "Atlantis"), company("Beta", "Spain")],
            facilities: vec![],
        };

        let result = pipeline().run(batch).unwrap();
        assert_eq!(result.outcome.tables.companies().len(), 1);
        assert_eq!(result.reports[0].skipped_count("unknown_country"), 1);
        assert_eq!(result.summary().skipped_records, 1);
    }

    #[test]
    fn test_tables_are_identical_across_runs() {
        let batch = RawBatch {
            companies: vec![company("Acme", "Spain"), company("Beta", "Italy")],
            facilities: vec![facility("Plant", "Spain", "Acme")],
        };

        let first = pipeline().run(batch.clone()).unwrap();
        let second = pipeline().run(batch).unwrap();
        assert_eq!(first.outcome.tables, second.outcome.tables);
        assert_ne!(first.run_id, second.run_id);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = PipelineConfig::default();
        config.identifiers.company_id_width = 2;
        assert!(matches!(Pipeline::new(config), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_run_source_uses_fetched_batch() {
        let source = MemorySource::new(vec![company("Acme", "Malta")], vec![]);
        let result = pipeline().run_source(&source).unwrap();
        assert_eq!(result.outcome.tables.companies().len(), 1);
    }
}
