use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::ExportConfig;
use crate::constants;
use crate::error::Result;
use crate::pipeline::processing::{BuildOutcome, IntegrityWarningKind};

/// Paths of everything written by one export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedArtifacts {
    pub companies: PathBuf,
    pub facilities: PathBuf,
    pub links: PathBuf,
    pub warnings: PathBuf,
    pub summary: PathBuf,
}

#[derive(Debug, Serialize)]
struct DataSummary<'a> {
    metadata: SummaryMetadata<'a>,
    summary: SummaryTotals,
    companies_by_country: BTreeMap<&'static str, usize>,
}

#[derive(Debug, Serialize)]
struct SummaryMetadata<'a> {
    export_date: DateTime<Utc>,
    run_id: Uuid,
    pipeline_version: &'static str,
    data_source: &'a str,
    countries_covered: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct SummaryTotals {
    total_companies: usize,
    total_facilities: usize,
    total_relationships: usize,
    orphan_facilities: usize,
    ambiguous_owners: usize,
    companies_without_facilities: usize,
    avg_facilities_per_company: f64,
    max_facilities_per_company: usize,
}

/// Write the validated tables and their warnings to `output_dir`.
///
/// Table files carry no timestamps, so re-exporting unchanged input gives
/// byte-identical CSVs; only `data_summary.json` records when and which run
/// produced them.
#[instrument(skip(outcome, config), fields(output_dir = %output_dir.display()))]
pub fn export_tables(
    outcome: &BuildOutcome,
    run_id: Uuid,
    config: &ExportConfig,
    output_dir: &Path,
) -> Result<ExportedArtifacts> {
    fs::create_dir_all(output_dir)?;
    let tables = &outcome.tables;

    let artifacts = ExportedArtifacts {
        companies: output_dir.join(constants::COMPANIES_FILE),
        facilities: output_dir.join(constants::FACILITIES_FILE),
        links: output_dir.join(constants::LINKS_FILE),
        warnings: output_dir.join(constants::WARNINGS_FILE),
        summary: output_dir.join(constants::SUMMARY_FILE),
    };

    write_csv(&artifacts.companies, tables.companies())?;
    write_csv(&artifacts.facilities, tables.facilities())?;
    write_csv(&artifacts.links, tables.links())?;
    write_json(&artifacts.warnings, &outcome.warnings)?;

    let by_country = tables.companies_by_country();
    let count_warnings = |kind: IntegrityWarningKind| outcome.warnings.iter().filter(|w| w.kind == kind).count();
    let summary = DataSummary {
        metadata: SummaryMetadata {
            export_date: Utc::now(),
            run_id,
            pipeline_version: constants::PIPELINE_VERSION,
            data_source: &config.data_source,
            countries_covered: by_country.keys().map(|c| c.name()).collect(),
        },
        summary: SummaryTotals {
            total_companies: tables.companies().len(),
            total_facilities: tables.facilities().len(),
            total_relationships: tables.links().len(),
            orphan_facilities: count_warnings(IntegrityWarningKind::OrphanFacility),
            ambiguous_owners: count_warnings(IntegrityWarningKind::AmbiguousOwner),
            companies_without_facilities: outcome.stats.companies_without_facilities,
            avg_facilities_per_company: outcome.stats.avg_facilities_per_company,
            max_facilities_per_company: outcome.stats.max_facilities_per_company,
        },
        companies_by_country: by_country.iter().map(|(c, n)| (c.name(), *n)).collect(),
    };
    write_json(&artifacts.summary, &summary)?;

    info!(
        "Exported {} companies, {} facilities, {} links to {}",
        tables.companies().len(),
        tables.facilities().len(),
        tables.links().len(),
        output_dir.display()
    );
    Ok(artifacts)
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}
