use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, instrument, warn};

use crate::constants;
use crate::domain::{CompanyRecord, Country, FacilityRecord};
use crate::error::{PipelineError, Result};
use crate::metrics::PipelineMetrics;

/// One row of the Companies table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRow {
    pub company_id: String,
    pub raw_name: String,
    pub normalized_name: String,
    pub country: Country,
    /// Number of Link rows pointing at this company
    pub facility_count: usize,
    pub record_source: String,
}

/// One row of the Facilities table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityRow {
    pub facility_id: String,
    pub raw_name: String,
    pub normalized_name: String,
    pub country: Country,
    pub owning_company_ref: Option<String>,
    pub address: Option<String>,
    pub sector: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub record_source: String,
}

/// One row of the Link table (facility belongs to company).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkRow {
    pub company_id: String,
    pub facility_id: String,
    pub relationship_type: String,
}

/// The validated Companies / Facilities / Link triple.
///
/// Only `RelationalBuilder` constructs this type, and it is read-only
/// afterwards, so holders can rely on referential integrity without
/// re-checking it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationalTables {
    companies: Vec<CompanyRow>,
    facilities: Vec<FacilityRow>,
    links: Vec<LinkRow>,
}

impl RelationalTables {
    pub fn companies(&self) -> &[CompanyRow] {
        &self.companies
    }

    pub fn facilities(&self) -> &[FacilityRow] {
        &self.facilities
    }

    pub fn links(&self) -> &[LinkRow] {
        &self.links
    }

    pub fn company(&self, company_id: &str) -> Option<&CompanyRow> {
        self.companies.iter().find(|c| c.company_id == company_id)
    }

    pub fn facility(&self, facility_id: &str) -> Option<&FacilityRow> {
        self.facilities.iter().find(|f| f.facility_id == facility_id)
    }

    /// Company count per country, sorted by country.
    pub fn companies_by_country(&self) -> BTreeMap<Country, usize> {
        let mut counts = BTreeMap::new();
        for company in &self.companies {
            *counts.entry(company.country).or_insert(0) += 1;
        }
        counts
    }
}

/// Non-fatal data-quality findings from the integrity pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityWarningKind {
    /// No owner reference, or none that resolves to a known company
    OrphanFacility,
    /// Duplicates of the facility named several owners that all resolve
    AmbiguousOwner,
}

impl IntegrityWarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrityWarningKind::OrphanFacility => "orphan_facility",
            IntegrityWarningKind::AmbiguousOwner => "ambiguous_owner",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityWarning {
    pub kind: IntegrityWarningKind,
    pub facility_id: String,
    /// Every owner reference the facility carried, first-seen first
    pub owner_refs: Vec<String>,
    pub message: String,
}

/// Summary figures reported alongside the tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildStats {
    pub companies_without_facilities: usize,
    pub facilities_without_company: usize,
    pub avg_facilities_per_company: f64,
    pub max_facilities_per_company: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutcome {
    pub tables: RelationalTables,
    pub warnings: Vec<IntegrityWarning>,
    pub stats: BuildStats,
}

/// Builds the three relational tables from cleaned, id-assigned records and
/// verifies them before handing them out.
#[derive(Debug, Clone)]
pub struct RelationalBuilder {
    record_source: String,
}

impl Default for RelationalBuilder {
    fn default() -> Self {
        Self::new(constants::DEFAULT_RECORD_SOURCE)
    }
}

impl RelationalBuilder {
    pub fn new(record_source: impl Into<String>) -> Self {
        Self {
            record_source: record_source.into(),
        }
    }

    #[instrument(skip_all, fields(companies = companies.len(), facilities = facilities.len()))]
    pub fn build(&self, companies: Vec<CompanyRecord>, facilities: Vec<FacilityRecord>) -> Result<BuildOutcome> {
        let mut company_rows = self.company_rows(companies)?;
        let known: HashMap<String, usize> = company_rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.company_id.clone(), i))
            .collect();

        let mut facility_rows = Vec::with_capacity(facilities.len());
        let mut links = Vec::new();
        let mut warnings = Vec::new();

        for record in facilities {
            let facility_id = record.facility_id.clone().ok_or_else(|| {
                PipelineError::IntegrityInvariantViolated(format!(
                    "facility '{}' reached the builder without an id",
                    record.raw_name
                ))
            })?;

            let owner_refs = owner_references(&record);
            let resolved: Vec<&String> = owner_refs.iter().filter(|r| known.contains_key(*r)).collect();
            let mut owning_company_ref = record.owning_company_ref.clone();

            match resolved.as_slice() {
                [company_id] => {
                    company_rows[known[*company_id]].facility_count += 1;
                    // The row must name the same owner as its Link
                    owning_company_ref = Some((*company_id).clone());
                    links.push(LinkRow {
                        company_id: (*company_id).clone(),
                        facility_id: facility_id.clone(),
                        relationship_type: constants::RELATIONSHIP_OWNERSHIP.to_string(),
                    });
                }
                [] => {
                    let message = if owner_refs.is_empty() {
                        "facility has no owning company reference".to_string()
                    } else {
                        format!("owning company {} not present in Companies", owner_refs.join(", "))
                    };
                    warnings.push(IntegrityWarning {
                        kind: IntegrityWarningKind::OrphanFacility,
                        facility_id: facility_id.clone(),
                        owner_refs: owner_refs.clone(),
                        message,
                    });
                }
                several => {
                    let message = format!(
                        "facility resolves to {} companies: {}",
                        several.len(),
                        several.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                    );
                    warnings.push(IntegrityWarning {
                        kind: IntegrityWarningKind::AmbiguousOwner,
                        facility_id: facility_id.clone(),
                        owner_refs: owner_refs.clone(),
                        message,
                    });
                }
            }

            facility_rows.push(FacilityRow {
                facility_id,
                raw_name: record.raw_name,
                normalized_name: record.normalized_name,
                country: record.country,
                owning_company_ref,
                address: record.address,
                sector: record.sector,
                latitude: record.latitude,
                longitude: record.longitude,
                record_source: self.record_source.clone(),
            });
        }

        let tables = RelationalTables {
            companies: company_rows,
            facilities: facility_rows,
            links,
        };
        verify_integrity(&tables)?;

        for warning in &warnings {
            PipelineMetrics::record_integrity_warning(warning.kind.as_str());
        }
        if !warnings.is_empty() {
            warn!("{} integrity warnings (facilities kept, links omitted)", warnings.len());
        }

        let stats = build_stats(&tables);
        PipelineMetrics::record_tables(tables.companies.len(), tables.facilities.len(), tables.links.len());
        info!(
            "Built tables: {} companies, {} facilities, {} links",
            tables.companies.len(),
            tables.facilities.len(),
            tables.links.len()
        );

        Ok(BuildOutcome { tables, warnings, stats })
    }

    fn company_rows(&self, companies: Vec<CompanyRecord>) -> Result<Vec<CompanyRow>> {
        companies
            .into_iter()
            .map(|record| {
                let company_id = record.company_id.ok_or_else(|| {
                    PipelineError::IntegrityInvariantViolated(format!(
                        "company '{}' reached the builder without an id",
                        record.raw_name
                    ))
                })?;
                Ok(CompanyRow {
                    company_id,
                    raw_name: record.raw_name,
                    normalized_name: record.normalized_name,
                    country: record.country,
                    facility_count: 0,
                    record_source: self.record_source.clone(),
                })
            })
            .collect()
    }
}

/// Distinct owner references of a facility, first-seen first.
fn owner_references(record: &FacilityRecord) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    for r in record.owning_company_ref.iter().chain(record.conflicting_owner_refs.iter()) {
        if !refs.contains(r) {
            refs.push(r.clone());
        }
    }
    refs
}

/// Check every structural guarantee of the table triple. Any failure here
/// means the tables were built wrongly, not that the input was bad.
pub fn verify_integrity(tables: &RelationalTables) -> Result<()> {
    let violated = |msg: String| Err(PipelineError::IntegrityInvariantViolated(msg));

    let mut company_ids = HashSet::with_capacity(tables.companies.len());
    for company in &tables.companies {
        if !company_ids.insert(company.company_id.as_str()) {
            return violated(format!("duplicate company_id '{}'", company.company_id));
        }
    }

    let mut facility_ids: HashMap<&str, &FacilityRow> = HashMap::with_capacity(tables.facilities.len());
    for facility in &tables.facilities {
        if facility_ids.insert(facility.facility_id.as_str(), facility).is_some() {
            return violated(format!("duplicate facility_id '{}'", facility.facility_id));
        }
    }

    let mut linked_facilities = HashSet::with_capacity(tables.links.len());
    let mut link_counts: HashMap<&str, usize> = HashMap::new();
    for link in &tables.links {
        if !company_ids.contains(link.company_id.as_str()) {
            return violated(format!(
                "dangling link: company_id '{}' (facility '{}') not in Companies",
                link.company_id, link.facility_id
            ));
        }
        let Some(facility) = facility_ids.get(link.facility_id.as_str()) else {
            return violated(format!(
                "dangling link: facility_id '{}' not in Facilities",
                link.facility_id
            ));
        };
        if facility.owning_company_ref.as_deref() != Some(link.company_id.as_str()) {
            return violated(format!(
                "facility '{}' names owner {:?} but is linked to '{}'",
                link.facility_id, facility.owning_company_ref, link.company_id
            ));
        }
        if !linked_facilities.insert(link.facility_id.as_str()) {
            return violated(format!(
                "facility '{}' has more than one Link row",
                link.facility_id
            ));
        }
        *link_counts.entry(link.company_id.as_str()).or_insert(0) += 1;
    }

    for company in &tables.companies {
        let linked = link_counts.get(company.company_id.as_str()).copied().unwrap_or(0);
        if company.facility_count != linked {
            return violated(format!(
                "company '{}' facility_count {} disagrees with {} Link rows",
                company.company_id, company.facility_count, linked
            ));
        }
    }

    Ok(())
}

fn build_stats(tables: &RelationalTables) -> BuildStats {
    let companies = tables.companies.len();
    let companies_without_facilities = tables.companies.iter().filter(|c| c.facility_count == 0).count();
    let max_facilities_per_company = tables.companies.iter().map(|c| c.facility_count).max().unwrap_or(0);
    let avg_facilities_per_company = if companies == 0 {
        0.0
    } else {
        tables.links.len() as f64 / companies as f64
    };

    BuildStats {
        companies_without_facilities,
        facilities_without_company: tables.facilities.len() - tables.links.len(),
        avg_facilities_per_company,
        max_facilities_per_company,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company(id: &str, name: &str) -> CompanyRecord {
        CompanyRecord {
            raw_name: name.to_string(),
            normalized_name: name.to_lowercase(),
            country: Country::Morocco,
            company_id: Some(id.to_string()),
        }
    }

    fn facility(id: &str, owner: Option<&str>) -> FacilityRecord {
        FacilityRecord {
            raw_name: format!("Plant {}", id),
            normalized_name: format!("plant {}", id),
            country: Country::Morocco,
            facility_id: Some(id.to_string()),
            owning_company_ref: owner.map(str::to_string),
            conflicting_owner_refs: Vec::new(),
            address: None,
            sector: Some("Textile".to_string()),
            latitude: Some(33.5),
            longitude: Some(-7.6),
        }
    }

    #[test]
    fn test_links_resolved_facilities() {
        let outcome = RelationalBuilder::default()
            .build(
                vec![company("c1", "Acme"), company("c2", "Beta")],
                vec![facility("f1", Some("c1")), facility("f2", Some("c1")), facility("f3", Some("c2"))],
            )
            .unwrap();

        let tables = &outcome.tables;
        assert_eq!(tables.links().len(), 3);
        assert!(outcome.warnings.is_empty());
        assert_eq!(tables.company("c1").unwrap().facility_count, 2);
        assert_eq!(tables.company("c2").unwrap().facility_count, 1);
        assert_eq!(tables.links()[0].relationship_type, "ownership");
        assert_eq!(tables.facility("f1").unwrap().record_source, "OAR Pipeline v1.0");
        assert_eq!(outcome.stats.max_facilities_per_company, 2);
        assert!((outcome.stats.avg_facilities_per_company - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_orphan_facility_is_kept_without_link() {
        let outcome = RelationalBuilder::default()
            .build(vec![], vec![facility("f1", Some("missing"))])
            .unwrap();

        assert_eq!(outcome.tables.facilities().len(), 1);
        assert!(outcome.tables.links().is_empty());
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].kind, IntegrityWarningKind::OrphanFacility);
        assert_eq!(outcome.warnings[0].facility_id, "f1");
        assert_eq!(outcome.warnings[0].owner_refs, vec!["missing".to_string()]);
        assert_eq!(outcome.stats.facilities_without_company, 1);
    }

    #[test]
    fn test_facility_without_owner_is_orphan() {
        let outcome = RelationalBuilder::default()
            .build(vec![company("c1", "Acme")], vec![facility("f1", None)])
            .unwrap();
        assert_eq!(outcome.warnings[0].kind, IntegrityWarningKind::OrphanFacility);
        assert!(outcome.warnings[0].owner_refs.is_empty());
        assert_eq!(outcome.stats.companies_without_facilities, 1);
    }

    #[test]
    fn test_conflicting_owners_that_all_resolve_are_ambiguous() {
        let mut f = facility("f1", Some("c1"));
        f.conflicting_owner_refs.push("c2".to_string());

        let outcome = RelationalBuilder::default()
            .build(vec![company("c1", "Acme"), company("c2", "Beta")], vec![f])
            .unwrap();
        assert!(outcome.tables.links().is_empty());
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].kind, IntegrityWarningKind::AmbiguousOwner);
        assert_eq!(outcome.warnings[0].owner_refs, vec!["c1".to_string(), "c2".to_string()]);
    }

    #[test]
    fn test_conflicting_owner_with_single_resolution_links() {
        let mut f = facility("f1", Some("gone"));
        f.conflicting_owner_refs.push("c1".to_string());

        let outcome = RelationalBuilder::default()
            .build(vec![company("c1", "Acme")], vec![f])
            .unwrap();
        assert_eq!(outcome.tables.links().len(), 1);
        assert_eq!(outcome.tables.links()[0].company_id, "c1");
        assert_eq!(outcome.tables.facility("f1").unwrap().owning_company_ref.as_deref(), Some("c1"));
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_owner_from_later_duplicate_fills_missing_ref() {
        let mut f = facility("f1", None);
        f.conflicting_owner_refs.push("c1".to_string());

        let outcome = RelationalBuilder::default()
            .build(vec![company("c1", "Acme")], vec![f])
            .unwrap();
        let link = &outcome.tables.links()[0];
        let row = outcome.tables.facility("f1").unwrap();
        assert_eq!(row.owning_company_ref.as_deref(), Some(link.company_id.as_str()));
        assert_eq!(link.facility_id, row.facility_id);
    }

    #[test]
    fn test_duplicate_company_ids_are_fatal() {
        let err = RelationalBuilder::default()
            .build(vec![company("c1", "Acme"), company("c1", "Acme Again")], vec![])
            .unwrap_err();
        assert!(matches!(err, PipelineError::IntegrityInvariantViolated(_)));
    }

    #[test]
    fn test_unassigned_ids_are_fatal() {
        let mut f = facility("f1", None);
        f.facility_id = None;
        let err = RelationalBuilder::default().build(vec![], vec![f]).unwrap_err();
        assert!(matches!(err, PipelineError::IntegrityInvariantViolated(_)));
    }

    #[test]
    fn test_verify_integrity_catches_dangling_link() {
        let tables = RelationalTables {
            companies: vec![],
            facilities: vec![],
            links: vec![LinkRow {
                company_id: "c1".to_string(),
                facility_id: "f1".to_string(),
                relationship_type: "ownership".to_string(),
            }],
        };
        let err = verify_integrity(&tables).unwrap_err();
        assert!(err.to_string().contains("dangling link"));
    }

    #[test]
    fn test_verify_integrity_catches_row_link_owner_mismatch() {
        let outcome = RelationalBuilder::default()
            .build(vec![company("c1", "Acme")], vec![facility("f1", Some("c1"))])
            .unwrap();
        let mut tables = outcome.tables;
        tables.facilities[0].owning_company_ref = None;
        let err = verify_integrity(&tables).unwrap_err();
        assert!(matches!(err, PipelineError::IntegrityInvariantViolated(_)));
    }

    #[test]
    fn test_companies_by_country() {
        let mut spanish = company("c2", "Beta");
        spanish.country = Country::Spain;
        let outcome = RelationalBuilder::default()
            .build(vec![company("c1", "Acme"), spanish, company("c3", "Gamma")], vec![])
            .unwrap();
        let counts = outcome.tables.companies_by_country();
        assert_eq!(counts[&Country::Morocco], 2);
        assert_eq!(counts[&Country::Spain], 1);
    }
}
