use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument};

use crate::config::{CountryTable, NormalizerConfig};
use crate::constants;
use crate::domain::{CompanyRecord, Country, FacilityRecord, Fingerprint};
use crate::error::{RecordError, Result};
use crate::metrics::PipelineMetrics;
use crate::pipeline::processing::identity::IdScheme;
use crate::pipeline::processing::report::PhaseReport;
use crate::types::{EntityKind, RawRecord};

/// Anything that is not a letter, digit, combining mark, whitespace or hyphen.
static PUNCTUATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^\p{Alphabetic}\p{N}\p{M}\s-]").expect("punctuation pattern is valid")
});

/// Converts raw extraction records into typed, normalized company and
/// facility records.
///
/// The normalizer holds only immutable configuration, so the same raw record
/// always yields the same output. Facility owners are resolved to company
/// ids here using the company id scheme, which keeps the reference stable
/// across runs without a lookup into the company batch.
#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    countries: CountryTable,
    legal_suffixes: Vec<Vec<String>>,
    company_ids: IdScheme,
}

impl RecordNormalizer {
    pub fn new(countries: CountryTable, legal_suffixes: &[String], company_ids: IdScheme) -> Self {
        let legal_suffixes = legal_suffixes
            .iter()
            .map(|suffix| tokens(suffix))
            .filter(|t| !t.is_empty())
            .collect();
        Self {
            countries,
            legal_suffixes,
            company_ids,
        }
    }

    pub fn from_config(config: &NormalizerConfig, company_ids: IdScheme) -> Result<Self> {
        Ok(Self::new(config.country_table()?, &config.legal_suffixes, company_ids))
    }

    /// Canonical matching form of a name: lower-cased, punctuation replaced by
    /// spaces, whitespace collapsed, trailing legal-form suffixes removed.
    /// May return an empty string; the dedup phase drops those records.
    pub fn normalize_name(&self, raw: &str) -> String {
        let mut words = tokens(raw);

        // Strip to a fixed point so that normalizing twice changes nothing
        loop {
            let before = words.len();
            for suffix in &self.legal_suffixes {
                if words.len() > suffix.len() && words.ends_with(suffix) {
                    words.truncate(words.len() - suffix.len());
                }
            }
            if words.len() == before {
                break;
            }
        }

        words.join(" ")
    }

    pub fn normalize_country(&self, raw: &str) -> Option<Country> {
        self.countries.resolve(raw)
    }

    pub fn normalize_company(&self, index: usize, raw: &RawRecord) -> std::result::Result<CompanyRecord, RecordError> {
        let entity = EntityKind::Company;
        let raw_name = required_text(raw, constants::COMPANY_NAME_FIELDS, entity, index, "name")?;
        let country = self.required_country(raw, entity, index)?;

        Ok(CompanyRecord {
            normalized_name: self.normalize_name(&raw_name),
            raw_name,
            country,
            company_id: None,
        })
    }

    pub fn normalize_facility(&self, index: usize, raw: &RawRecord) -> std::result::Result<FacilityRecord, RecordError> {
        let entity = EntityKind::Facility;
        let raw_name = required_text(raw, constants::FACILITY_NAME_FIELDS, entity, index, "facility_name")?;
        let country = self.required_country(raw, entity, index)?;
        let latitude = coordinate(raw, constants::LATITUDE_FIELDS, 90.0, index)?;
        let longitude = coordinate(raw, constants::LONGITUDE_FIELDS, 180.0, index)?;

        Ok(FacilityRecord {
            normalized_name: self.normalize_name(&raw_name),
            raw_name,
            country,
            facility_id: None,
            owning_company_ref: self.owner_reference(index, raw, country),
            conflicting_owner_refs: Vec::new(),
            address: optional_text(raw, constants::ADDRESS_FIELDS),
            sector: optional_text(raw, constants::SECTOR_FIELDS),
            latitude,
            longitude,
        })
    }

    /// Normalize a whole company batch, skipping and counting bad records.
    #[instrument(skip(self, raw), fields(input = raw.len()))]
    pub fn normalize_companies(&self, raw: Vec<RawRecord>, max_samples: usize) -> (Vec<CompanyRecord>, PhaseReport) {
        self.normalize_batch(raw, EntityKind::Company, max_samples, |i, r| self.normalize_company(i, r))
    }

    /// Normalize a whole facility batch, skipping and counting bad records.
    #[instrument(skip(self, raw), fields(input = raw.len()))]
    pub fn normalize_facilities(&self, raw: Vec<RawRecord>, max_samples: usize) -> (Vec<FacilityRecord>, PhaseReport) {
        self.normalize_batch(raw, EntityKind::Facility, max_samples, |i, r| self.normalize_facility(i, r))
    }

    fn normalize_batch<T>(
        &self,
        raw: Vec<RawRecord>,
        entity: EntityKind,
        max_samples: usize,
        normalize_one: impl Fn(usize, &RawRecord) -> std::result::Result<T, RecordError>,
    ) -> (Vec<T>, PhaseReport) {
        let mut report = PhaseReport::new("normalize", entity, raw.len(), max_samples);
        let mut cleaned = Vec::with_capacity(raw.len());

        for (index, record) in raw.iter().enumerate() {
            match normalize_one(index, record) {
                Ok(record) => cleaned.push(record),
                Err(e) => report.record(e),
            }
        }

        report.output = cleaned.len();
        PipelineMetrics::record_normalized(entity, cleaned.len());
        (cleaned, report)
    }

    fn required_country(&self, raw: &RawRecord, entity: EntityKind, index: usize) -> std::result::Result<Country, RecordError> {
        let value = required_text(raw, constants::COUNTRY_FIELDS, entity, index, "country")?;
        self.normalize_country(&value)
            .ok_or(RecordError::UnknownCountry { entity, index, value })
    }

    fn owner_reference(&self, index: usize, raw: &RawRecord, facility_country: Country) -> Option<String> {
        let owner_name = self.normalize_name(&raw.first_text(constants::FACILITY_OWNER_FIELDS)?);
        if owner_name.is_empty() {
            return None;
        }

        let owner_country = match raw.first_text(constants::OWNER_COUNTRY_FIELDS) {
            Some(value) => match self.normalize_country(&value) {
                Some(country) => country,
                None => {
                    debug!("facility #{}: owner country '{}' unresolved, no owner reference", index, value);
                    return None;
                }
            },
            None => facility_country,
        };

        Some(self.company_ids.derive(&Fingerprint::new(owner_name, owner_country)))
    }
}

fn tokens(raw: &str) -> Vec<String> {
    let lowered = raw.to_lowercase();
    PUNCTUATION
        .replace_all(&lowered, " ")
        .split_whitespace()
        // Bare hyphens are placeholders, not names
        .filter(|t| t.chars().any(char::is_alphanumeric))
        .map(str::to_string)
        .collect()
}

fn required_text(
    raw: &RawRecord,
    keys: &[&str],
    entity: EntityKind,
    index: usize,
    field: &str,
) -> std::result::Result<String, RecordError> {
    raw.first_text(keys).ok_or_else(|| match raw.first_nested(keys) {
        Some(key) => RecordError::MalformedRecord {
            entity,
            index,
            field: key.to_string(),
            reason: "is an array or object, not a scalar".to_string(),
        },
        None => RecordError::MalformedRecord {
            entity,
            index,
            field: field.to_string(),
            reason: "is missing or empty".to_string(),
        },
    })
}

fn optional_text(raw: &RawRecord, keys: &[&str]) -> Option<String> {
    raw.first_text(keys).map(|s| s.trim().to_string())
}

fn coordinate(raw: &RawRecord, keys: &[&str], bound: f64, index: usize) -> std::result::Result<Option<f64>, RecordError> {
    let Some((field, value)) = raw.first_present(keys) else {
        return Ok(None);
    };
    let malformed = |reason: String| RecordError::MalformedRecord {
        entity: EntityKind::Facility,
        index,
        field: field.clone(),
        reason,
    };

    match value.as_number() {
        Ok(Some(n)) if n.is_finite() && n.abs() <= bound => Ok(Some(n)),
        Ok(Some(n)) => Err(malformed(format!("is out of range: {}", n))),
        Ok(None) => Ok(None),
        Err(()) => Err(malformed(match value.as_text() {
            Some(text) => format!("is not numeric: {}", text),
            None => "is an array or object, not a number".to_string(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CountryTable;
    use crate::types::RawValue;

    fn company_as_raw(record: &CompanyRecord) -> RawRecord {
        RawRecord::new()
            .with("name", record.normalized_name.as_str())
            .with("country", RawValue::Text(record.country.name().to_string()))
    }

    fn normalizer() -> RecordNormalizer {
        RecordNormalizer::from_config(&NormalizerConfig::default(), IdScheme::new(10)).unwrap()
    }

    fn company(name: &str, country: &str) -> RawRecord {
        RawRecord::new().with("name", name).with("country", country)
    }

    #[test]
    fn test_name_normalization_rules() {
        let n = normalizer();
        assert_eq!(n.normalize_name(" ACME   Textiles "), "acme textiles");
        assert_eq!(n.normalize_name("Acme,Textiles!"), "acme textiles");
        assert_eq!(n.normalize_name("Fès-Textile (Maroc)"), "fès-textile maroc");
        assert_eq!(n.normalize_name("Tessuti 2000"), "tessuti 2000");
        assert_eq!(n.normalize_name("!!!"), "");
        assert_eq!(n.normalize_name("-"), "");
        assert_eq!(n.normalize_name("- -"), "");
        assert_eq!(n.normalize_name("Acme -- Textiles"), "acme textiles");
    }

    #[test]
    fn test_legal_suffixes_stripped_to_fixed_point() {
        let n = normalizer();
        assert_eq!(n.normalize_name("Acme Textiles Ltd."), "acme textiles");
        assert_eq!(n.normalize_name("Acme Textiles S.A."), "acme textiles");
        assert_eq!(n.normalize_name("Acme Corp Inc"), "acme");
        // Never strip a name down to nothing
        assert_eq!(n.normalize_name("Inc"), "inc");
        // Only whole trailing words
        assert_eq!(n.normalize_name("Casa"), "casa");
    }

    #[test]
    fn test_empty_suffix_list_disables_stripping() {
        let n = RecordNormalizer::new(CountryTable::default(), &[], IdScheme::new(10));
        assert_eq!(n.normalize_name("Acme Ltd"), "acme ltd");
    }

    #[test]
    fn test_company_example_normalizes_to_same_name() {
        let n = normalizer();
        let a = n.normalize_company(0, &company("Acme Textiles", "Morocco")).unwrap();
        let b = n.normalize_company(1, &company(" ACME   Textiles ", "Morocco")).unwrap();
        assert_eq!(a.normalized_name, "acme textiles");
        assert_eq!(a.normalized_name, b.normalized_name);
        assert_eq!(a.raw_name, "Acme Textiles");
        assert_eq!(b.raw_name, " ACME   Textiles ");
        assert_eq!(a.company_id, None);
    }

    #[test]
    fn test_country_alias_and_rejection() {
        let n = normalizer();
        let rec = n.normalize_company(0, &company("Atlas", "Marruecos")).unwrap();
        assert_eq!(rec.country, Country::Morocco);

        let err = n.normalize_company(3, &company("Atlas", "Atlantis")).unwrap_err();
        assert_eq!(
            err,
            RecordError::UnknownCountry {
                entity: EntityKind::Company,
                index: 3,
                value: "Atlantis".to_string()
            }
        );
    }

    #[test]
    fn test_missing_fields_are_malformed() {
        let n = normalizer();
        let err = n.normalize_company(0, &RawRecord::new().with("country", "Spain")).unwrap_err();
        assert!(matches!(err, RecordError::MalformedRecord { ref field, .. } if field == "name"));

        let err = n.normalize_company(1, &company("   ", "Spain")).unwrap_err();
        assert_eq!(err.label(), "malformed_record");

        let err = n.normalize_company(2, &RawRecord::new().with("name", "Acme")).unwrap_err();
        assert!(matches!(err, RecordError::MalformedRecord { ref field, .. } if field == "country"));
    }

    #[test]
    fn test_numeric_name_is_accepted() {
        let n = normalizer();
        let raw = RawRecord::new().with("name", 3000.0).with("country", "Malta");
        let rec = n.normalize_company(0, &raw).unwrap();
        assert_eq!(rec.raw_name, "3000");
        assert_eq!(rec.normalized_name, "3000");
    }

    #[test]
    fn test_facility_owner_reference_uses_company_scheme() {
        let n = normalizer();
        let raw = RawRecord::new()
            .with("facility_name", "Plant One")
            .with("company_name", "ACME Textiles Ltd")
            .with("country", "Maroc")
            .with("lat", "33.5")
            .with("lon", -7.6)
            .with("sector", "Textile");
        let facility = n.normalize_facility(0, &raw).unwrap();

        let expected = IdScheme::new(10).derive(&Fingerprint::new("acme textiles", Country::Morocco));
        assert_eq!(facility.owning_company_ref, Some(expected));
        assert_eq!(facility.latitude, Some(33.5));
        assert_eq!(facility.longitude, Some(-7.6));
        assert_eq!(facility.sector.as_deref(), Some("Textile"));
        assert_eq!(facility.address, None);
    }

    #[test]
    fn test_facility_owner_country_override() {
        let n = normalizer();
        let raw = RawRecord::new()
            .with("facility_name", "Plant One")
            .with("company_name", "Acme")
            .with("owner_country", "Italia")
            .with("country", "Spain");
        let facility = n.normalize_facility(0, &raw).unwrap();
        let expected = IdScheme::new(10).derive(&Fingerprint::new("acme", Country::Italy));
        assert_eq!(facility.owning_company_ref, Some(expected));

        let raw = raw.with("owner_country", "Atlantis");
        let facility = n.normalize_facility(0, &raw).unwrap();
        assert_eq!(facility.owning_company_ref, None);
    }

    #[test]
    fn test_facility_without_owner_has_no_reference() {
        let n = normalizer();
        let raw = RawRecord::new().with("facility_name", "Plant").with("country", "Greece");
        assert_eq!(n.normalize_facility(0, &raw).unwrap().owning_company_ref, None);
    }

    #[test]
    fn test_bad_coordinates_are_malformed() {
        let n = normalizer();
        let base = RawRecord::new().with("facility_name", "Plant").with("country", "Greece");

        let err = n.normalize_facility(0, &base.clone().with("lat", "north")).unwrap_err();
        assert!(matches!(err, RecordError::MalformedRecord { ref field, .. } if field == "lat"));

        let err = n.normalize_facility(0, &base.clone().with("longitude", 200.0)).unwrap_err();
        assert!(matches!(err, RecordError::MalformedRecord { ref field, .. } if field == "longitude"));

        let ok = n.normalize_facility(0, &base.with("lat", "")).unwrap();
        assert_eq!(ok.latitude, None);
    }

    #[test]
    fn test_nested_values_are_malformed_only_where_used() {
        let n = normalizer();
        let tagged = company("Beta", "Spain").with("tags", RawValue::Nested(serde_json::json!(["x"])));
        assert_eq!(n.normalize_company(0, &tagged).unwrap().normalized_name, "beta");

        let nested_name = RawRecord::new()
            .with("name", RawValue::Nested(serde_json::json!({"en": "Beta"})))
            .with("country", "Spain");
        let err = n.normalize_company(1, &nested_name).unwrap_err();
        assert!(matches!(err, RecordError::MalformedRecord { ref field, .. } if field == "name"));

        let nested_lat = RawRecord::new()
            .with("facility_name", "Plant")
            .with("country", "Spain")
            .with("lat", RawValue::Nested(serde_json::json!([40.1])));
        let err = n.normalize_facility(2, &nested_lat).unwrap_err();
        assert!(matches!(err, RecordError::MalformedRecord { ref field, .. } if field == "lat"));
    }

    #[test]
    fn test_batch_skips_and_counts() {
        let n = normalizer();
        let raw = vec![
            company("Acme", "Morocco"),
            company("Atlantis Corp", "Atlantis"),
            RawRecord::new().with("country", "Spain"),
            company("Beta", "Spain"),
        ];
        let (cleaned, report) = n.normalize_companies(raw, 5);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(report.input, 4);
        assert_eq!(report.output, 2);
        assert_eq!(report.skipped_count("unknown_country"), 1);
        assert_eq!(report.skipped_count("malformed_record"), 1);
        assert_eq!(report.samples.len(), 2);
    }

    #[test]
    fn test_normalizing_normalized_company_is_noop() {
        let n = normalizer();
        let first = n.normalize_company(0, &company("  Sté. Atlas-Tex S.A. ", "MA")).unwrap();
        let second = n.normalize_company(0, &company_as_raw(&first)).unwrap();
        assert_eq!(first.normalized_name, second.normalized_name);
        assert_eq!(first.country, second.country);
    }
}
