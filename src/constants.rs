/// Field name fallbacks and fixed values shared across the pipeline phases.
/// Raw extraction batches are inconsistent about column naming, so every
/// logical field is looked up through an ordered list of candidate keys.

// Raw field names, in lookup order
pub const COMPANY_NAME_FIELDS: &[&str] = &["company_name", "name", "company"];
pub const FACILITY_NAME_FIELDS: &[&str] = &["facility_name", "name"];
pub const FACILITY_OWNER_FIELDS: &[&str] = &["owner_company", "company_name", "company", "organization"];
pub const OWNER_COUNTRY_FIELDS: &[&str] = &["owner_country", "company_country"];
pub const COUNTRY_FIELDS: &[&str] = &["country"];
pub const ADDRESS_FIELDS: &[&str] = &["address"];
pub const SECTOR_FIELDS: &[&str] = &["sector"];
pub const LATITUDE_FIELDS: &[&str] = &["lat", "latitude"];
pub const LONGITUDE_FIELDS: &[&str] = &["lon", "longitude"];

// Identifier widths (hex characters). Downstream tools parse these keys.
pub const DEFAULT_COMPANY_ID_WIDTH: usize = 10;
pub const DEFAULT_FACILITY_ID_WIDTH: usize = 12;
pub const MIN_ID_WIDTH: usize = 8;
pub const MAX_ID_WIDTH: usize = 64;

pub const DEFAULT_MAX_ERROR_SAMPLES: usize = 5;

pub const DEFAULT_RECORD_SOURCE: &str = "OAR Pipeline v1.0";
pub const DEFAULT_DATA_SOURCE: &str = "Open Apparel Registry";
pub const PIPELINE_VERSION: &str = "1.0";
pub const RELATIONSHIP_OWNERSHIP: &str = "ownership";

/// Legal-form suffixes removed from the end of normalized names.
pub const DEFAULT_LEGAL_SUFFIXES: &[&str] = &["inc", "ltd", "llc", "gmbh", "sa", "s.a", "limited", "corp"];

/// Country spellings seen in extraction batches, mapped to canonical names.
/// Canonical names themselves (any case) and ISO codes are added by
/// `CountryTable::default`.
pub const DEFAULT_COUNTRY_ALIASES: &[(&str, &str)] = &[
    ("Maroc", "Morocco"),
    ("Marruecos", "Morocco"),
    ("Marokko", "Morocco"),
    ("España", "Spain"),
    ("Espana", "Spain"),
    ("Espanha", "Spain"),
    ("Espagne", "Spain"),
    ("Italie", "Italy"),
    ("Italia", "Italy"),
    ("Grece", "Greece"),
    ("Grèce", "Greece"),
    ("Hellas", "Greece"),
    ("Ellada", "Greece"),
    ("Frankreich", "France"),
    ("Francia", "France"),
    ("Portogallo", "Portugal"),
    ("Malte", "Malta"),
];

// Artifact names written by the export step
pub const COMPANIES_FILE: &str = "relational_companies.csv";
pub const FACILITIES_FILE: &str = "relational_facilities.csv";
pub const LINKS_FILE: &str = "relational_links.csv";
pub const WARNINGS_FILE: &str = "integrity_warnings.json";
pub const SUMMARY_FILE: &str = "data_summary.json";

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_OUTPUT_DIR: &str = "data/outputs";
