use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::constants;
use crate::domain::Country;
use crate::error::{PipelineError, Result};

/// Top-level pipeline configuration, usually loaded from `config.toml`.
/// Every section is optional; missing values fall back to the defaults of
/// the published export format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub normalizer: NormalizerConfig,
    pub identifiers: IdentifierConfig,
    pub report: ReportConfig,
    pub export: ExportConfig,
}

/// Name and country cleaning rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Legal-form suffixes stripped from the end of normalized names
    pub legal_suffixes: Vec<String>,
    /// Extra alias -> canonical country name pairs, merged over the built-ins
    pub country_aliases: BTreeMap<String, String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            legal_suffixes: constants::DEFAULT_LEGAL_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            country_aliases: BTreeMap::new(),
        }
    }
}

/// Widths of the hex identifiers. These are part of the export contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierConfig {
    pub company_id_width: usize,
    pub facility_id_width: usize,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            company_id_width: constants::DEFAULT_COMPANY_ID_WIDTH,
            facility_id_width: constants::DEFAULT_FACILITY_ID_WIDTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// How many skipped records are kept as samples per phase
    pub max_error_samples: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_error_samples: constants::DEFAULT_MAX_ERROR_SAMPLES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub record_source: String,
    pub data_source: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            record_source: constants::DEFAULT_RECORD_SOURCE.to_string(),
            data_source: constants::DEFAULT_DATA_SOURCE.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config file at '{}', using defaults", path.display());
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml_str(&config_content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let widths = [
            ("company_id_width", self.identifiers.company_id_width),
            ("facility_id_width", self.identifiers.facility_id_width),
        ];
        for (name, width) in widths {
            if !(constants::MIN_ID_WIDTH..=constants::MAX_ID_WIDTH).contains(&width) {
                return Err(PipelineError::Config(format!(
                    "identifiers.{} must be between {} and {}, got {}",
                    name,
                    constants::MIN_ID_WIDTH,
                    constants::MAX_ID_WIDTH,
                    width
                )));
            }
        }

        // Surface bad alias targets at load time rather than mid-run
        self.normalizer.country_table()?;
        Ok(())
    }
}

impl NormalizerConfig {
    /// Build the immutable country lookup table: built-in aliases first,
    /// configured aliases layered on top.
    pub fn country_table(&self) -> Result<CountryTable> {
        let mut table = CountryTable::default();
        for (alias, canonical) in &self.country_aliases {
            let country = canonical.parse::<Country>().map_err(|e| {
                PipelineError::Config(format!("country alias '{}': {}", alias, e))
            })?;
            table.insert_alias(alias, country);
        }
        Ok(table)
    }
}

/// Canonical country list plus alias lookup. Built once per run and passed
/// into the normalizer; never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryTable {
    aliases: HashMap<String, Country>,
}

impl CountryTable {
    /// Table that only knows the canonical names, with no aliases at all.
    pub fn canonical_only() -> Self {
        Self {
            aliases: HashMap::new(),
        }
    }

    pub fn with_alias(mut self, alias: &str, country: Country) -> Self {
        self.insert_alias(alias, country);
        self
    }

    fn insert_alias(&mut self, alias: &str, country: Country) {
        self.aliases.insert(fold_key(alias), country);
    }

    /// Exact canonical match first, then the alias table. `None` means the
    /// value must be rejected.
    pub fn resolve(&self, raw: &str) -> Option<Country> {
        let trimmed = raw.trim();
        if let Ok(country) = trimmed.parse::<Country>() {
            return Some(country);
        }
        self.aliases.get(&fold_key(trimmed)).copied()
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }
}

impl Default for CountryTable {
    fn default() -> Self {
        let mut table = Self::canonical_only();
        for country in Country::ALL {
            table.insert_alias(country.name(), country);
            table.insert_alias(country.iso_code(), country);
        }
        for (alias, canonical) in constants::DEFAULT_COUNTRY_ALIASES {
            if let Ok(country) = canonical.parse::<Country>() {
                table.insert_alias(alias, country);
            }
        }
        table
    }
}

fn fold_key(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
