use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The seven target countries every record is standardized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Country {
    Morocco,
    Spain,
    Portugal,
    Italy,
    France,
    Greece,
    Malta,
}

impl Country {
    pub const ALL: [Country; 7] = [
        Country::Morocco,
        Country::Spain,
        Country::Portugal,
        Country::Italy,
        Country::France,
        Country::Greece,
        Country::Malta,
    ];

    /// Canonical display name, also the form written to exported tables.
    pub fn name(&self) -> &'static str {
        match self {
            Country::Morocco => "Morocco",
            Country::Spain => "Spain",
            Country::Portugal => "Portugal",
            Country::Italy => "Italy",
            Country::France => "France",
            Country::Greece => "Greece",
            Country::Malta => "Malta",
        }
    }

    /// ISO 3166-1 alpha-2 code.
    pub fn iso_code(&self) -> &'static str {
        match self {
            Country::Morocco => "MA",
            Country::Spain => "ES",
            Country::Portugal => "PT",
            Country::Italy => "IT",
            Country::France => "FR",
            Country::Greece => "GR",
            Country::Malta => "MT",
        }
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Country {
    type Err = String;

    /// Exact canonical-name match only. Alias resolution lives in the
    /// normalizer's country table.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Country::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("'{}' is not a canonical country name", s))
    }
}

/// Composite identity key used for deduplication and id derivation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint {
    pub normalized_name: String,
    pub country: Country,
}

impl Fingerprint {
    pub fn new(normalized_name: impl Into<String>, country: Country) -> Self {
        Self {
            normalized_name: normalized_name.into(),
            country,
        }
    }

    /// Canonical string form hashed into identifiers.
    pub fn canonical(&self) -> String {
        format!("{}|{}", self.normalized_name, self.country.name())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// A cleaned company. `company_id` is filled in by the identifier phase and
/// never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub raw_name: String,
    pub normalized_name: String,
    pub country: Country,
    pub company_id: Option<String>,
}

/// A cleaned facility with the reference to its owning company resolved
/// during facility cleaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityRecord {
    pub raw_name: String,
    pub normalized_name: String,
    pub country: Country,
    pub facility_id: Option<String>,
    pub owning_company_ref: Option<String>,
    /// Owner references carried by later duplicates that disagree with
    /// `owning_company_ref`.
    pub conflicting_owner_refs: Vec<String>,
    pub address: Option<String>,
    pub sector: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Common view over cleaned records used by the dedup and identifier phases.
pub trait CleanRecord {
    fn normalized_name(&self) -> &str;

    fn country(&self) -> Country;

    fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(self.normalized_name(), self.country())
    }

    fn assigned_id(&self) -> Option<&str>;

    fn assign_id(&mut self, id: String);

    /// Fold a later duplicate into this first-seen representative.
    fn absorb_duplicate(&mut self, _duplicate: Self)
    where
        Self: Sized,
    {
    }
}

impl CleanRecord for CompanyRecord {
    fn normalized_name(&self) -> &str {
        &self.normalized_name
    }

    fn country(&self) -> Country {
        self.country
    }

    fn assigned_id(&self) -> Option<&str> {
        self.company_id.as_deref()
    }

    fn assign_id(&mut self, id: String) {
        self.company_id = Some(id);
    }
}

impl CleanRecord for FacilityRecord {
    fn normalized_name(&self) -> &str {
        &self.normalized_name
    }

    fn country(&self) -> Country {
        self.country
    }

    fn assigned_id(&self) -> Option<&str> {
        self.facility_id.as_deref()
    }

    fn assign_id(&mut self, id: String) {
        self.facility_id = Some(id);
    }

    fn absorb_duplicate(&mut self, duplicate: Self) {
        if let Some(other) = duplicate.owning_company_ref {
            let differs = self.owning_company_ref.as_deref() != Some(other.as_str());
            if differs && !self.conflicting_owner_refs.contains(&other) {
                self.conflicting_owner_refs.push(other);
            }
        }
    }
}
