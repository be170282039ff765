use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The two entity kinds flowing through the cleaning phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Company,
    Facility,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Company => "company",
            EntityKind::Facility => "facility",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single loosely-typed value as delivered by extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    /// Arrays and objects; never usable as a field value.
    Nested(serde_json::Value),
}

/// Largest magnitude at which every integer is exactly representable in f64.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

impl RawValue {
    /// Text view of the value. Numbers are rendered without a trailing `.0`
    /// so an integer-looking name such as `123` survives intact.
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawValue::Null => None,
            RawValue::Bool(b) => Some(b.to_string()),
            RawValue::Number(n) if n.fract() == 0.0 && n.abs() < MAX_EXACT_INTEGER => {
                Some(format!("{}", *n as i64))
            }
            RawValue::Number(n) => Some(n.to_string()),
            RawValue::Text(s) => Some(s.clone()),
            RawValue::Nested(_) => None,
        }
    }

    /// Numeric view of the value, parsing text when needed.
    /// `Ok(None)` means absent, `Err(())` means present but not a number.
    pub fn as_number(&self) -> std::result::Result<Option<f64>, ()> {
        match self {
            RawValue::Null => Ok(None),
            RawValue::Number(n) => Ok(Some(*n)),
            RawValue::Text(s) if s.trim().is_empty() => Ok(None),
            RawValue::Text(s) => s.trim().parse::<f64>().map(Some).map_err(|_| ()),
            RawValue::Bool(_) | RawValue::Nested(_) => Err(()),
        }
    }
}

/// Untyped record as received from extraction. Discarded after normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub BTreeMap<String, RawValue>);

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for tests and fixtures.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.0.get(key)
    }

    /// First non-blank text value among `keys`, in order.
    pub fn first_text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| {
            self.get(key)
                .and_then(RawValue::as_text)
                .filter(|s| !s.trim().is_empty())
        })
    }

    /// First field among `keys` holding an array or object.
    pub fn first_nested<'k>(&self, keys: &[&'k str]) -> Option<&'k str> {
        keys.iter()
            .copied()
            .find(|key| matches!(self.get(key), Some(RawValue::Nested(_))))
    }

    /// First field among `keys` that is present and not null.
    pub fn first_present(&self, keys: &[&str]) -> Option<(String, &RawValue)> {
        keys.iter().find_map(|key| {
            self.get(key)
                .filter(|v| !matches!(v, RawValue::Null))
                .map(|v| (key.to_string(), v))
        })
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

/// A raw extraction batch for one run.
#[derive(Debug, Clone, Default)]
pub struct RawBatch {
    pub companies: Vec<RawRecord>,
    pub facilities: Vec<RawRecord>,
}
