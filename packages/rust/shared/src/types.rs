//! Core domain types: country tax records and the ordered dataset.

use std::fmt;

use chrono::Utc;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Record parts
// ---------------------------------------------------------------------------

/// Personal income tax regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxSystem {
    Progressive,
    Flat,
    ZeroPersonal,
}

impl TaxSystem {
    /// Every accepted value, in canonical order.
    pub const ALL: [TaxSystem; 3] = [Self::Progressive, Self::Flat, Self::ZeroPersonal];

    /// The tag used in the data file and in LLM output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Progressive => "progressive",
            Self::Flat => "flat",
            Self::ZeroPersonal => "zero_personal",
        }
    }

    /// Parse a tag, rejecting anything outside the closed set.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == tag)
    }
}

impl fmt::Display for TaxSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One income band. `max: None` means unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxBracket {
    pub min: f64,
    pub max: Option<f64>,
    pub rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Value-added / sales tax information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatInfo {
    #[serde(rename = "hasVAT")]
    pub has_vat: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduced: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// An extra levy such as social security or a military surcharge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialTax {
    #[serde(rename = "type")]
    pub kind: String,
    pub target: String,
    pub rate: f64,
    pub description: String,
}

/// The normalized per-country record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryRecord {
    pub name: String,
    pub currency: String,
    pub system: TaxSystem,
    #[serde(rename = "countryCode")]
    pub country_code: String,
    /// `[latitude, longitude]`.
    pub coordinates: [f64; 2],
    pub brackets: Vec<TaxBracket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_taxes: Option<Vec<SpecialTax>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat: Option<VatInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// Mapping from country key to record that keeps insertion order.
///
/// Existing keys keep their position when replaced; new keys are appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    entries: Vec<(String, CountryRecord)>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&CountryRecord> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, r)| r)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace. Returns the previous record for `key`, if any.
    pub fn insert(&mut self, key: impl Into<String>, record: CountryRecord) -> Option<CountryRecord> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, record)),
            None => {
                self.entries.push((key, record));
                None
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CountryRecord)> {
        self.entries.iter().map(|(k, r)| (k.as_str(), r))
    }
}

impl FromIterator<(String, CountryRecord)> for Dataset {
    fn from_iter<I: IntoIterator<Item = (String, CountryRecord)>>(iter: I) -> Self {
        let mut dataset = Dataset::new();
        for (key, record) in iter {
            dataset.insert(key, record);
        }
        dataset
    }
}

impl Serialize for Dataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, record) in &self.entries {
            map.serialize_entry(key, record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Dataset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct DatasetVisitor;

        impl<'de> Visitor<'de> for DatasetVisitor {
            type Value = Dataset;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of country key to country record")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Dataset, A::Error> {
                let mut dataset = Dataset::new();
                while let Some((key, record)) = access.next_entry::<String, CountryRecord>()? {
                    dataset.insert(key, record);
                }
                Ok(dataset)
            }
        }

        deserializer.deserialize_map(DatasetVisitor)
    }
}

// ---------------------------------------------------------------------------
// TraceId
// ---------------------------------------------------------------------------

/// Per-attempt audit identifier, `trace_{YYYYmmdd_HHMMSS}_{8 hex}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    /// Generate a fresh trace id from the wall clock and a UUID v7 tail.
    pub fn new() -> Self {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let uuid = Uuid::now_v7().simple().to_string();
        // The leading hex of a v7 UUID is the timestamp; the tail is random.
        let tail = &uuid[uuid.len() - 8..];
        Self(format!("trace_{stamp}_{tail}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
