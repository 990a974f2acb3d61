//! Categorical vocabularies and display-value translation.
//!
//! A [`Vocabulary`] is the closed set of canonical values seen for each
//! categorical field in a training batch, each with a stable index
//! (position in the sorted value list). A [`CategoricalMapping`] turns
//! the display values a form submits into those canonical values.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Categorical fields of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CategoricalField {
    #[serde(rename = "ad_type")]
    AdType,
    #[serde(rename = "heating")]
    Heating,
    #[serde(rename = "location_district")]
    District,
    #[serde(rename = "market")]
    Market,
    #[serde(rename = "ownership")]
    Ownership,
    #[serde(rename = "state")]
    State,
}

impl CategoricalField {
    pub const ALL: [CategoricalField; 6] = [
        CategoricalField::AdType,
        CategoricalField::Heating,
        CategoricalField::District,
        CategoricalField::Market,
        CategoricalField::Ownership,
        CategoricalField::State,
    ];

    /// Column name; also the feature name under ordinal encoding and the
    /// prefix of one-hot feature names.
    pub fn name(&self) -> &'static str {
        match self {
            CategoricalField::AdType => "ad_type",
            CategoricalField::Heating => "heating",
            CategoricalField::District => "location_district",
            CategoricalField::Market => "market",
            CategoricalField::Ownership => "ownership",
            CategoricalField::State => "state",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// One-hot column name for `value`.
    pub fn one_hot_name(&self, value: &str) -> String {
        format!("{}_{}", self.name(), value)
    }

    /// Split a one-hot column name into field and value.
    ///
    /// The longest matching field prefix wins.
    pub fn split_one_hot(name: &str) -> Option<(Self, &str)> {
        Self::ALL
            .into_iter()
            .filter_map(|field| {
                name.strip_prefix(field.name())
                    .and_then(|rest| rest.strip_prefix('_'))
                    .filter(|value| !value.is_empty())
                    .map(|value| (field, value))
            })
            .max_by_key(|(field, _)| field.name().len())
    }
}

/// Utility tags the model knows about. Any other scraped tag is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UtilityTag {
    Balcony,
    SeparateKitchen,
    Basement,
    StorageRoom,
    Terrace,
    Elevator,
}

impl UtilityTag {
    pub const ALL: [UtilityTag; 6] = [
        UtilityTag::Balcony,
        UtilityTag::SeparateKitchen,
        UtilityTag::Basement,
        UtilityTag::StorageRoom,
        UtilityTag::Terrace,
        UtilityTag::Elevator,
    ];

    /// Tag as written by the listing source.
    pub fn tag(&self) -> &'static str {
        match self {
            UtilityTag::Balcony => "balkon",
            UtilityTag::SeparateKitchen => "oddzielna kuchnia",
            UtilityTag::Basement => "piwnica",
            UtilityTag::StorageRoom => "pom. użytkowe",
            UtilityTag::Terrace => "taras",
            UtilityTag::Elevator => "winda",
        }
    }

    pub fn feature_name(&self) -> String {
        format!("utilities_{}", self.tag())
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_lowercase();
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    pub fn from_feature_name(name: &str) -> Option<Self> {
        name.strip_prefix("utilities_").and_then(Self::from_tag)
    }
}

// ============================================================================
// Vocabulary
// ============================================================================

/// Fitted closed vocabulary per categorical field.
///
/// Values are kept sorted; a value's index is its position. Every field
/// has an entry, possibly empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    fields: BTreeMap<CategoricalField, Vec<String>>,
}

impl Vocabulary {
    /// Fit from `(field, canonical value)` observations.
    pub fn fit<'a, I>(observations: I) -> Self
    where
        I: IntoIterator<Item = (CategoricalField, &'a str)>,
    {
        let mut sets: BTreeMap<CategoricalField, BTreeSet<String>> = CategoricalField::ALL
            .into_iter()
            .map(|f| (f, BTreeSet::new()))
            .collect();

        for (field, value) in observations {
            sets.entry(field).or_default().insert(value.to_string());
        }

        Self {
            fields: sets
                .into_iter()
                .map(|(field, set)| (field, set.into_iter().collect()))
                .collect(),
        }
    }

    /// Sorted values of `field`.
    pub fn values(&self, field: CategoricalField) -> &[String] {
        self.fields.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Fitted index of `value` in `field`.
    pub fn index_of(&self, field: CategoricalField, value: &str) -> Option<usize> {
        self.values(field)
            .binary_search_by(|v| v.as_str().cmp(value))
            .ok()
    }

    pub fn contains(&self, field: CategoricalField, value: &str) -> bool {
        self.index_of(field, value).is_some()
    }

    /// Number of values per field.
    pub fn sizes(&self) -> BTreeMap<CategoricalField, usize> {
        self.fields.iter().map(|(f, v)| (*f, v.len())).collect()
    }
}

// ============================================================================
// Display-value translation
// ============================================================================

/// Canonical value and the display values that translate to it.
type AliasTable = &'static [(&'static str, &'static [&'static str])];

const AD_TYPE: AliasTable = &[("private", &["prywatny"]), ("business", &["biuro"])];

const HEATING: AliasTable = &[
    ("boiler_room", &["miejskie"]),
    ("gas", &["gazowe"]),
    ("electric", &["elektryczne"]),
    ("other", &["inne"]),
];

const MARKET: AliasTable = &[
    ("primary", &["Pierwotny", "pierwotny"]),
    ("secondary", &["Wtórny", "wtorny"]),
];

const OWNERSHIP: AliasTable = &[
    ("full_ownership", &["Własnościowe", "wlasnosc"]),
    ("usufruct", &["Spoldzielcze", "spoldzielcze"]),
    ("share", &["Inne", "inne"]),
];

const STATE: AliasTable = &[
    ("ready_to_use", &["Do zamieszkania", "do_zamieszkania"]),
    ("to_renovation", &["Do remontu", "do_remontu"]),
    ("to_completion", &["Do wykończenia", "do_wykonczenia"]),
];

/// Translation between form display values and canonical values.
///
/// Districts are used verbatim. For the other fields a display value
/// translates only if it is a known alias or already canonical.
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoricalMapping;

impl CategoricalMapping {
    pub fn new() -> Self {
        Self
    }

    fn table(field: CategoricalField) -> Option<AliasTable> {
        match field {
            CategoricalField::AdType => Some(AD_TYPE),
            CategoricalField::Heating => Some(HEATING),
            CategoricalField::Market => Some(MARKET),
            CategoricalField::Ownership => Some(OWNERSHIP),
            CategoricalField::State => Some(STATE),
            CategoricalField::District => None,
        }
    }

    /// Display value to canonical value.
    pub fn translate(&self, field: CategoricalField, display: &str) -> Option<String> {
        let display = display.trim();
        if display.is_empty() {
            return None;
        }
        let Some(table) = Self::table(field) else {
            return Some(display.to_string());
        };

        let needle = display.to_lowercase();
        table
            .iter()
            .find(|(canonical, aliases)| {
                *canonical == needle || aliases.iter().any(|a| a.to_lowercase() == needle)
            })
            .map(|(canonical, _)| canonical.to_string())
    }

    /// Canonical value to its primary display value.
    pub fn display(&self, field: CategoricalField, canonical: &str) -> Option<String> {
        match Self::table(field) {
            None => Some(canonical.to_string()),
            Some(table) => table
                .iter()
                .find(|(c, _)| *c == canonical)
                .and_then(|(_, aliases)| aliases.first())
                .map(|a| a.to_string()),
        }
    }
}
