//! Persisted statistics bundle and the canonical feature schema.
//!
//! A [`SchemaConfig`] is produced once per training run and is read-only
//! afterwards. The feature schema is derived from it, never stored next to
//! it, so the training batch, the holdout batch and the serving encoder all
//! see the same column set by construction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FeatureError, FeatureResult};
use crate::geo::DerivedFeature;
use crate::stats::IqrBounds;
use crate::types::ModelVersion;
use crate::vocabulary::{CategoricalField, UtilityTag, Vocabulary};

/// Current layout of the serialized config.
pub const CONFIG_FORMAT: u32 = 1;

/// How categorical fields become features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoricalEncoding {
    /// One 0/1 column per fitted value, named `<field>_<value>`.
    #[default]
    OneHot,
    /// One column per field holding the fitted vocabulary index.
    Ordinal,
}

/// Numeric features passed through from the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContinuousField {
    Area,
    BuildYear,
    BuildingFloors,
    Floor,
    Rooms,
}

impl ContinuousField {
    pub const ALL: [ContinuousField; 5] = [
        ContinuousField::Area,
        ContinuousField::BuildYear,
        ContinuousField::BuildingFloors,
        ContinuousField::Floor,
        ContinuousField::Rooms,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ContinuousField::Area => "area",
            ContinuousField::BuildYear => "build_year",
            ContinuousField::BuildingFloors => "building_floors",
            ContinuousField::Floor => "floor",
            ContinuousField::Rooms => "rooms",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

// ============================================================================
// Feature Schema
// ============================================================================

/// Ordered list of feature names defining a feature vector's shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }
}

// ============================================================================
// Schema Config
// ============================================================================

/// Fitted statistics shared by training preprocessing and serving.
///
/// Fields are private: a config is created by the fitter or loaded from a
/// store and never edited. Retraining yields a new version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    format: u32,
    version: ModelVersion,
    encoding: CategoricalEncoding,
    price_m2_bounds: IqrBounds,
    build_year_medians: BTreeMap<String, Option<f64>>,
    building_floors_medians: BTreeMap<String, Option<f64>>,
    vocabulary: Vocabulary,
}

impl SchemaConfig {
    pub(crate) fn new(
        version: ModelVersion,
        encoding: CategoricalEncoding,
        price_m2_bounds: IqrBounds,
        build_year_medians: BTreeMap<String, Option<f64>>,
        building_floors_medians: BTreeMap<String, Option<f64>>,
        vocabulary: Vocabulary,
    ) -> Self {
        Self {
            format: CONFIG_FORMAT,
            version,
            encoding,
            price_m2_bounds,
            build_year_medians,
            building_floors_medians,
            vocabulary,
        }
    }

    pub fn version(&self) -> &ModelVersion {
        &self.version
    }

    pub fn encoding(&self) -> CategoricalEncoding {
        self.encoding
    }

    /// Acceptance window for price per m².
    pub fn price_bounds(&self) -> &IqrBounds {
        &self.price_m2_bounds
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn build_year_medians(&self) -> &BTreeMap<String, Option<f64>> {
        &self.build_year_medians
    }

    pub fn building_floors_medians(&self) -> &BTreeMap<String, Option<f64>> {
        &self.building_floors_medians
    }

    /// Whether a price per m² passes the fitted outlier bounds.
    pub fn accepts_price_per_m2(&self, price_m2: f64) -> bool {
        price_m2.is_finite() && self.price_m2_bounds.contains(price_m2)
    }

    /// Median build year of `district`.
    ///
    /// Fails with `UnknownCategory` for a district outside the vocabulary and
    /// with `ImputationUnavailable` when the district had no valid year.
    pub fn build_year_median(&self, district: &str) -> FeatureResult<f64> {
        self.district_median(&self.build_year_medians, "build_year", district)
    }

    /// Median building floor count of `district`; same failure rules as
    /// [`SchemaConfig::build_year_median`].
    pub fn building_floors_median(&self, district: &str) -> FeatureResult<f64> {
        self.district_median(&self.building_floors_medians, "building_floors", district)
    }

    fn district_median(
        &self,
        medians: &BTreeMap<String, Option<f64>>,
        statistic: &str,
        district: &str,
    ) -> FeatureResult<f64> {
        if !self.vocabulary.contains(CategoricalField::District, district) {
            return Err(FeatureError::unknown_category(
                CategoricalField::District.name(),
                district,
            ));
        }
        medians
            .get(district)
            .copied()
            .flatten()
            .ok_or_else(|| FeatureError::imputation_unavailable(statistic, district))
    }

    /// Canonical feature schema for this config, sorted by name.
    pub fn feature_schema(&self) -> FeatureSchema {
        let mut names: Vec<String> = ContinuousField::ALL
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        names.extend(UtilityTag::ALL.iter().map(UtilityTag::feature_name));
        names.extend(DerivedFeature::ALL.iter().map(|f| f.name().to_string()));

        for field in CategoricalField::ALL {
            match self.encoding {
                CategoricalEncoding::Ordinal => names.push(field.name().to_string()),
                CategoricalEncoding::OneHot => names.extend(
                    self.vocabulary
                        .values(field)
                        .iter()
                        .map(|value| field.one_hot_name(value)),
                ),
            }
        }

        names.sort();
        FeatureSchema::new(names)
    }

    /// Serialize to the persisted JSON blob.
    pub fn to_json(&self) -> FeatureResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a persisted JSON blob.
    pub fn from_json(json: &str) -> FeatureResult<Self> {
        let config: SchemaConfig = serde_json::from_str(json)?;
        if config.format != CONFIG_FORMAT {
            return Err(FeatureError::SerializationError(format!(
                "unsupported config format {} (expected {})",
                config.format, CONFIG_FORMAT
            )));
        }
        Ok(config)
    }

    /// Fail with `ConfigVersionMismatch` unless this config is `expected`.
    pub fn ensure_version(&self, expected: &ModelVersion) -> FeatureResult<()> {
        if &self.version != expected {
            return Err(FeatureError::version_mismatch(
                expected.to_string(),
                self.version.to_string(),
            ));
        }
        Ok(())
    }
}
