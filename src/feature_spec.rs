//! Name-driven feature resolution.
//!
//! Each feature name in a schema compiles to a [`FeatureSpec`] describing
//! where its value comes from. Training rows and serving requests both
//! implement [`FeatureSource`], so one resolver produces every vector.

use serde::{Deserialize, Serialize};

use crate::error::{FeatureError, FeatureResult};
use crate::geo::{Coordinates, DerivedFeature};
use crate::schema_config::ContinuousField;
use crate::vocabulary::{CategoricalField, UtilityTag, Vocabulary};

/// A numeric vector ordered by some [`FeatureSchema`](crate::FeatureSchema).
pub type FeatureVector = Vec<f64>;

/// Anything a feature vector can be read from.
pub trait FeatureSource {
    fn continuous(&self, field: ContinuousField) -> FeatureResult<f64>;

    /// Canonical value of a categorical field; `None` when the field is
    /// absent from the source.
    fn category(&self, field: CategoricalField) -> FeatureResult<Option<&str>>;

    fn has_utility(&self, tag: UtilityTag) -> bool;

    fn coordinates(&self) -> FeatureResult<Coordinates>;
}

/// Where a feature's value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureKind {
    Continuous(ContinuousField),
    Utility(UtilityTag),
    Derived(DerivedFeature),
    /// Vocabulary index of the field's value
    Ordinal(CategoricalField),
    /// 1.0 when the field equals `value`
    OneHot {
        field: CategoricalField,
        value: String,
    },
}

/// A compiled feature: schema name plus value source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub kind: FeatureKind,
}

impl FeatureSpec {
    /// Compile a single feature name against a vocabulary.
    ///
    /// Returns `None` for names no source can provide, including one-hot
    /// columns for values the vocabulary never saw.
    pub fn compile(name: &str, vocabulary: &Vocabulary) -> Option<Self> {
        let kind = if let Some(field) = ContinuousField::from_name(name) {
            FeatureKind::Continuous(field)
        } else if let Some(feature) = DerivedFeature::from_name(name) {
            FeatureKind::Derived(feature)
        } else if let Some(tag) = UtilityTag::from_feature_name(name) {
            FeatureKind::Utility(tag)
        } else if let Some(field) = CategoricalField::from_name(name) {
            FeatureKind::Ordinal(field)
        } else {
            let (field, value) = CategoricalField::split_one_hot(name)?;
            if !vocabulary.contains(field, value) {
                return None;
            }
            FeatureKind::OneHot {
                field,
                value: value.to_string(),
            }
        };

        Some(Self {
            name: name.to_string(),
            kind,
        })
    }

    /// Compile every name, in order.
    ///
    /// Fails with `SchemaMismatch` listing every name that does not compile.
    pub fn compile_all(names: &[String], vocabulary: &Vocabulary) -> FeatureResult<Vec<Self>> {
        let mut specs = Vec::with_capacity(names.len());
        let mut unresolved = Vec::new();

        for name in names {
            match Self::compile(name, vocabulary) {
                Some(spec) => specs.push(spec),
                None => unresolved.push(name.clone()),
            }
        }

        if !unresolved.is_empty() {
            return Err(FeatureError::schema_mismatch(
                Vec::new(),
                unresolved,
                "features unknown to the schema config",
            ));
        }
        Ok(specs)
    }

    pub fn needs_location(&self) -> bool {
        matches!(self.kind, FeatureKind::Derived(_))
    }

    /// Read this feature's value from `source`.
    ///
    /// A categorical value outside the vocabulary is `UnknownCategory`. An
    /// absent categorical value is all-zero under one-hot and NaN under
    /// ordinal encoding.
    pub fn resolve<S>(&self, source: &S, vocabulary: &Vocabulary) -> FeatureResult<f64>
    where
        S: FeatureSource + ?Sized,
    {
        match &self.kind {
            FeatureKind::Continuous(field) => source.continuous(*field),
            FeatureKind::Utility(tag) => Ok(if source.has_utility(*tag) { 1.0 } else { 0.0 }),
            FeatureKind::Derived(feature) => Ok(feature.compute(&source.coordinates()?)),
            FeatureKind::Ordinal(field) => match source.category(*field)? {
                Some(value) => vocabulary
                    .index_of(*field, value)
                    .map(|i| i as f64)
                    .ok_or_else(|| FeatureError::unknown_category(field.name(), value)),
                None => Ok(f64::NAN),
            },
            FeatureKind::OneHot { field, value } => match source.category(*field)? {
                Some(observed) => {
                    if !vocabulary.contains(*field, observed) {
                        return Err(FeatureError::unknown_category(field.name(), observed));
                    }
                    Ok(if observed == value { 1.0 } else { 0.0 })
                }
                None => Ok(0.0),
            },
        }
    }
}

/// Resolve a full vector for `source` in the order of `specs`.
pub fn resolve_vector<S>(
    specs: &[FeatureSpec],
    source: &S,
    vocabulary: &Vocabulary,
) -> FeatureResult<FeatureVector>
where
    S: FeatureSource + ?Sized,
{
    specs
        .iter()
        .map(|spec| spec.resolve(source, vocabulary))
        .collect()
}
