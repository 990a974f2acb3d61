//! Load-time check of a predictor's declared feature list.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::{FeatureError, FeatureResult};
use crate::schema_config::{FeatureSchema, SchemaConfig};

/// Whether declared feature order must match the expected order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPolicy {
    /// Same names, same count, any order.
    #[default]
    Unordered,
    /// Same names in exactly this order (positional models).
    Exact,
}

/// Feature list of model version 2.1.1.
const LEGACY_V2_1_1: [&str; 21] = [
    "ad_type",
    "area",
    "build_year",
    "building_floors",
    "floor",
    "heating",
    "location_district",
    "location_lat",
    "location_lon",
    "market",
    "ownership",
    "rooms",
    "state",
    "utilities_balkon",
    "utilities_oddzielna kuchnia",
    "utilities_piwnica",
    "utilities_pom. użytkowe",
    "utilities_taras",
    "utilities_winda",
    "distance_from_center",
    "distance_from_other_expensive",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaValidator {
    expected: FeatureSchema,
    policy: OrderPolicy,
}

impl SchemaValidator {
    pub fn new(expected: FeatureSchema, policy: OrderPolicy) -> Self {
        Self { expected, policy }
    }

    /// Validator for the canonical schema of `config`, order-independent.
    pub fn for_config(config: &SchemaConfig) -> Self {
        Self::new(config.feature_schema(), OrderPolicy::Unordered)
    }

    /// Validator for the 2.1.1 ordinal model. The model's declared order
    /// drives encoding, so only the name set and count are checked.
    pub fn legacy_v2_1_1() -> Self {
        let names = LEGACY_V2_1_1.iter().map(|n| n.to_string()).collect();
        Self::new(FeatureSchema::new(names), OrderPolicy::Unordered)
    }

    pub fn expected(&self) -> &FeatureSchema {
        &self.expected
    }

    pub fn policy(&self) -> OrderPolicy {
        self.policy
    }

    /// Compare `declared` against the expected schema.
    ///
    /// Any missing name, unexpected name, duplicate or count difference is
    /// a `SchemaMismatch`; under [`OrderPolicy::Exact`] so is any
    /// positional difference.
    pub fn validate(&self, declared: &[String]) -> FeatureResult<()> {
        let expected: BTreeSet<&str> = self.expected.names().iter().map(String::as_str).collect();
        let mut seen = BTreeSet::new();
        let mut unexpected = Vec::new();

        for name in declared {
            if !seen.insert(name.as_str()) || !expected.contains(name.as_str()) {
                unexpected.push(name.clone());
            }
        }
        let missing: Vec<String> = self
            .expected
            .names()
            .iter()
            .filter(|name| !seen.contains(name.as_str()))
            .cloned()
            .collect();

        if !missing.is_empty() || !unexpected.is_empty() || declared.len() != self.expected.len() {
            let detail = format!(
                "declared {} features, expected {}",
                declared.len(),
                self.expected.len()
            );
            error!(missing = ?missing, unexpected = ?unexpected, "{}", detail);
            return Err(FeatureError::schema_mismatch(missing, unexpected, detail));
        }

        if self.policy == OrderPolicy::Exact {
            if let Some((i, (want, got))) = self
                .expected
                .names()
                .iter()
                .zip(declared)
                .enumerate()
                .find(|(_, (want, got))| want != got)
            {
                let detail = format!("position {}: expected '{}', found '{}'", i, want, got);
                error!("{}", detail);
                return Err(FeatureError::schema_mismatch(Vec::new(), Vec::new(), detail));
            }
        }

        info!(features = declared.len(), policy = ?self.policy, "declared schema accepted");
        Ok(())
    }
}
