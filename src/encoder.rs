//! Serving-side encoding of estimate requests.
//!
//! An [`InferenceEncoder`] is compiled once from a [`SchemaConfig`] and the
//! feature names a predictor declares, then encodes any number of requests
//! into vectors in exactly that declared order.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{FeatureError, FeatureResult};
use crate::feature_spec::{resolve_vector, FeatureSource, FeatureSpec, FeatureVector};
use crate::geo::{Coordinates, GeocodePolicy, Geocoder};
use crate::schema_config::{ContinuousField, FeatureSchema, SchemaConfig};
use crate::types::EstimateRequest;
use crate::vocabulary::{CategoricalField, CategoricalMapping, UtilityTag};

/// Serving-time knobs.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    pub geocode_policy: GeocodePolicy,
}

impl EncoderSettings {
    pub fn with_geocode_policy(mut self, policy: GeocodePolicy) -> Self {
        self.geocode_policy = policy;
        self
    }
}

/// Request-to-vector encoder bound to one config and one declared order.
#[derive(Debug, Clone)]
pub struct InferenceEncoder {
    config: SchemaConfig,
    schema: FeatureSchema,
    specs: Vec<FeatureSpec>,
    needs_location: bool,
    mapping: CategoricalMapping,
    settings: EncoderSettings,
}

impl InferenceEncoder {
    /// Compile an encoder for the predictor's declared feature order.
    ///
    /// Fails with `SchemaMismatch` if a declared name is duplicated or
    /// cannot be produced from `config`.
    pub fn compile(
        config: &SchemaConfig,
        declared: &[String],
        settings: EncoderSettings,
    ) -> FeatureResult<Self> {
        let mut seen = BTreeSet::new();
        let duplicates: Vec<String> = declared
            .iter()
            .filter(|name| !seen.insert(name.as_str()))
            .cloned()
            .collect();
        if !duplicates.is_empty() {
            return Err(FeatureError::schema_mismatch(
                Vec::new(),
                duplicates,
                "duplicate declared features",
            ));
        }

        let specs = FeatureSpec::compile_all(declared, config.vocabulary())?;
        let needs_location = specs.iter().any(FeatureSpec::needs_location);

        info!(
            version = %config.version(),
            features = specs.len(),
            needs_location,
            "inference encoder compiled"
        );

        Ok(Self {
            config: config.clone(),
            schema: FeatureSchema::new(declared.to_vec()),
            specs,
            needs_location,
            mapping: CategoricalMapping::new(),
            settings,
        })
    }

    pub fn config(&self) -> &SchemaConfig {
        &self.config
    }

    /// Declared feature order of produced vectors.
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Encode one request.
    ///
    /// Display values are translated to canonical categories; anything the
    /// fitted vocabulary has not seen is `UnknownCategory`. Missing build
    /// year and floor count are imputed from the district medians. The
    /// address is only geocoded when a location feature is declared.
    pub fn encode(
        &self,
        request: &EstimateRequest,
        geocoder: &dyn Geocoder,
    ) -> FeatureResult<FeatureVector> {
        let resolved = self.resolve_request(request, geocoder)?;
        let vector = resolve_vector(&self.specs, &resolved, self.config.vocabulary())?;
        debug!(district = %request.district, features = vector.len(), "request encoded");
        Ok(vector)
    }

    /// Encode many requests in parallel; results stay in input order.
    pub fn encode_batch(
        &self,
        requests: &[EstimateRequest],
        geocoder: &dyn Geocoder,
    ) -> Vec<FeatureResult<FeatureVector>> {
        requests
            .par_iter()
            .map(|request| self.encode(request, geocoder))
            .collect()
    }

    fn resolve_request<'a>(
        &'a self,
        request: &'a EstimateRequest,
        geocoder: &dyn Geocoder,
    ) -> FeatureResult<ResolvedRequest<'a>> {
        let district = self
            .mapping
            .translate(CategoricalField::District, &request.district)
            .ok_or_else(|| {
                FeatureError::unknown_category(CategoricalField::District.name(), &request.district)
            })?;

        let mut categories = BTreeMap::new();
        for (field, display) in [
            (CategoricalField::AdType, &request.ad_type),
            (CategoricalField::Heating, &request.heating),
            (CategoricalField::Market, &request.market),
            (CategoricalField::Ownership, &request.ownership),
            (CategoricalField::State, &request.state),
        ] {
            let canonical = self
                .mapping
                .translate(field, display)
                .ok_or_else(|| FeatureError::unknown_category(field.name(), display))?;
            categories.insert(field, canonical);
        }
        categories.insert(CategoricalField::District, district);

        let coordinates = if self.needs_location {
            Some(
                self.settings
                    .geocode_policy
                    .resolve(geocoder, &geocode_address(request))?,
            )
        } else {
            None
        };

        Ok(ResolvedRequest {
            request,
            config: &self.config,
            categories,
            utilities: request_utilities(request),
            coordinates,
        })
    }
}

/// Address sent to the geocoder: the location, qualified by city when the
/// location does not already name it.
pub fn geocode_address(request: &EstimateRequest) -> String {
    let city = request.city.trim();
    if city.is_empty() || request.location.to_lowercase().contains(&city.to_lowercase()) {
        request.location.trim().to_string()
    } else {
        format!("{}, {}", request.location.trim(), city)
    }
}

/// Utility tags implied by the form's checkboxes.
///
/// A balcony also marks a terrace and a basement also marks a storage
/// room; garages are not modelled.
pub fn request_utilities(request: &EstimateRequest) -> BTreeSet<UtilityTag> {
    let mut tags = BTreeSet::new();
    if request.balcony {
        tags.insert(UtilityTag::Balcony);
        tags.insert(UtilityTag::Terrace);
    }
    if request.basement {
        tags.insert(UtilityTag::Basement);
        tags.insert(UtilityTag::StorageRoom);
    }
    if request.separate_kitchen {
        tags.insert(UtilityTag::SeparateKitchen);
    }
    if request.elevator {
        tags.insert(UtilityTag::Elevator);
    }
    tags
}

struct ResolvedRequest<'a> {
    request: &'a EstimateRequest,
    config: &'a SchemaConfig,
    categories: BTreeMap<CategoricalField, String>,
    utilities: BTreeSet<UtilityTag>,
    coordinates: Option<Coordinates>,
}

impl ResolvedRequest<'_> {
    fn district(&self) -> &str {
        self.categories
            .get(&CategoricalField::District)
            .map(String::as_str)
            .unwrap_or(self.request.district.as_str())
    }
}

impl FeatureSource for ResolvedRequest<'_> {
    fn continuous(&self, field: ContinuousField) -> FeatureResult<f64> {
        match field {
            ContinuousField::Area => Ok(self.request.area),
            ContinuousField::Rooms => Ok(self.request.rooms as f64),
            ContinuousField::Floor => Ok(self.request.floor as f64),
            ContinuousField::BuildYear => match self.request.build_year.filter(|y| y.is_finite()) {
                Some(year) => Ok(year),
                None => self.config.build_year_median(self.district()),
            },
            ContinuousField::BuildingFloors => match self.request.floors_in_building {
                Some(floors) => Ok(floors as f64),
                None => self.config.building_floors_median(self.district()),
            },
        }
    }

    fn category(&self, field: CategoricalField) -> FeatureResult<Option<&str>> {
        Ok(self.categories.get(&field).map(String::as_str))
    }

    fn has_utility(&self, tag: UtilityTag) -> bool {
        self.utilities.contains(&tag)
    }

    fn coordinates(&self) -> FeatureResult<Coordinates> {
        self.coordinates
            .ok_or_else(|| FeatureError::geocoding_failure(geocode_address(self.request)))
    }
}
