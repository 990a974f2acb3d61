//! Geographic features: great-circle distances and geocoding.
//!
//! The derived location features are computed identically for training
//! rows (scraped coordinates) and serving requests (geocoded address).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{FeatureError, FeatureResult};

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance to `other` in kilometres.
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        haversine_km(self.lat, self.lon, other.lat, other.lon)
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// City-centre reference point for `distance_from_center`.
pub const CITY_CENTER: Coordinates = Coordinates::new(50.055, 19.94);

/// Premium-area reference point for `distance_from_other_expensive`.
pub const PREMIUM_AREA: Coordinates = Coordinates::new(50.065, 19.93);

/// Haversine distance between two points in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * a.sqrt().asin() * EARTH_RADIUS_KM
}

/// Features computed from a listing's coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DerivedFeature {
    LocationLat,
    LocationLon,
    DistanceFromCenter,
    DistanceFromOtherExpensive,
}

impl DerivedFeature {
    pub const ALL: [DerivedFeature; 4] = [
        DerivedFeature::LocationLat,
        DerivedFeature::LocationLon,
        DerivedFeature::DistanceFromCenter,
        DerivedFeature::DistanceFromOtherExpensive,
    ];

    /// Feature name in the schema.
    pub fn name(&self) -> &'static str {
        match self {
            DerivedFeature::LocationLat => "location_lat",
            DerivedFeature::LocationLon => "location_lon",
            DerivedFeature::DistanceFromCenter => "distance_from_center",
            DerivedFeature::DistanceFromOtherExpensive => "distance_from_other_expensive",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn compute(&self, at: &Coordinates) -> f64 {
        match self {
            DerivedFeature::LocationLat => at.lat,
            DerivedFeature::LocationLon => at.lon,
            DerivedFeature::DistanceFromCenter => at.distance_km(&CITY_CENTER),
            DerivedFeature::DistanceFromOtherExpensive => at.distance_km(&PREMIUM_AREA),
        }
    }
}

// ============================================================================
// Geocoding
// ============================================================================

/// Resolves a free-text address to coordinates.
///
/// Implementations are synchronous; the call blocks the requesting thread.
pub trait Geocoder: Send + Sync {
    fn geocode(&self, address: &str) -> Option<Coordinates>;
}

/// What to do when an address cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeocodePolicy {
    /// Reject the request with `GeocodingFailure`.
    #[default]
    Fail,
    /// Substitute a fixed point.
    FallbackTo(Coordinates),
}

impl GeocodePolicy {
    /// Geocode `address`, applying the policy on failure.
    pub fn resolve(&self, geocoder: &dyn Geocoder, address: &str) -> FeatureResult<Coordinates> {
        match geocoder.geocode(address).filter(Coordinates::is_valid) {
            Some(coords) => Ok(coords),
            None => match self {
                GeocodePolicy::Fail => Err(FeatureError::geocoding_failure(address)),
                GeocodePolicy::FallbackTo(coords) => {
                    tracing::warn!(lat = coords.lat, lon = coords.lon, "geocoding failed, using fallback point");
                    Ok(*coords)
                }
            },
        }
    }
}

/// Geocoder backed by a precomputed address table.
#[derive(Debug, Clone, Default)]
pub struct StaticGeocoder {
    entries: HashMap<String, Coordinates>,
}

impl StaticGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an address; lookups are case-insensitive and whitespace-trimmed.
    pub fn with_entry(mut self, address: &str, coords: Coordinates) -> Self {
        self.entries.insert(Self::key(address), coords);
        self
    }

    fn key(address: &str) -> String {
        address.trim().to_lowercase()
    }
}

impl Geocoder for StaticGeocoder {
    fn geocode(&self, address: &str) -> Option<Coordinates> {
        self.entries.get(&Self::key(address)).copied()
    }
}
