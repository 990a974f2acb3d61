//! Core data structures shared by the training and serving paths.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder the scraper writes when a listing omits a field.
pub const MISSING_INFO: &str = "brak informacji";

/// One scraped listing as it comes out of the record source.
///
/// Every field may be absent; numeric fields that arrived as text the
/// scraper could not parse are already `None` here. Floor and rooms stay
/// textual because their parsing is part of preprocessing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    /// Listing title (free text)
    pub name: Option<String>,
    /// Asking price
    pub price: Option<f64>,
    /// Usable area in m²
    pub area: Option<f64>,
    /// Room count as scraped ("3", "more", ...)
    pub rooms: Option<String>,
    /// Year of construction
    pub build_year: Option<f64>,
    /// Number of floors in the building
    pub building_floors: Option<f64>,
    /// Floor descriptor as scraped ("cellar", "ground_floor", "floor_3", ...)
    pub floor: Option<String>,
    /// Monthly rent
    pub rent: Option<f64>,
    pub heating: Option<String>,
    pub state: Option<String>,
    pub market: Option<String>,
    pub ownership: Option<String>,
    pub ad_type: Option<String>,
    /// District; derived from `location` when the source has no district column
    pub district: Option<String>,
    /// Location components, most specific first
    pub location: Vec<String>,
    /// Utility tags
    pub utilities: Vec<String>,
    pub location_lat: Option<f64>,
    pub location_lon: Option<f64>,
    /// Scrape metadata, never a feature
    pub scrapped_date: Option<String>,
}

/// Identifies one fitted statistics bundle: a city and a model version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModelVersion {
    pub city: String,
    pub version: String,
}

impl ModelVersion {
    pub fn new(city: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.city, self.version)
    }
}

/// Serving request as submitted by the estimation form.
///
/// Categorical fields carry display values; they are translated to the
/// canonical vocabulary by the encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateRequest {
    /// Free-text address used for geocoding
    pub location: String,
    pub city: String,
    pub district: String,
    pub area: f64,
    pub rooms: i32,
    pub floor: i32,
    #[serde(rename = "floorsInBuilding", default)]
    pub floors_in_building: Option<i32>,
    #[serde(default)]
    pub build_year: Option<f64>,

    pub balcony: bool,
    pub separate_kitchen: bool,

    pub state: String,
    pub market: String,
    pub ad_type: String,
    pub ownership: String,
    pub heating: String,
    /// Availability; accepted but not modelled
    #[serde(default)]
    pub available: Option<String>,

    pub garage: bool,
    pub elevator: bool,
    pub basement: bool,

    #[serde(default)]
    pub rent: Option<f64>,
}

/// Serving output: price rounded down to the nearest 1,000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Estimate {
    pub price: u64,
}

impl Estimate {
    /// Granularity of published estimates.
    pub const ROUNDING: u64 = 1_000;

    /// Build an estimate from a raw prediction, flooring to `ROUNDING`.
    /// Negative and non-finite predictions collapse to zero.
    pub fn from_prediction(raw: f64) -> Self {
        if !raw.is_finite() || raw <= 0.0 {
            return Self { price: 0 };
        }
        let whole = raw.floor() as u64;
        Self {
            price: whole - whole % Self::ROUNDING,
        }
    }
}

/// Per-reason row accounting for one preprocessing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessReport {
    pub total_rows: usize,
    pub dropped_missing_price: usize,
    pub dropped_missing_area: usize,
    pub dropped_noise: usize,
    pub dropped_missing_district: usize,
    pub dropped_rare_district: usize,
    pub dropped_price_outlier: usize,
    pub dropped_build_year: usize,
    pub dropped_floor: usize,
    pub dropped_building_floors: usize,
    pub dropped_floor_invariant: usize,
    pub dropped_rooms: usize,
    pub dropped_location: usize,
    pub dropped_unknown_category: usize,
    pub retained_rows: usize,
}

impl PreprocessReport {
    pub fn dropped_total(&self) -> usize {
        self.dropped_missing_price
            + self.dropped_missing_area
            + self.dropped_noise
            + self.dropped_missing_district
            + self.dropped_rare_district
            + self.dropped_price_outlier
            + self.dropped_build_year
            + self.dropped_floor
            + self.dropped_building_floors
            + self.dropped_floor_invariant
            + self.dropped_rooms
            + self.dropped_location
            + self.dropped_unknown_category
    }
}
