//! Statistics fitting over a training batch.
//!
//! Steps, in order:
//! 1. Screen rows: price present, area positive, not a noise listing,
//!    district, floor and coordinates resolvable
//! 2. Drop districts too rare to stratify on
//! 3. Fit IQR bounds on price per m² and drop outliers
//! 4. Repair build years: invalid years become missing, missing years take
//!    the district median
//! 5. Repair building floor counts the same way, then drop rows claiming a
//!    floor above the building's top floor
//! 6. Impute room counts from the median of the row's area decile
//! 7. Fit the categorical vocabulary from the surviving rows

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{FeatureError, FeatureResult};
use crate::feature_spec::FeatureSource;
use crate::geo::Coordinates;
use crate::parsing::{normalize_text, parse_floor, parse_rooms, valid_build_year};
use crate::preprocess::PreprocessConfig;
use crate::schema_config::{ContinuousField, SchemaConfig};
use crate::stats::{equal_frequency_bins, median, IqrBounds};
use crate::types::{ModelVersion, PreprocessReport, RawListing};
use crate::vocabulary::{CategoricalField, UtilityTag, Vocabulary};

/// A listing after cleaning and imputation; every feature is resolvable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanListing {
    pub price: f64,
    pub area: f64,
    pub rooms: f64,
    pub build_year: f64,
    pub building_floors: f64,
    pub floor: f64,
    pub district: String,
    /// Canonical values of the non-district categorical fields that were present
    pub categories: BTreeMap<CategoricalField, String>,
    pub utilities: BTreeSet<UtilityTag>,
    pub coordinates: Coordinates,
}

impl CleanListing {
    pub fn price_per_m2(&self) -> f64 {
        self.price / self.area
    }
}

impl FeatureSource for CleanListing {
    fn continuous(&self, field: ContinuousField) -> FeatureResult<f64> {
        Ok(match field {
            ContinuousField::Area => self.area,
            ContinuousField::BuildYear => self.build_year,
            ContinuousField::BuildingFloors => self.building_floors,
            ContinuousField::Floor => self.floor,
            ContinuousField::Rooms => self.rooms,
        })
    }

    fn category(&self, field: CategoricalField) -> FeatureResult<Option<&str>> {
        Ok(match field {
            CategoricalField::District => Some(self.district.as_str()),
            other => self.categories.get(&other).map(String::as_str),
        })
    }

    fn has_utility(&self, tag: UtilityTag) -> bool {
        self.utilities.contains(&tag)
    }

    fn coordinates(&self) -> FeatureResult<Coordinates> {
        Ok(self.coordinates)
    }
}

/// A screened listing whose imputable fields may still be missing.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub price: f64,
    pub area: f64,
    pub rooms: Option<f64>,
    pub build_year: Option<f64>,
    pub building_floors: Option<f64>,
    pub floor: i32,
    pub district: String,
    pub categories: BTreeMap<CategoricalField, String>,
    pub utilities: BTreeSet<UtilityTag>,
    pub coordinates: Coordinates,
}

impl Candidate {
    pub fn price_per_m2(&self) -> f64 {
        self.price / self.area
    }

    /// Finish a candidate whose imputable fields are all resolved.
    pub fn into_clean(self) -> Option<CleanListing> {
        Some(CleanListing {
            price: self.price,
            area: self.area,
            rooms: self.rooms?,
            build_year: self.build_year?,
            building_floors: self.building_floors?,
            floor: self.floor as f64,
            district: self.district,
            categories: self.categories,
            utilities: self.utilities,
            coordinates: self.coordinates,
        })
    }

    /// A listing cannot sit above its building's top floor.
    pub fn floor_consistent(&self) -> bool {
        self.building_floors
            .map(|floors| floors >= self.floor as f64)
            .unwrap_or(false)
    }
}

/// Row screening shared by the training and holdout paths.
///
/// Counts every drop in `report`; the count of retained rows is left to
/// the caller.
pub(crate) fn screen(
    listings: &[RawListing],
    config: &PreprocessConfig,
    report: &mut PreprocessReport,
) -> Vec<Candidate> {
    let markers: Vec<String> = config
        .noise_markers
        .iter()
        .map(|m| m.to_lowercase())
        .collect();

    let mut candidates = Vec::with_capacity(listings.len());

    for raw in listings {
        let Some(price) = raw.price.filter(|p| p.is_finite() && *p > 0.0) else {
            report.dropped_missing_price += 1;
            continue;
        };

        let Some(area) = raw.area.filter(|a| a.is_finite() && *a > 0.0) else {
            report.dropped_missing_area += 1;
            continue;
        };

        let is_noise = raw
            .name
            .as_deref()
            .map(|name| {
                let name = name.to_lowercase();
                markers.iter().any(|m| name.contains(m.as_str()))
            })
            .unwrap_or(false);
        if is_noise {
            report.dropped_noise += 1;
            continue;
        }

        let Some(district) = normalize_text(raw.district.as_deref()) else {
            report.dropped_missing_district += 1;
            continue;
        };

        let Some(floor) = parse_floor(raw.floor.as_deref(), config.floor_default) else {
            report.dropped_floor += 1;
            continue;
        };

        let coordinates = match (raw.location_lat, raw.location_lon) {
            (Some(lat), Some(lon)) => Coordinates::new(lat, lon),
            _ => {
                report.dropped_location += 1;
                continue;
            }
        };
        if !coordinates.is_valid() {
            report.dropped_location += 1;
            continue;
        }

        let categories = [
            (CategoricalField::AdType, &raw.ad_type),
            (CategoricalField::Heating, &raw.heating),
            (CategoricalField::Market, &raw.market),
            (CategoricalField::Ownership, &raw.ownership),
            (CategoricalField::State, &raw.state),
        ]
        .into_iter()
        .filter_map(|(field, value)| normalize_text(value.as_deref()).map(|v| (field, v)))
        .collect();

        // Closed world: tags outside the modelled set are ignored
        let utilities = raw
            .utilities
            .iter()
            .filter_map(|tag| UtilityTag::from_tag(tag))
            .collect();

        candidates.push(Candidate {
            price,
            area,
            rooms: parse_rooms(raw.rooms.as_deref()).map(f64::from),
            build_year: valid_build_year(raw.build_year, config.build_year_range),
            building_floors: raw.building_floors.filter(|f| f.is_finite() && *f >= 0.0),
            floor,
            district,
            categories,
            utilities,
            coordinates,
        });
    }

    candidates
}

/// Per-district median of `value`, rounded, over the given candidates.
///
/// Every district in `candidates` gets an entry; `None` marks a district
/// with no observed value.
fn district_medians<F>(candidates: &[Candidate], value: F) -> BTreeMap<String, Option<f64>>
where
    F: Fn(&Candidate) -> Option<f64>,
{
    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for c in candidates {
        let entry = groups.entry(c.district.clone()).or_default();
        if let Some(v) = value(c) {
            entry.push(v);
        }
    }
    groups
        .into_iter()
        .map(|(district, values)| (district, median(&values).map(f64::round)))
        .collect()
}

/// Result of fitting: the config, the cleaned training rows and the
/// per-reason row accounting.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub config: SchemaConfig,
    pub survivors: Vec<CleanListing>,
    pub report: PreprocessReport,
}

/// Fits persisted statistics over a training batch.
#[derive(Debug, Clone, Default)]
pub struct StatisticsFitter {
    config: PreprocessConfig,
}

impl StatisticsFitter {
    /// Create a new StatisticsFitter with the given configuration.
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Get the current configuration
    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Fit statistics over `listings`, producing config version `version`.
    ///
    /// Fails with `MissingColumn` if no listing carries a price or area at
    /// all and with `InsufficientTrainingData` if fewer than
    /// `min_records` rows survive cleaning.
    pub fn fit(&self, listings: &[RawListing], version: ModelVersion) -> FeatureResult<FitOutcome> {
        let cfg = &self.config;
        let required = cfg.min_records.max(1);

        if listings.is_empty() {
            return Err(FeatureError::insufficient_data(0, required));
        }
        if listings.iter().all(|l| l.price.is_none()) {
            return Err(FeatureError::missing_column("price"));
        }
        if listings.iter().all(|l| l.area.is_none()) {
            return Err(FeatureError::missing_column("area"));
        }

        let mut report = PreprocessReport {
            total_rows: listings.len(),
            ..Default::default()
        };

        // 1. Screening
        let mut candidates = screen(listings, cfg, &mut report);

        // 2. Rare districts
        let mut district_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for c in &candidates {
            *district_counts.entry(c.district.as_str()).or_default() += 1;
        }
        let rare: BTreeSet<String> = district_counts
            .into_iter()
            .filter(|(_, n)| *n < cfg.min_district_count)
            .map(|(d, _)| d.to_string())
            .collect();
        let before = candidates.len();
        candidates.retain(|c| !rare.contains(&c.district));
        report.dropped_rare_district += before - candidates.len();

        // 3. Price-per-m² outliers
        let price_m2: Vec<f64> = candidates.iter().map(Candidate::price_per_m2).collect();
        let Some(bounds) = IqrBounds::fit(&price_m2, cfg.iqr_multiplier) else {
            return Err(self.abort(&report, 0));
        };
        let before = candidates.len();
        candidates.retain(|c| bounds.contains(c.price_per_m2()));
        report.dropped_price_outlier += before - candidates.len();
        debug!(
            lower = bounds.lower,
            upper = bounds.upper,
            removed = report.dropped_price_outlier,
            "price per m2 bounds fitted"
        );

        // 4. Build year
        let build_year_medians = district_medians(&candidates, |c| c.build_year);
        for c in candidates.iter_mut() {
            if c.build_year.is_none() {
                c.build_year = build_year_medians.get(&c.district).copied().flatten();
            }
        }
        let before = candidates.len();
        candidates.retain(|c| c.build_year.is_some());
        report.dropped_build_year += before - candidates.len();

        // 5. Building floors
        let building_floors_medians = district_medians(&candidates, |c| c.building_floors);
        for c in candidates.iter_mut() {
            if c.building_floors.is_none() {
                c.building_floors = building_floors_medians.get(&c.district).copied().flatten();
            }
        }
        let before = candidates.len();
        candidates.retain(|c| c.building_floors.is_some());
        report.dropped_building_floors += before - candidates.len();

        let before = candidates.len();
        candidates.retain(Candidate::floor_consistent);
        report.dropped_floor_invariant += before - candidates.len();

        // 6. Rooms
        self.impute_rooms(&mut candidates);
        let before = candidates.len();
        candidates.retain(|c| c.rooms.is_some());
        report.dropped_rooms += before - candidates.len();

        if candidates.len() < required {
            return Err(self.abort(&report, candidates.len()));
        }

        // 7. Vocabulary
        let vocabulary = Vocabulary::fit(candidates.iter().flat_map(|c| {
            std::iter::once((CategoricalField::District, c.district.as_str())).chain(
                c.categories
                    .iter()
                    .map(|(field, value)| (*field, value.as_str())),
            )
        }));

        let survivors: Vec<CleanListing> = candidates
            .into_iter()
            .filter_map(Candidate::into_clean)
            .collect();
        report.retained_rows = survivors.len();

        let config = SchemaConfig::new(
            version,
            cfg.categorical_encoding,
            bounds,
            build_year_medians,
            building_floors_medians,
            vocabulary,
        );

        info!(
            version = %config.version(),
            total = report.total_rows,
            retained = report.retained_rows,
            dropped = report.dropped_total(),
            price_m2_lower = bounds.lower,
            price_m2_upper = bounds.upper,
            districts = config.vocabulary().values(CategoricalField::District).len(),
            vocabulary_sizes = ?config.vocabulary().sizes(),
            "schema statistics fitted"
        );

        Ok(FitOutcome {
            config,
            survivors,
            report,
        })
    }

    /// Fill missing room counts with the median of the row's area decile,
    /// falling back to `area / average room size` when the decile has none.
    fn impute_rooms(&self, candidates: &mut [Candidate]) {
        if candidates.iter().all(|c| c.rooms.is_some()) {
            return;
        }

        let areas: Vec<f64> = candidates.iter().map(|c| c.area).collect();
        let bins = equal_frequency_bins(&areas, self.config.room_bins);

        let mut per_bin: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
        for (c, bin) in candidates.iter().zip(&bins) {
            if let Some(rooms) = c.rooms {
                per_bin.entry(*bin).or_default().push(rooms);
            }
        }
        let bin_medians: BTreeMap<usize, f64> = per_bin
            .into_iter()
            .filter_map(|(bin, rooms)| median(&rooms).map(|m| (bin, m.round())))
            .collect();

        let (area_sum, room_sum) = candidates
            .iter()
            .filter_map(|c| c.rooms.map(|r| (c.area, r)))
            .fold((0.0, 0.0), |(a, r), (area, rooms)| (a + area, r + rooms));
        let avg_room_size = (room_sum > 0.0).then(|| area_sum / room_sum);

        for (c, bin) in candidates.iter_mut().zip(&bins) {
            if c.rooms.is_some() {
                continue;
            }
            c.rooms = bin_medians
                .get(bin)
                .copied()
                .or_else(|| avg_room_size.map(|size| (c.area / size).round().max(1.0)));
        }
    }

    fn abort(&self, report: &PreprocessReport, remaining: usize) -> FeatureError {
        let required = self.config.min_records.max(1);
        warn!(
            total = report.total_rows,
            remaining,
            required,
            missing_price = report.dropped_missing_price,
            noise = report.dropped_noise,
            rare_district = report.dropped_rare_district,
            price_outlier = report.dropped_price_outlier,
            build_year = report.dropped_build_year,
            building_floors = report.dropped_building_floors,
            floor_invariant = report.dropped_floor_invariant,
            rooms = report.dropped_rooms,
            location = report.dropped_location,
            "training batch exhausted by cleaning"
        );
        FeatureError::insufficient_data(remaining, required)
    }
}
