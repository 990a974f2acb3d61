//! Training-side preprocessing.
//!
//! [`TrainPreprocessor::fit_transform`] fits a [`SchemaConfig`] on the
//! training split and encodes it; [`TrainPreprocessor::transform`] encodes a
//! holdout split using only persisted statistics. Both produce vectors in
//! the canonical schema order of the config.

use std::fs::File;
use std::path::Path;

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{FeatureError, FeatureResult};
use crate::feature_spec::{resolve_vector, FeatureSpec, FeatureVector};
use crate::fitter::{screen, Candidate, CleanListing, StatisticsFitter};
use crate::schema_config::{CategoricalEncoding, FeatureSchema, SchemaConfig};
use crate::types::{ModelVersion, PreprocessReport, RawListing};

/// Name of the target column in exported batches.
pub const TARGET_COLUMN: &str = "price";

/// Configuration for training preprocessing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// IQR multiplier for the price-per-m² outlier filter (e.g., 1.5)
    pub iqr_multiplier: f64,
    /// Inclusive range of plausible build years; others count as missing
    pub build_year_range: (i32, i32),
    /// Case-insensitive name fragments marking listings to discard
    pub noise_markers: Vec<String>,
    /// Fewest rows a training batch may be reduced to
    pub min_records: usize,
    /// Number of equal-frequency area bins for room imputation
    pub room_bins: usize,
    /// Districts with fewer training rows are dropped
    pub min_district_count: usize,
    pub categorical_encoding: CategoricalEncoding,
    /// Floor assumed when the floor label is unparseable; `None` drops the row
    pub floor_default: Option<i32>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            iqr_multiplier: 1.5,
            build_year_range: (1000, 2030),
            noise_markers: vec!["tbs".to_string()],
            min_records: 2,
            room_bins: 10,
            min_district_count: 2,
            categorical_encoding: CategoricalEncoding::OneHot,
            floor_default: None,
        }
    }
}

impl PreprocessConfig {
    pub fn with_iqr_multiplier(mut self, k: f64) -> Self {
        self.iqr_multiplier = k;
        self
    }

    pub fn with_build_year_range(mut self, min: i32, max: i32) -> Self {
        self.build_year_range = (min, max);
        self
    }

    pub fn with_noise_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.noise_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_min_records(mut self, n: usize) -> Self {
        self.min_records = n;
        self
    }

    pub fn with_room_bins(mut self, bins: usize) -> Self {
        self.room_bins = bins;
        self
    }

    pub fn with_min_district_count(mut self, n: usize) -> Self {
        self.min_district_count = n;
        self
    }

    pub fn with_encoding(mut self, encoding: CategoricalEncoding) -> Self {
        self.categorical_encoding = encoding;
        self
    }

    pub fn with_floor_default(mut self, floor: Option<i32>) -> Self {
        self.floor_default = floor;
        self
    }
}

// ============================================================================
// Feature Batch
// ============================================================================

/// Encoded rows with their targets, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBatch {
    pub schema: FeatureSchema,
    pub rows: Vec<FeatureVector>,
    pub targets: Vec<f64>,
    pub report: PreprocessReport,
}

impl FeatureBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One column per schema feature plus the `price` target.
    pub fn to_dataframe(&self) -> FeatureResult<DataFrame> {
        let mut columns: Vec<Column> = self
            .schema
            .names()
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let values: Vec<f64> = self.rows.iter().map(|row| row[i]).collect();
                Series::new(name.as_str().into(), values).into()
            })
            .collect();
        columns.push(Series::new(TARGET_COLUMN.into(), self.targets.clone()).into());

        DataFrame::new(columns)
            .map_err(|e| FeatureError::PolarsError(format!("Failed to build batch frame: {}", e)))
    }

    /// Write the batch as CSV, header row first.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> FeatureResult<()> {
        let mut df = self.to_dataframe()?;
        let mut file = File::create(path.as_ref())
            .map_err(|e| FeatureError::IoError(format!("Failed to create file: {}", e)))?;

        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)
            .map_err(|e| FeatureError::PolarsError(format!("Failed to write CSV: {}", e)))
    }
}

// ============================================================================
// Train Preprocessor
// ============================================================================

/// Training-time preprocessing driver.
#[derive(Debug, Clone, Default)]
pub struct TrainPreprocessor {
    fitter: StatisticsFitter,
}

impl TrainPreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self {
            fitter: StatisticsFitter::new(config),
        }
    }

    pub fn config(&self) -> &PreprocessConfig {
        self.fitter.config()
    }

    /// Fit a config on the training split and encode the split with it.
    pub fn fit_transform(
        &self,
        listings: &[RawListing],
        version: ModelVersion,
    ) -> FeatureResult<(SchemaConfig, FeatureBatch)> {
        let outcome = self.fitter.fit(listings, version)?;
        let schema = outcome.config.feature_schema();
        let specs = FeatureSpec::compile_all(schema.names(), outcome.config.vocabulary())?;

        let mut rows = Vec::with_capacity(outcome.survivors.len());
        let mut targets = Vec::with_capacity(outcome.survivors.len());
        for listing in &outcome.survivors {
            rows.push(resolve_vector(&specs, listing, outcome.config.vocabulary())?);
            targets.push(listing.price);
        }

        let batch = FeatureBatch {
            schema,
            rows,
            targets,
            report: outcome.report,
        };
        Ok((outcome.config, batch))
    }

    /// Encode a holdout split with persisted statistics only.
    ///
    /// Rows that the config cannot place are dropped and counted: price
    /// outliers, districts with no fitted median, missing room counts and
    /// categories outside the vocabulary. Nothing is refitted.
    pub fn transform(
        &self,
        listings: &[RawListing],
        config: &SchemaConfig,
    ) -> FeatureResult<FeatureBatch> {
        let schema = config.feature_schema();
        let specs = FeatureSpec::compile_all(schema.names(), config.vocabulary())?;

        let mut report = PreprocessReport {
            total_rows: listings.len(),
            ..Default::default()
        };
        let mut rows = Vec::new();
        let mut targets = Vec::new();

        for candidate in screen(listings, self.config(), &mut report) {
            let Some(listing) = self.place(candidate, config, &mut report)? else {
                continue;
            };
            match resolve_vector(&specs, &listing, config.vocabulary()) {
                Ok(row) => {
                    rows.push(row);
                    targets.push(listing.price);
                }
                Err(FeatureError::UnknownCategory { field, value }) => {
                    debug!(%field, %value, "holdout row with unseen category dropped");
                    report.dropped_unknown_category += 1;
                }
                Err(e) => return Err(e),
            }
        }
        report.retained_rows = rows.len();

        info!(
            version = %config.version(),
            total = report.total_rows,
            retained = report.retained_rows,
            dropped = report.dropped_total(),
            unknown_category = report.dropped_unknown_category,
            "holdout batch encoded"
        );

        Ok(FeatureBatch {
            schema,
            rows,
            targets,
            report,
        })
    }

    /// Apply persisted bounds and medians to one screened row.
    ///
    /// `Ok(None)` means the row was dropped and counted.
    fn place(
        &self,
        mut candidate: Candidate,
        config: &SchemaConfig,
        report: &mut PreprocessReport,
    ) -> FeatureResult<Option<CleanListing>> {
        if !config.accepts_price_per_m2(candidate.price_per_m2()) {
            report.dropped_price_outlier += 1;
            return Ok(None);
        }

        if candidate.build_year.is_none() {
            match config.build_year_median(&candidate.district) {
                Ok(year) => candidate.build_year = Some(year),
                Err(e) => return Self::count_drop(e, report, |r| &mut r.dropped_build_year),
            }
        }

        if candidate.building_floors.is_none() {
            match config.building_floors_median(&candidate.district) {
                Ok(floors) => candidate.building_floors = Some(floors),
                Err(e) => return Self::count_drop(e, report, |r| &mut r.dropped_building_floors),
            }
        }

        if !candidate.floor_consistent() {
            report.dropped_floor_invariant += 1;
            return Ok(None);
        }

        match candidate.into_clean() {
            Some(listing) => Ok(Some(listing)),
            None => {
                report.dropped_rooms += 1;
                Ok(None)
            }
        }
    }

    fn count_drop<F>(
        err: FeatureError,
        report: &mut PreprocessReport,
        counter: F,
    ) -> FeatureResult<Option<CleanListing>>
    where
        F: FnOnce(&mut PreprocessReport) -> &mut usize,
    {
        match err {
            FeatureError::UnknownCategory { .. } => report.dropped_unknown_category += 1,
            FeatureError::ImputationUnavailable { .. } => *counter(report) += 1,
            other => return Err(other),
        }
        Ok(None)
    }
}
