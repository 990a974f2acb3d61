//! Listing loading using Polars.
//!
//! Reads scraped listings from CSV or Parquet and converts each row into a
//! [`RawListing`]. Only `price` and `area` columns are required; any other
//! column may be missing and is then treated as absent for every row.

use std::path::Path;

use polars::prelude::*;

use crate::error::{FeatureError, FeatureResult};
use crate::parsing::{district_from_location, normalize_text, parse_list_literal};
use crate::types::RawListing;

/// Columns a listing table must have.
pub const REQUIRED_COLUMNS: [&str; 2] = ["price", "area"];

/// Loader for scraped listing tables.
#[derive(Debug, Default)]
pub struct ListingLoader;

impl ListingLoader {
    /// Create a new ListingLoader.
    pub fn new() -> Self {
        Self
    }

    /// Load listings from a file (CSV or Parquet).
    ///
    /// # Returns
    /// * `Ok(Vec<RawListing>)` - One listing per row, in file order
    /// * `Err(FeatureError)` - If the file is missing, unreadable or lacks
    ///   a required column
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> FeatureResult<Vec<RawListing>> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(FeatureError::file_not_found(path.display().to_string()));
        }

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let df = match extension.to_lowercase().as_str() {
            "csv" => self.load_csv(path)?,
            "parquet" => self.load_parquet(path)?,
            _ => return Err(FeatureError::UnsupportedFormat(extension.to_string())),
        };

        self.listings_from_dataframe(&df)
    }

    /// Load CSV file using Polars.
    fn load_csv(&self, path: &Path) -> FeatureResult<DataFrame> {
        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(None)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .map_err(|e| FeatureError::PolarsError(format!("Failed to create CSV reader: {}", e)))?
            .finish()
            .map_err(|e| FeatureError::PolarsError(format!("Failed to read CSV: {}", e)))
    }

    /// Load Parquet file using Polars.
    fn load_parquet(&self, path: &Path) -> FeatureResult<DataFrame> {
        let file = std::fs::File::open(path)
            .map_err(|e| FeatureError::IoError(format!("Failed to open file: {}", e)))?;

        ParquetReader::new(file)
            .finish()
            .map_err(|e| FeatureError::PolarsError(format!("Failed to read Parquet: {}", e)))
    }

    /// Convert a listing table into records.
    pub fn listings_from_dataframe(&self, df: &DataFrame) -> FeatureResult<Vec<RawListing>> {
        self.validate_columns(df)?;

        let price = self.extract_f64_column(df, "price")?;
        let area = self.extract_f64_column(df, "area")?;
        let build_year = self.extract_f64_column(df, "build_year")?;
        let building_floors = self.extract_f64_column(df, "building_floors")?;
        let rent = self.extract_f64_column(df, "rent")?;
        let lat = self.extract_f64_column(df, "location_lat")?;
        let lon = self.extract_f64_column(df, "location_lon")?;

        let name = self.extract_str_column(df, "name")?;
        let rooms = self.extract_str_column(df, "rooms")?;
        let floor = self.extract_str_column(df, "floor")?;
        let heating = self.extract_str_column(df, "heating")?;
        let state = self.extract_str_column(df, "state")?;
        let market = self.extract_str_column(df, "market")?;
        let ownership = self.extract_str_column(df, "ownership")?;
        let ad_type = self.extract_str_column(df, "ad_type")?;
        let district = self.extract_str_column(df, "location_district")?;
        let location = self.extract_str_column(df, "location")?;
        let utilities = self.extract_str_column(df, "utilities")?;
        let scrapped_date = self.extract_str_column(df, "scrapped_date")?;

        let listings = (0..df.height())
            .map(|i| {
                let location = location[i]
                    .as_deref()
                    .map(parse_list_literal)
                    .unwrap_or_default();
                let district = normalize_text(district[i].as_deref())
                    .or_else(|| district_from_location(&location));

                RawListing {
                    name: name[i].clone(),
                    price: price[i],
                    area: area[i],
                    rooms: rooms[i].clone(),
                    build_year: build_year[i],
                    building_floors: building_floors[i],
                    floor: floor[i].clone(),
                    rent: rent[i],
                    heating: normalize_text(heating[i].as_deref()),
                    state: normalize_text(state[i].as_deref()),
                    market: normalize_text(market[i].as_deref()),
                    ownership: normalize_text(ownership[i].as_deref()),
                    ad_type: normalize_text(ad_type[i].as_deref()),
                    district,
                    location,
                    utilities: utilities[i]
                        .as_deref()
                        .map(parse_list_literal)
                        .unwrap_or_default(),
                    location_lat: lat[i],
                    location_lon: lon[i],
                    scrapped_date: scrapped_date[i].clone(),
                }
            })
            .collect();

        Ok(listings)
    }

    /// Validate that required columns exist.
    fn validate_columns(&self, df: &DataFrame) -> FeatureResult<()> {
        for col in REQUIRED_COLUMNS {
            if df.column(col).is_err() {
                return Err(FeatureError::missing_column(col));
            }
        }
        Ok(())
    }

    /// Extract a column as nullable f64; unparseable and non-finite cells are null.
    /// A missing column yields all nulls.
    fn extract_f64_column(&self, df: &DataFrame, name: &str) -> FeatureResult<Vec<Option<f64>>> {
        let Ok(column) = df.column(name) else {
            return Ok(vec![None; df.height()]);
        };

        let casted = column
            .cast(&DataType::Float64)
            .map_err(|e| FeatureError::PolarsError(format!("Cast of '{}' failed: {}", name, e)))?;

        let chunked = casted.f64().map_err(|_| {
            FeatureError::validation(format!("Column '{}' is not numeric", name))
        })?;

        Ok(chunked
            .into_iter()
            .map(|opt| opt.filter(|v| v.is_finite()))
            .collect())
    }

    /// Extract a column as nullable strings. A missing column yields all nulls.
    fn extract_str_column(&self, df: &DataFrame, name: &str) -> FeatureResult<Vec<Option<String>>> {
        let Ok(column) = df.column(name) else {
            return Ok(vec![None; df.height()]);
        };

        let casted = column
            .cast(&DataType::String)
            .map_err(|e| FeatureError::PolarsError(format!("Cast of '{}' failed: {}", name, e)))?;

        let chunked = casted.str().map_err(|_| {
            FeatureError::validation(format!("Column '{}' is not text", name))
        })?;

        Ok(chunked
            .into_iter()
            .map(|opt| opt.map(str::to_string))
            .collect())
    }
}
