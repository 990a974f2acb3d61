//! Scenario tests for the training and serving paths.

use std::sync::Arc;

use homeprice_core::{
    Coordinates, EncoderSettings, Estimate, EstimateRequest, FeatureError, FeatureResult,
    Geocoder, ModelVersion, PreprocessConfig, PriceEstimator, Predictor, RawListing,
    StatisticsFitter, TrainPreprocessor,
};

fn listing(district: &str, price: f64, area: f64) -> RawListing {
    RawListing {
        name: Some("Mieszkanie na sprzedaż".to_string()),
        price: Some(price),
        area: Some(area),
        rooms: Some("3".to_string()),
        build_year: Some(2000.0),
        building_floors: Some(4.0),
        floor: Some("floor_1".to_string()),
        heating: Some("boiler_room".to_string()),
        state: Some("ready_to_use".to_string()),
        market: Some("secondary".to_string()),
        ownership: Some("full_ownership".to_string()),
        ad_type: Some("private".to_string()),
        district: Some(district.to_string()),
        utilities: vec!["piwnica".to_string()],
        location_lat: Some(50.05),
        location_lon: Some(19.95),
        ..Default::default()
    }
}

fn version() -> ModelVersion {
    ModelVersion::new("krakow", "2.2.0")
}

struct AnywhereGeocoder;

impl Geocoder for AnywhereGeocoder {
    fn geocode(&self, _address: &str) -> Option<Coordinates> {
        Some(Coordinates::new(50.06, 19.94))
    }
}

struct ConstantModel {
    names: Vec<String>,
    version: ModelVersion,
    value: f64,
}

impl Predictor for ConstantModel {
    fn feature_names(&self) -> &[String] {
        &self.names
    }

    fn model_version(&self) -> &ModelVersion {
        &self.version
    }

    fn predict(&self, features: &[f64]) -> FeatureResult<f64> {
        assert_eq!(features.len(), self.names.len());
        Ok(self.value)
    }
}

fn request(district: &str) -> EstimateRequest {
    EstimateRequest {
        location: "Długa 10".to_string(),
        city: "Kraków".to_string(),
        district: district.to_string(),
        area: 48.0,
        rooms: 2,
        floor: 1,
        floors_in_building: None,
        build_year: None,
        balcony: false,
        separate_kitchen: true,
        state: "Do zamieszkania".to_string(),
        market: "Wtórny".to_string(),
        ad_type: "prywatny".to_string(),
        ownership: "Własnościowe".to_string(),
        heating: "miejskie".to_string(),
        available: Some("od zaraz".to_string()),
        garage: false,
        elevator: false,
        basement: true,
        rent: Some(600.0),
    }
}

#[test]
fn iqr_filter_removes_single_extreme_row() {
    let listings = vec![
        listing("A", 100.0, 1.0),
        listing("A", 102.0, 1.0),
        listing("A", 105.0, 1.0),
        listing("A", 1000.0, 1.0),
    ];
    let outcome = StatisticsFitter::new(PreprocessConfig::default())
        .fit(&listings, version())
        .unwrap();

    let mut prices: Vec<f64> = outcome.survivors.iter().map(|s| s.price).collect();
    prices.sort_by(f64::total_cmp);
    assert_eq!(prices, vec![100.0, 102.0, 105.0]);

    let bounds = outcome.config.price_bounds();
    assert!((bounds.q1 - 101.5).abs() < 1e-9);
    assert!((bounds.q3 - 328.75).abs() < 1e-9);
}

#[test]
fn district_medians_drive_imputation_and_reject_unseen_districts() {
    let mut listings = vec![
        listing("A", 500_000.0, 50.0),
        listing("A", 505_000.0, 50.0),
        listing("B", 450_000.0, 50.0),
        listing("B", 455_000.0, 50.0),
    ];
    listings[2].build_year = Some(1990.0);
    listings[3].build_year = Some(1990.0);
    let mut no_year = listing("A", 502_000.0, 50.0);
    no_year.build_year = None;
    listings.push(no_year);

    let pre = TrainPreprocessor::new(PreprocessConfig::default());
    let (config, batch) = pre.fit_transform(&listings, version()).unwrap();

    assert_eq!(config.build_year_median("A").unwrap(), 2000.0);
    assert_eq!(config.build_year_median("B").unwrap(), 1990.0);

    let year = batch.schema.position("build_year").unwrap();
    let area_row = batch
        .targets
        .iter()
        .position(|&t| t == 502_000.0)
        .unwrap();
    assert_eq!(batch.rows[area_row][year], 2000.0);

    let names = config.feature_schema().names().to_vec();
    let predictor = Arc::new(ConstantModel {
        names,
        version: version(),
        value: 612_345.0,
    });
    let estimator = PriceEstimator::new(
        config,
        predictor,
        Arc::new(AnywhereGeocoder),
        EncoderSettings::default(),
    )
    .unwrap();

    assert_eq!(
        estimator.estimate(&request("B")).unwrap(),
        Estimate { price: 612_000 }
    );

    let err = estimator.estimate(&request("C")).unwrap_err();
    assert!(
        matches!(
            err,
            FeatureError::UnknownCategory { .. } | FeatureError::ImputationUnavailable { .. }
        ),
        "got {err:?}"
    );
    assert!(err.is_client_error());
}

#[test]
fn floor_above_building_is_dropped_from_training() {
    let mut listings = vec![
        listing("A", 500_000.0, 50.0),
        listing("A", 505_000.0, 50.0),
        listing("A", 502_000.0, 50.0),
    ];
    listings[2].building_floors = Some(2.0);
    listings[2].floor = Some("floor_6".to_string());

    let pre = TrainPreprocessor::new(PreprocessConfig::default());
    let (_, batch) = pre.fit_transform(&listings, version()).unwrap();

    assert_eq!(batch.len(), 2);
    assert_eq!(batch.report.dropped_floor_invariant, 1);
    assert!(!batch.targets.contains(&502_000.0));
}

#[test]
fn unseen_holdout_categories_are_counted_not_encoded() {
    let listings = vec![
        listing("A", 500_000.0, 50.0),
        listing("A", 505_000.0, 50.0),
        listing("B", 450_000.0, 50.0),
        listing("B", 455_000.0, 50.0),
    ];
    let pre = TrainPreprocessor::new(PreprocessConfig::default());
    let (config, train) = pre.fit_transform(&listings, version()).unwrap();

    let mut gas = listing("A", 501_000.0, 50.0);
    gas.heating = Some("gas".to_string());
    let holdout = vec![gas, listing("Z", 501_000.0, 50.0), listing("B", 452_000.0, 50.0)];
    let test = pre.transform(&holdout, &config).unwrap();

    assert_eq!(test.schema, train.schema);
    assert_eq!(test.len(), 1);
    assert_eq!(test.report.dropped_unknown_category, 2);
    assert_eq!(test.targets, vec![452_000.0]);
}

#[test]
fn serving_utilities_follow_checkboxes() {
    let listings = vec![
        listing("A", 500_000.0, 50.0),
        listing("A", 505_000.0, 50.0),
    ];
    let pre = TrainPreprocessor::new(PreprocessConfig::default());
    let (config, _) = pre.fit_transform(&listings, version()).unwrap();

    let names = config.feature_schema().names().to_vec();
    let encoder = homeprice_core::InferenceEncoder::compile(&config, &names, EncoderSettings::default())
        .unwrap();
    let vector = encoder.encode(&request("A"), &AnywhereGeocoder).unwrap();
    let at = |name: &str| vector[encoder.schema().position(name).unwrap()];

    assert_eq!(at("utilities_piwnica"), 1.0);
    assert_eq!(at("utilities_pom. użytkowe"), 1.0);
    assert_eq!(at("utilities_oddzielna kuchnia"), 1.0);
    assert_eq!(at("utilities_balkon"), 0.0);
    assert_eq!(at("utilities_winda"), 0.0);
    assert_eq!(at("building_floors"), 4.0);
}

#[test]
fn empty_batch_is_insufficient() {
    let err = StatisticsFitter::new(PreprocessConfig::default())
        .fit(&[], version())
        .unwrap_err();
    assert!(matches!(err, FeatureError::InsufficientTrainingData { .. }));
    assert!(err.is_fatal());
}
