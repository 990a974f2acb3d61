//! Property-based tests for statistics fitting.
//!
//! Fitting the same batch twice must give bit-identical configs, and every
//! fitted config must satisfy its own invariants.

use proptest::prelude::*;

use homeprice_core::schema_config::CategoricalEncoding;
use homeprice_core::{
    CategoricalField, ModelVersion, PreprocessConfig, RawListing, StatisticsFitter,
};

const DISTRICTS: [&str; 3] = ["Krowodrza", "Podgórze", "Nowa Huta"];
const HEATING: [&str; 3] = ["gas", "boiler_room", "electric"];

#[derive(Debug, Clone)]
struct Row {
    district: usize,
    price_m2: f64,
    area: f64,
    rooms: Option<u32>,
    build_year: Option<f64>,
    building_floors: Option<f64>,
    floor: i32,
    heating: Option<usize>,
}

fn arb_row() -> impl Strategy<Value = Row> {
    (
        0usize..DISTRICTS.len(),
        5_000.0f64..25_000.0,
        18.0f64..140.0,
        prop::option::of(1u32..6),
        prop::option::of(prop_oneof![1900.0f64..2025.0, Just(99_999.0), Just(0.0)]),
        prop::option::of(1.0f64..15.0),
        -1i32..8,
        prop::option::of(0usize..HEATING.len()),
    )
        .prop_map(
            |(district, price_m2, area, rooms, build_year, building_floors, floor, heating)| Row {
                district,
                price_m2,
                area,
                rooms,
                build_year: build_year.map(f64::round),
                building_floors: building_floors.map(f64::round),
                floor,
                heating,
            },
        )
}

fn to_listing(row: &Row) -> RawListing {
    RawListing {
        name: Some("Mieszkanie".to_string()),
        price: Some((row.price_m2 * row.area).round()),
        area: Some(row.area),
        rooms: row.rooms.map(|r| r.to_string()),
        build_year: row.build_year,
        building_floors: row.building_floors,
        floor: Some(match row.floor {
            -1 => "cellar".to_string(),
            0 => "ground_floor".to_string(),
            n => format!("floor_{}", n),
        }),
        heating: row.heating.map(|h| HEATING[h].to_string()),
        state: Some("ready_to_use".to_string()),
        market: Some("secondary".to_string()),
        ownership: Some("full_ownership".to_string()),
        ad_type: Some("private".to_string()),
        district: Some(DISTRICTS[row.district].to_string()),
        utilities: vec!["balkon".to_string(), "garaż".to_string()],
        location_lat: Some(50.0 + row.district as f64 * 0.02),
        location_lon: Some(19.9 + row.area / 10_000.0),
        ..Default::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Re-running the fitter on the same input yields the same config, bit for bit.
    #[test]
    fn fitting_is_deterministic(
        rows in prop::collection::vec(arb_row(), 0..60),
        ordinal in any::<bool>(),
    ) {
        let listings: Vec<RawListing> = rows.iter().map(to_listing).collect();
        let encoding = if ordinal { CategoricalEncoding::Ordinal } else { CategoricalEncoding::OneHot };
        let fitter = StatisticsFitter::new(PreprocessConfig::default().with_encoding(encoding));
        let version = ModelVersion::new("krakow", "prop");

        let first = fitter.fit(&listings, version.clone());
        let second = fitter.fit(&listings, version);

        match (first, second) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(a.config.to_json().unwrap(), b.config.to_json().unwrap());
                prop_assert_eq!(&a.survivors, &b.survivors);
                prop_assert_eq!(a.report, b.report);
            }
            (Err(a), Err(b)) => prop_assert_eq!(a, b),
            (a, b) => prop_assert!(false, "diverging outcomes: {:?} / {:?}", a.is_ok(), b.is_ok()),
        }
    }

    /// Survivors respect the fitted bounds, the floor invariant and the vocabulary.
    #[test]
    fn survivors_satisfy_invariants(rows in prop::collection::vec(arb_row(), 2..60)) {
        let listings: Vec<RawListing> = rows.iter().map(to_listing).collect();
        let fitter = StatisticsFitter::new(PreprocessConfig::default());

        if let Ok(outcome) = fitter.fit(&listings, ModelVersion::new("krakow", "prop")) {
            let report = outcome.report;
            prop_assert_eq!(report.total_rows, listings.len());
            prop_assert_eq!(report.retained_rows + report.dropped_total(), report.total_rows);

            for s in &outcome.survivors {
                prop_assert!(outcome.config.accepts_price_per_m2(s.price_per_m2()));
                prop_assert!(s.building_floors >= s.floor);
                prop_assert!((1000.0..=2030.0).contains(&s.build_year));
                prop_assert!(s.rooms >= 1.0);
                prop_assert!(outcome
                    .config
                    .vocabulary()
                    .contains(CategoricalField::District, &s.district));
            }
        }
    }

    /// Serialized configs parse back to an identical config.
    #[test]
    fn config_json_is_stable(rows in prop::collection::vec(arb_row(), 10..40)) {
        let listings: Vec<RawListing> = rows.iter().map(to_listing).collect();
        let fitter = StatisticsFitter::new(PreprocessConfig::default());

        if let Ok(outcome) = fitter.fit(&listings, ModelVersion::new("krakow", "prop")) {
            let json = outcome.config.to_json().unwrap();
            let parsed = homeprice_core::SchemaConfig::from_json(&json).unwrap();
            prop_assert_eq!(&parsed, &outcome.config);
            prop_assert_eq!(parsed.feature_schema(), outcome.config.feature_schema());
        }
    }
}
