//! HomePrice Core
//!
//! Feature schema and encoding consistency engine for residential price
//! estimation. Fits cleaning statistics on training listings, persists them
//! as a versioned config, and encodes serving requests into exactly the
//! feature vectors the trained regressor expects.

pub mod error;
pub mod types;
pub mod parsing;
pub mod stats;
pub mod geo;
pub mod vocabulary;
pub mod schema_config;
pub mod data_loader;
pub mod feature_spec;
pub mod fitter;
pub mod preprocess;
pub mod split;
pub mod encoder;
pub mod validator;
pub mod service;
pub mod config_store;

pub use error::{FeatureError, FeatureResult};
pub use types::*;
pub use geo::{Coordinates, DerivedFeature, GeocodePolicy, Geocoder, StaticGeocoder};
pub use vocabulary::{CategoricalField, CategoricalMapping, UtilityTag, Vocabulary};
pub use schema_config::{CategoricalEncoding, ContinuousField, FeatureSchema, SchemaConfig};
pub use data_loader::ListingLoader;
pub use feature_spec::{FeatureKind, FeatureSource, FeatureSpec, FeatureVector};
pub use fitter::{CleanListing, FitOutcome, StatisticsFitter};
pub use preprocess::{FeatureBatch, PreprocessConfig, TrainPreprocessor};
pub use split::{stratified_split, Split, SplitConfig};
pub use encoder::{EncoderSettings, InferenceEncoder};
pub use validator::{OrderPolicy, SchemaValidator};
pub use service::{PriceEstimator, Predictor};
pub use config_store::{ConfigStore, FileConfigStore, SqliteConfigStore};
