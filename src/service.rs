//! Serving entry point.
//!
//! A [`PriceEstimator`] is built once at startup from a loaded config and
//! predictor, then shared read-only between request handlers.

use std::sync::Arc;

use tracing::{info, warn};

use crate::encoder::{EncoderSettings, InferenceEncoder};
use crate::error::FeatureResult;
use crate::geo::Geocoder;
use crate::schema_config::SchemaConfig;
use crate::types::{Estimate, EstimateRequest, ModelVersion};
use crate::validator::SchemaValidator;
use crate::vocabulary::CategoricalField;

/// A trained regressor.
pub trait Predictor: Send + Sync {
    /// Feature names in the order `predict` expects them.
    fn feature_names(&self) -> &[String];

    fn model_version(&self) -> &ModelVersion;

    fn predict(&self, features: &[f64]) -> FeatureResult<f64>;
}

/// Immutable estimation service.
pub struct PriceEstimator {
    predictor: Arc<dyn Predictor>,
    geocoder: Arc<dyn Geocoder>,
    encoder: InferenceEncoder,
}

impl std::fmt::Debug for PriceEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceEstimator")
            .field("version", self.predictor.model_version())
            .field("features", &self.encoder.schema().len())
            .finish()
    }
}

impl PriceEstimator {
    /// Build the service, refusing to start on any inconsistency.
    ///
    /// Fails with `ConfigVersionMismatch` if `config` was not fitted for
    /// the predictor's version and with `SchemaMismatch` if the predictor's
    /// declared features differ from the config's schema.
    pub fn new(
        config: SchemaConfig,
        predictor: Arc<dyn Predictor>,
        geocoder: Arc<dyn Geocoder>,
        settings: EncoderSettings,
    ) -> FeatureResult<Self> {
        Self::with_validator(
            SchemaValidator::for_config(&config),
            config,
            predictor,
            geocoder,
            settings,
        )
    }

    /// Like [`PriceEstimator::new`] with an explicit validator, e.g.
    /// [`SchemaValidator::legacy_v2_1_1`] or an
    /// [`Exact`](crate::validator::OrderPolicy::Exact) one
    /// for positional models.
    pub fn with_validator(
        validator: SchemaValidator,
        config: SchemaConfig,
        predictor: Arc<dyn Predictor>,
        geocoder: Arc<dyn Geocoder>,
        settings: EncoderSettings,
    ) -> FeatureResult<Self> {
        let version = predictor.model_version().clone();
        if let Err(e) = config.ensure_version(&version) {
            warn!(error = %e, "refusing to serve");
            return Err(e);
        }
        validator.validate(predictor.feature_names())?;
        let encoder = InferenceEncoder::compile(&config, predictor.feature_names(), settings)?;

        info!(%version, features = encoder.schema().len(), "price estimator ready");
        Ok(Self {
            predictor,
            geocoder,
            encoder,
        })
    }

    pub fn version(&self) -> &ModelVersion {
        self.predictor.model_version()
    }

    pub fn config(&self) -> &SchemaConfig {
        self.encoder.config()
    }

    pub fn encoder(&self) -> &InferenceEncoder {
        &self.encoder
    }

    /// Estimate one request, floored to the nearest 1,000.
    pub fn estimate(&self, request: &EstimateRequest) -> FeatureResult<Estimate> {
        let features = self.encoder.encode(request, self.geocoder.as_ref())?;
        let raw = self.predictor.predict(&features)?;
        Ok(Estimate::from_prediction(raw))
    }

    /// Districts the model accepts, in vocabulary order.
    pub fn districts(&self) -> &[String] {
        self.config().vocabulary().values(CategoricalField::District)
    }
}
