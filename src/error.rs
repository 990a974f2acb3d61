//! Error Handling Module
//!
//! Structured error types shared by the training pipeline and the serving
//! encoder. Uses `thiserror` for the definitions and maps every variant to
//! the status code the request boundary reports.
//!
//! # Propagation
//! 1. Training-time errors abort the run
//! 2. Serving-time client errors reject a single request
//! 3. Load-time errors (config, predictor, schema) block startup

use thiserror::Error;

// ============================================================================
// Status Codes
// ============================================================================

pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_CONFLICT: u16 = 409;
pub const STATUS_UNPROCESSABLE: u16 = 422;
pub const STATUS_INTERNAL: u16 = 500;

// ============================================================================
// Error Types
// ============================================================================

/// Main error type for feature fitting, persistence and encoding.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    // Schema Errors
    #[error("Schema mismatch: {detail} (missing: {missing:?}, unexpected: {unexpected:?})")]
    SchemaMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
        detail: String,
    },

    #[error("Unknown category for '{field}': {value}")]
    UnknownCategory { field: String, value: String },

    #[error("No fitted {statistic} median for district '{district}'")]
    ImputationUnavailable { statistic: String, district: String },

    #[error("Could not geocode address: {address}")]
    GeocodingFailure { address: String },

    // Training Errors
    #[error("Insufficient training data: {remaining} rows remain, at least {required} required")]
    InsufficientTrainingData { remaining: usize, required: usize },

    #[error("Missing required column: {column}")]
    MissingColumn { column: String },

    // Config Errors
    #[error("Config version mismatch: expected {expected}, found {found}")]
    ConfigVersionMismatch { expected: String, found: String },

    #[error("Config version already exists: {version}")]
    ConfigAlreadyExists { version: String },

    #[error("Config version not found: {version}")]
    ConfigNotFound { version: String },

    // Input Errors
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Data validation failed: {0}")]
    ValidationError(String),

    // Wrapped Errors
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Polars error: {0}")]
    PolarsError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Prediction failed: {0}")]
    PredictionError(String),
}

/// Result type alias for convenience.
pub type FeatureResult<T> = Result<T, FeatureError>;

// ============================================================================
// Status Code Conversion
// ============================================================================

impl FeatureError {
    /// Status code reported at the request boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            FeatureError::UnknownCategory { .. } => STATUS_UNPROCESSABLE,
            FeatureError::ImputationUnavailable { .. } => STATUS_UNPROCESSABLE,
            FeatureError::GeocodingFailure { .. } => STATUS_UNPROCESSABLE,
            FeatureError::ValidationError(_) => STATUS_BAD_REQUEST,

            FeatureError::ConfigNotFound { .. } => STATUS_NOT_FOUND,
            FeatureError::FileNotFound { .. } => STATUS_NOT_FOUND,
            FeatureError::ConfigAlreadyExists { .. } => STATUS_CONFLICT,

            FeatureError::SchemaMismatch { .. }
            | FeatureError::InsufficientTrainingData { .. }
            | FeatureError::MissingColumn { .. }
            | FeatureError::ConfigVersionMismatch { .. }
            | FeatureError::UnsupportedFormat(_)
            | FeatureError::IoError(_)
            | FeatureError::PolarsError(_)
            | FeatureError::DatabaseError(_)
            | FeatureError::SerializationError(_)
            | FeatureError::PredictionError(_) => STATUS_INTERNAL,
        }
    }

    /// True when the error describes a bad request rather than a broken service.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// True when the error must stop the process (startup) or the run (training).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FeatureError::SchemaMismatch { .. }
                | FeatureError::InsufficientTrainingData { .. }
                | FeatureError::ConfigVersionMismatch { .. }
                | FeatureError::MissingColumn { .. }
        )
    }
}

// ============================================================================
// Error Conversion Implementations
// ============================================================================

impl From<std::io::Error> for FeatureError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            FeatureError::FileNotFound {
                path: "unknown".to_string(),
            }
        } else {
            FeatureError::IoError(err.to_string())
        }
    }
}

impl From<polars::error::PolarsError> for FeatureError {
    fn from(err: polars::error::PolarsError) -> Self {
        FeatureError::PolarsError(err.to_string())
    }
}

impl From<rusqlite::Error> for FeatureError {
    fn from(err: rusqlite::Error) -> Self {
        FeatureError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for FeatureError {
    fn from(err: serde_json::Error) -> Self {
        FeatureError::SerializationError(err.to_string())
    }
}

// ============================================================================
// Error Construction Helpers
// ============================================================================

impl FeatureError {
    /// Create a schema mismatch error.
    pub fn schema_mismatch(
        missing: Vec<String>,
        unexpected: Vec<String>,
        detail: impl Into<String>,
    ) -> Self {
        FeatureError::SchemaMismatch {
            missing,
            unexpected,
            detail: detail.into(),
        }
    }

    /// Create an unknown category error.
    pub fn unknown_category(field: impl Into<String>, value: impl Into<String>) -> Self {
        FeatureError::UnknownCategory {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create an imputation unavailable error.
    pub fn imputation_unavailable(
        statistic: impl Into<String>,
        district: impl Into<String>,
    ) -> Self {
        FeatureError::ImputationUnavailable {
            statistic: statistic.into(),
            district: district.into(),
        }
    }

    /// Create a geocoding failure error.
    pub fn geocoding_failure(address: impl Into<String>) -> Self {
        FeatureError::GeocodingFailure {
            address: address.into(),
        }
    }

    /// Create an insufficient training data error.
    pub fn insufficient_data(remaining: usize, required: usize) -> Self {
        FeatureError::InsufficientTrainingData { remaining, required }
    }

    /// Create a missing column error.
    pub fn missing_column(column: impl Into<String>) -> Self {
        FeatureError::MissingColumn {
            column: column.into(),
        }
    }

    /// Create a config version mismatch error.
    pub fn version_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        FeatureError::ConfigVersionMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        FeatureError::FileNotFound { path: path.into() }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        FeatureError::ValidationError(message.into())
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        FeatureError::DatabaseError(message.into())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_category_is_client_error() {
        let err = FeatureError::unknown_category("location_district", "Mokotów");
        assert_eq!(err.status_code(), STATUS_UNPROCESSABLE);
        assert!(err.is_client_error());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_geocoding_failure_is_client_error() {
        let err = FeatureError::geocoding_failure("nowhere 1");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_schema_mismatch_is_fatal() {
        let err = FeatureError::schema_mismatch(vec!["area".into()], vec![], "missing features");
        assert_eq!(err.status_code(), STATUS_INTERNAL);
        assert!(err.is_fatal());
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_insufficient_data_is_fatal() {
        let err = FeatureError::insufficient_data(1, 2);
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Insufficient training data: 1 rows remain, at least 2 required"
        );
    }

    #[test]
    fn test_error_display() {
        let err = FeatureError::unknown_category("heating", "coal");
        assert_eq!(err.to_string(), "Unknown category for 'heating': coal");

        let err = FeatureError::version_mismatch("krakow@2", "krakow@1");
        assert_eq!(
            err.to_string(),
            "Config version mismatch: expected krakow@2, found krakow@1"
        );

        let err = FeatureError::imputation_unavailable("build_year", "Nowa Huta");
        assert_eq!(
            err.to_string(),
            "No fitted build_year median for district 'Nowa Huta'"
        );
    }

    #[test]
    fn test_config_conflict_code() {
        let err = FeatureError::ConfigAlreadyExists {
            version: "krakow@1".into(),
        };
        assert_eq!(err.status_code(), STATUS_CONFLICT);
    }

    #[test]
    fn test_from_io_error_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FeatureError = io_err.into();

        match err {
            FeatureError::FileNotFound { .. } => {}
            _ => panic!("Expected FileNotFound error"),
        }
    }

    #[test]
    fn test_from_io_error_other() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: FeatureError = io_err.into();

        match err {
            FeatureError::IoError(msg) => assert!(msg.contains("access denied")),
            _ => panic!("Expected IoError"),
        }
    }

    #[test]
    fn test_from_serde_error() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: FeatureError = parse.unwrap_err().into();
        assert!(matches!(err, FeatureError::SerializationError(_)));
    }
}
