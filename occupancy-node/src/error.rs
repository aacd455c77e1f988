use thiserror::Error;

#[derive(Error, Debug)]
pub enum OccupancyError {
    /// Malformed or conflicting camera configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The stream could not be opened or yielded no frame.
    #[error("Acquisition error: {0}")]
    AcquisitionError(String),

    /// The counting primitive failed; local to one zone.
    #[error("Detection error: {0}")]
    DetectionError(String),

    /// The sink rejected a batch of samples.
    #[error("Write error: {0}")]
    WriteError(String),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl OccupancyError {
    pub fn is_acquisition(&self) -> bool {
        matches!(self, OccupancyError::AcquisitionError(_))
    }
}

impl From<sqlx::Error> for OccupancyError {
    fn from(error: sqlx::Error) -> Self {
        OccupancyError::WriteError(error.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for OccupancyError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        OccupancyError::WriteError(format!("migration failed: {}", error))
    }
}

impl From<reqwest::Error> for OccupancyError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            OccupancyError::Timeout(error.to_string())
        } else {
            OccupancyError::AcquisitionError(error.to_string())
        }
    }
}

impl From<image::ImageError> for OccupancyError {
    fn from(error: image::ImageError) -> Self {
        OccupancyError::ImageError(error.to_string())
    }
}

impl From<serde_json::Error> for OccupancyError {
    fn from(error: serde_json::Error) -> Self {
        OccupancyError::SerializationError(error.to_string())
    }
}

impl From<serde_yaml::Error> for OccupancyError {
    fn from(error: serde_yaml::Error) -> Self {
        OccupancyError::ConfigError(error.to_string())
    }
}

impl From<config::ConfigError> for OccupancyError {
    fn from(error: config::ConfigError) -> Self {
        OccupancyError::ConfigError(error.to_string())
    }
}

impl From<validator::ValidationErrors> for OccupancyError {
    fn from(error: validator::ValidationErrors) -> Self {
        OccupancyError::ConfigError(error.to_string())
    }
}

impl From<prometheus::Error> for OccupancyError {
    fn from(error: prometheus::Error) -> Self {
        OccupancyError::ConfigError(format!("metrics registration failed: {}", error))
    }
}

impl From<tokio::time::error::Elapsed> for OccupancyError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        OccupancyError::Timeout(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OccupancyError>;
