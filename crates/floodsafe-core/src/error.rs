use thiserror::Error;

/// Top-level error type for FloodSafe.
///
/// Subsystem crates define their own error types for their collaborators
/// (chat completion, geocoding, prediction); this type covers what every
/// crate shares: configuration, I/O and serialization.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FloodSafeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid coordinates: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },
}

impl From<toml::de::Error> for FloodSafeError {
    fn from(err: toml::de::Error) -> Self {
        FloodSafeError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for FloodSafeError {
    fn from(err: toml::ser::Error) -> Self {
        FloodSafeError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for FloodSafeError {
    fn from(err: serde_json::Error) -> Self {
        FloodSafeError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for FloodSafe operations.
pub type Result<T> = std::result::Result<T, FloodSafeError>;
