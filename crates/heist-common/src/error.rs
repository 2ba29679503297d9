//! Error types shared across the heist crates.

use thiserror::Error;

/// Top-level error type for heist operations.
#[derive(Debug, Error)]
pub enum HeistError {
    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML could not be parsed into the config schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be rendered back to TOML
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is outside the range the simulation accepts
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field
        field: String,
        /// Why it was rejected
        reason: String,
    },
}

/// Result type alias for heist operations.
pub type HeistResult<T> = Result<T, HeistError>;
