//! Error types for Deployline configuration.

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating declarative configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid canary plan: {0}")]
    InvalidPlan(String),

    #[error("invalid alarm: {0}")]
    InvalidAlarm(String),

    #[error("unknown deployment preset: {0}")]
    UnknownPreset(String),

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: String, value: String },

    #[error("missing field: {0}")]
    Missing(String),
}
