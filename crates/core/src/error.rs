//! Error types shared by the renderer crates.

use thiserror::Error;

/// Main error type for configuration and host-facing utilities.
#[derive(Error, Debug)]
pub enum Error {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration value is out of range or inconsistent
    #[error("Config error: {0}")]
    Config(String),

    /// The configuration text could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The configuration could not be serialized
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

/// Result type alias using the core Error type.
pub type Result<T> = std::result::Result<T, Error>;
