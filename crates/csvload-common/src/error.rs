//! Error types shared by csvload crates

use thiserror::Error;

/// Result type alias for csvload operations
pub type Result<T> = std::result::Result<T, CsvloadError>;

/// Main error type for csvload
#[derive(Error, Debug)]
pub enum CsvloadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidEnv {
        key: String,
        value: String,
        reason: String,
    },
}

impl CsvloadError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
