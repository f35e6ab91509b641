//! Error types for the vibration analysis pipeline

use thiserror::Error;

/// Error type for sensor acquisition and spectrum analysis
#[derive(Error, Debug)]
pub enum AnalyzerError {
    /// Configuration rejected at startup
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Bus or device communication error
    #[error("Device communication error: {0}")]
    Communication(String),

    /// Invalid WHO_AM_I response
    #[error("Invalid WHO_AM_I response: expected 0x68, got 0x{0:02X}")]
    InvalidDeviceId(u8),

    /// Short read or write on the bus
    #[error("Data transfer error: expected {expected} bytes, transferred {actual}")]
    TransferError { expected: usize, actual: usize },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// File or device I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AnalyzerError {
    /// Whether the error only affects the current sample
    ///
    /// Transient errors skip one tick; everything else stops the pipeline.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AnalyzerError::Communication(_) | AnalyzerError::TransferError { .. }
        )
    }
}

/// Result type for analyzer operations
pub type Result<T> = std::result::Result<T, AnalyzerError>;
