//! Error types for repopulse-core

use thiserror::Error;

/// Main error type for the repopulse-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A producer could not materialize a dataset
    #[error("producer failed for {domain}: {message}")]
    Producer { domain: String, message: String },

    /// Granularity string that is not one of D/W/M/Y
    #[error("invalid granularity: {0}")]
    InvalidGranularity(String),

    /// Domain identifier that is not recognized
    #[error("unknown domain: {0}")]
    UnknownDomain(String),

    /// Visualization name that is not recognized
    #[error("unknown visualization: {0}")]
    UnknownVisualization(String),
}

impl Error {
    /// Build a producer failure for a domain.
    pub fn producer(domain: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Error::Producer {
            domain: domain.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for repopulse-core
pub type Result<T> = std::result::Result<T, Error>;
