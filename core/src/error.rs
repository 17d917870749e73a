//! Error types for the recommender core.

use thiserror::Error;

/// Top-level error type for kopi-core operations.
///
/// Soft misses (a location filter that matches nothing, an unknown segment)
/// are not errors: they surface as empty result lists or zero contributions.
#[derive(Error, Debug)]
pub enum Error {
    /// The corpus is empty or unusable.
    #[error("data error: {0}")]
    Data(String),

    /// A caller-supplied parameter is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed delimited input.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed JSON artifact.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The embedding model failed to load or to encode text.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Malformed binary index artifact.
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}

impl Error {
    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Error::Embedding(msg.into())
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

/// Result type for kopi-core operations.
pub type Result<T> = std::result::Result<T, Error>;
