//! Error types shared by every SessionForge component.

use thiserror::Error;

/// Errors produced by feature derivation, the model gateway, batch
/// evaluation and export.
#[derive(Error, Debug)]
pub enum Error {
    /// A model artifact could not be read or parsed.
    #[error("failed to load model artifact {path}: {reason}")]
    ArtifactLoad { path: String, reason: String },

    /// The gateway is disabled because artifact loading failed at startup.
    #[error("models unavailable: {0}")]
    ModelsUnavailable(String),

    /// A feature vector does not have the shape or layout a model expects.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A batch dataset lacks required columns.
    #[error("missing columns: [{}]", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// A model call failed at runtime.
    #[error("inference failed: {0}")]
    Inference(String),

    /// Raw session input is outside the accepted ranges.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("dataset error: {0}")]
    Dataset(#[from] polars::prelude::PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("chart rendering failed: {0}")]
    Chart(String),
}

impl Error {
    pub fn schema(msg: impl Into<String>) -> Self {
        Error::SchemaMismatch(msg.into())
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Error::Inference(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Prefix the message with a dataset row index, keeping the variant.
    pub fn at_row(self, row: usize) -> Self {
        match self {
            Error::SchemaMismatch(msg) => Error::SchemaMismatch(format!("row {}: {}", row, msg)),
            Error::Inference(msg) => Error::Inference(format!("row {}: {}", row, msg)),
            Error::InvalidInput(msg) => Error::InvalidInput(format!("row {}: {}", row, msg)),
            other => other,
        }
    }
}

/// Result type used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;
