//! Error types shared across the highlights workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The document is not shaped like a highlight batch
    #[error("Invalid highlight document: {0}")]
    InvalidDocument(String),
}
