//! Highlights Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the highlights workspace.
//!
//! # Overview
//!
//! - **Types**: the fetched highlight batch and the per-record key derivation
//! - **Logging**: `tracing` subscriber setup driven by environment variables
//! - **Errors**: problems with the shape of a fetched document
//!
//! # Example
//!
//! ```no_run
//! use highlights_common::types::HighlightBatch;
//!
//! fn count(body: serde_json::Value) -> highlights_common::Result<usize> {
//!     let batch = HighlightBatch::from_value(body)?;
//!     Ok(batch.len())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
pub use types::{HighlightBatch, HighlightRecord, RecordKey};
