//! Highlight sources
//!
//! A source turns fetch parameters into one batch. The HTTP client is the
//! production source; tests substitute their own.

use async_trait::async_trait;
use highlights_common::HighlightBatch;

use crate::error::FetchError;

pub mod client;

pub use client::HighlightClient;

/// Filter parameters for one fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightQuery {
    pub date: String,
    pub league: String,
    pub limit: u32,
}

impl From<&crate::config::QueryConfig> for HighlightQuery {
    fn from(query: &crate::config::QueryConfig) -> Self {
        Self {
            date: query.date.clone(),
            league: query.league.clone(),
            limit: query.limit,
        }
    }
}

#[async_trait]
pub trait HighlightSource: Send + Sync {
    /// Fetch one batch. Never retries; retry happens per stage.
    async fn fetch(&self, query: &HighlightQuery) -> Result<HighlightBatch, FetchError>;
}
