//! HTTP client for the highlights API

use async_trait::async_trait;
use highlights_common::HighlightBatch;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::{HighlightQuery, HighlightSource};
use crate::config::ApiConfig;
use crate::error::FetchError;

/// Longest error body kept in a [`FetchError::Status`]
const MAX_ERROR_BODY_CHARS: usize = 512;

pub struct HighlightClient {
    client: Client,
    url: String,
    host: String,
    key: String,
}

impl HighlightClient {
    pub fn new(config: &ApiConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            host: config.host.clone(),
            key: config.key.clone(),
        })
    }
}

#[async_trait]
impl HighlightSource for HighlightClient {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self, query: &HighlightQuery) -> Result<HighlightBatch, FetchError> {
        let limit = query.limit.to_string();
        let params = [
            ("date", query.date.as_str()),
            ("leagueName", query.league.as_str()),
            ("limit", limit.as_str()),
        ];

        let response = self
            .client
            .get(&self.url)
            .header("X-RapidAPI-Key", &self.key)
            .header("X-RapidAPI-Host", &self.host)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let bytes = response.bytes().await?;
        debug!(bytes = bytes.len(), "Received highlights response");

        let batch = HighlightBatch::from_slice(&bytes)?;
        info!(records = batch.len(), "Highlights fetched");

        Ok(batch)
    }
}
