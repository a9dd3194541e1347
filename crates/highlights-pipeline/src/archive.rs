//! Raw batch archival
//!
//! The whole batch is written as one JSON object under `highlights/`.
//! Re-using a name overwrites the previous object.

use highlights_common::HighlightBatch;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::error::WriteError;
use crate::provision::ResourceProvisioner;
use crate::storage::ObjectStore;

/// Prefix for every archive object
pub const ARCHIVE_PREFIX: &str = "highlights";

pub const ARCHIVE_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReceipt {
    pub bucket: String,
    pub key: String,
    pub bytes: usize,
}

pub fn archive_key(base_name: &str) -> String {
    format!("{}/{}.json", ARCHIVE_PREFIX, base_name)
}

pub struct ArchivalWriter {
    store: Arc<dyn ObjectStore>,
    provisioner: Arc<ResourceProvisioner>,
}

impl ArchivalWriter {
    pub fn new(store: Arc<dyn ObjectStore>, provisioner: Arc<ResourceProvisioner>) -> Self {
        Self { store, provisioner }
    }

    #[instrument(skip(self, batch), fields(bucket = %self.store.bucket()))]
    pub async fn archive(
        &self,
        batch: &HighlightBatch,
        base_name: &str,
    ) -> Result<ArchiveReceipt, WriteError> {
        self.provisioner.ensure_bucket().await?;

        let key = archive_key(base_name);
        let body = batch.to_json_bytes()?;
        let bytes = body.len();

        self.store
            .put_object(&key, body, ARCHIVE_CONTENT_TYPE)
            .await
            .map_err(|source| WriteError::Put {
                bucket: self.store.bucket().to_string(),
                key: key.clone(),
                source,
            })?;

        info!(key = %key, bytes, "Batch archived");

        Ok(ArchiveReceipt {
            bucket: self.store.bucket().to_string(),
            key,
            bytes,
        })
    }
}
