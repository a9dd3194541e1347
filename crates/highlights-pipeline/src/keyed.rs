//! Per-record persistence into the keyed store
//!
//! Records are upserted one at a time in batch order under their derived key.
//! Records without an `id` or `url` are skipped. A failed upsert is recorded
//! and the remaining records are still written.

use highlights_common::{HighlightBatch, HighlightRecord, RecordKey};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{ProvisionError, RecordPersistError};
use crate::provision::ResourceProvisioner;
use crate::storage::KeyedStore;

/// Per-record outcome of one `store_all` call
#[derive(Debug, Default)]
pub struct StoreSummary {
    /// Keys written, in batch order
    pub stored: Vec<RecordKey>,
    /// Entries with no usable identity
    pub skipped: usize,
    pub failed: Vec<RecordPersistError>,
}

impl StoreSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct KeyedStoreWriter {
    store: Arc<dyn KeyedStore>,
    provisioner: Arc<ResourceProvisioner>,
}

impl KeyedStoreWriter {
    pub fn new(store: Arc<dyn KeyedStore>, provisioner: Arc<ResourceProvisioner>) -> Self {
        Self { store, provisioner }
    }

    /// Succeeds whenever the table is available, whatever happens to
    /// individual records.
    #[instrument(skip(self, batch), fields(table = %self.store.table()))]
    pub async fn store_all(
        &self,
        batch: &HighlightBatch,
        fetch_date: &str,
    ) -> Result<StoreSummary, ProvisionError> {
        self.provisioner.ensure_table().await?;

        let mut summary = StoreSummary::default();

        for (index, entry) in batch.entries().iter().enumerate() {
            let Some(mut record) = HighlightRecord::from_entry(entry) else {
                debug!(index, "Skipping entry that is not an object");
                summary.skipped += 1;
                continue;
            };

            let Some(key) = record.key() else {
                debug!(index, "Skipping record without id or url");
                summary.skipped += 1;
                continue;
            };

            record.stamp(&key, fetch_date);

            match self.store.put_item(record.into_fields()).await {
                Ok(()) => {
                    debug!(key = %key, "Stored record");
                    summary.stored.push(key);
                },
                Err(source) => {
                    warn!(key = %key, error = %source, "Failed to store record");
                    summary.failed.push(RecordPersistError { key, source });
                },
            }
        }

        info!(
            stored = summary.stored.len(),
            skipped = summary.skipped,
            failed = summary.failed.len(),
            "Records persisted"
        );

        Ok(summary)
    }
}
