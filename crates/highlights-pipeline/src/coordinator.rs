//! Ingestion run coordination
//!
//! One run moves `Fetching -> Persisting -> Done`. A failed fetch or an
//! empty batch ends the run in `Aborted` before anything is written.
//! While persisting, the archive write always comes first and the keyed
//! store write always follows, even if the archive write failed.

use highlights_common::HighlightBatch;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::archive::{ArchivalWriter, ArchiveReceipt};
use crate::config::QueryConfig;
use crate::error::{IngestError, WriteError};
use crate::keyed::{KeyedStoreWriter, StoreSummary};
use crate::source::{HighlightQuery, HighlightSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Fetching,
    Persisting,
    Done,
    Aborted,
}

#[derive(Debug)]
pub enum ArchiveOutcome {
    Written(ArchiveReceipt),
    Failed(WriteError),
}

/// What one run did
#[derive(Debug)]
pub struct IngestionReport {
    pub run_id: Uuid,
    pub state: RunState,
    /// Entries in the fetched batch
    pub fetched: usize,
    /// `None` when the run was aborted
    pub archive: Option<ArchiveOutcome>,
    /// `None` when the run was aborted
    pub records: Option<StoreSummary>,
}

impl IngestionReport {
    fn aborted(run_id: Uuid) -> Self {
        Self {
            run_id,
            state: RunState::Aborted,
            fetched: 0,
            archive: None,
            records: None,
        }
    }
}

pub struct IngestionCoordinator {
    source: Arc<dyn HighlightSource>,
    archiver: ArchivalWriter,
    writer: KeyedStoreWriter,
    query: QueryConfig,
}

impl IngestionCoordinator {
    pub fn new(
        source: Arc<dyn HighlightSource>,
        archiver: ArchivalWriter,
        writer: KeyedStoreWriter,
        query: QueryConfig,
    ) -> Self {
        Self {
            source,
            archiver,
            writer,
            query,
        }
    }

    /// Run one ingestion.
    ///
    /// Returns `Err` when the fetch fails or when the bucket or table cannot
    /// be provisioned. Archive write failures and per-record failures are
    /// reported in the returned [`IngestionReport`].
    pub async fn run(&self) -> Result<IngestionReport, IngestError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "ingestion_run",
            %run_id,
            date = %self.query.date,
            league = %self.query.league
        );
        self.run_with_id(run_id).instrument(span).await
    }

    async fn run_with_id(&self, run_id: Uuid) -> Result<IngestionReport, IngestError> {
        debug!(state = ?RunState::Fetching, "Fetching highlights");

        let batch = match self.source.fetch(&HighlightQuery::from(&self.query)).await {
            Ok(batch) => batch,
            Err(err) => {
                warn!(state = ?RunState::Aborted, error = %err, "Fetch failed, nothing written");
                return Err(err.into());
            },
        };

        if batch.is_empty() {
            info!(state = ?RunState::Aborted, "No highlights fetched, nothing written");
            return Ok(IngestionReport::aborted(run_id));
        }

        debug!(state = ?RunState::Persisting, records = batch.len(), "Persisting highlights");
        self.persist(run_id, &batch).await
    }

    async fn persist(
        &self,
        run_id: Uuid,
        batch: &HighlightBatch,
    ) -> Result<IngestionReport, IngestError> {
        let archived = self.archiver.archive(batch, &self.query.archive_name).await;
        let stored = self.writer.store_all(batch, &self.query.date).await;

        let archive = match archived {
            Ok(receipt) => ArchiveOutcome::Written(receipt),
            Err(WriteError::Provision(err)) => {
                if let Err(table_err) = &stored {
                    error!(error = %table_err, "Table is also unavailable");
                }
                return Err(err.into());
            },
            Err(err) => {
                warn!(error = %err, "Archive write failed, keyed store was still written");
                ArchiveOutcome::Failed(err)
            },
        };

        let records = stored?;

        info!(
            state = ?RunState::Done,
            stored = records.stored.len(),
            skipped = records.skipped,
            failed = records.failed.len(),
            "Ingestion run complete"
        );

        Ok(IngestionReport {
            run_id,
            state: RunState::Done,
            fetched: batch.len(),
            archive: Some(archive),
            records: Some(records),
        })
    }
}
