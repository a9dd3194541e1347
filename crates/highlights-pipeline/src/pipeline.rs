//! Pipeline assembly
//!
//! Wires the highlights source, both storage sinks and the downstream
//! commands into an ordered list of stages driven by a [`StageRunner`].

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::archive::ArchivalWriter;
use crate::config::PipelineConfig;
use crate::coordinator::{ArchiveOutcome, IngestionCoordinator, IngestionReport};
use crate::downstream::{CommandStage, MEDIACONVERT_STAGE, VIDEO_STAGE};
use crate::error::StageError;
use crate::keyed::KeyedStoreWriter;
use crate::provision::ResourceProvisioner;
use crate::source::{HighlightClient, HighlightSource};
use crate::stage::{Stage, StageRunner};
use crate::storage::{
    load_aws_config, DynamoKeyedStore, KeyedStore, MemoryKeyedStore, MemoryObjectStore,
    ObjectStore, S3ObjectStore,
};

pub const INGESTION_STAGE: &str = "fetch_highlights";

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    /// Persist into in-memory stores instead of AWS
    pub dry_run: bool,
    /// Skip the downstream media stages
    pub ingest_only: bool,
}

/// Wire a coordinator over the given source and stores
pub fn build_coordinator(
    config: &PipelineConfig,
    source: Arc<dyn HighlightSource>,
    objects: Arc<dyn ObjectStore>,
    keyed: Arc<dyn KeyedStore>,
) -> IngestionCoordinator {
    let provisioner = Arc::new(ResourceProvisioner::new(
        objects.clone(),
        keyed.clone(),
        &config.storage,
    ));

    IngestionCoordinator::new(
        source,
        ArchivalWriter::new(objects, provisioner.clone()),
        KeyedStoreWriter::new(keyed, provisioner),
        config.query.clone(),
    )
}

/// The fetch-and-persist stage
pub struct IngestionStage {
    coordinator: IngestionCoordinator,
}

impl IngestionStage {
    pub fn new(coordinator: IngestionCoordinator) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl Stage for IngestionStage {
    fn name(&self) -> &str {
        INGESTION_STAGE
    }

    async fn run(&self) -> anyhow::Result<()> {
        let report = self.coordinator.run().await?;
        log_report(&report);
        Ok(())
    }
}

fn log_report(report: &IngestionReport) {
    match &report.archive {
        Some(ArchiveOutcome::Written(receipt)) => info!(
            run_id = %report.run_id,
            key = %receipt.key,
            bytes = receipt.bytes,
            "Archive written"
        ),
        Some(ArchiveOutcome::Failed(err)) => {
            warn!(run_id = %report.run_id, error = %err, "Archive not written")
        },
        None => {},
    }

    if let Some(records) = &report.records {
        for failure in &records.failed {
            warn!(run_id = %report.run_id, key = %failure.key, error = %failure.source, "Record not stored");
        }
    }

    info!(run_id = %report.run_id, state = ?report.state, fetched = report.fetched, "Ingestion finished");
}

pub struct Pipeline {
    runner: StageRunner,
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(runner: StageRunner, stages: Vec<Box<dyn Stage>>) -> Self {
        Self { runner, stages }
    }

    /// Build the full pipeline: ingestion, then any configured downstream stages
    pub async fn from_config(config: &PipelineConfig, options: PipelineOptions) -> Result<Self> {
        let source: Arc<dyn HighlightSource> = Arc::new(HighlightClient::new(&config.api)?);

        let (objects, keyed): (Arc<dyn ObjectStore>, Arc<dyn KeyedStore>) = if options.dry_run {
            info!("Dry run: persisting to in-memory stores");
            (
                Arc::new(MemoryObjectStore::new(config.storage.bucket.clone())),
                Arc::new(MemoryKeyedStore::new(config.storage.table.clone())),
            )
        } else {
            let sdk_config = load_aws_config(&config.storage).await;
            let path_style = config.storage.endpoint.is_some();
            (
                Arc::new(S3ObjectStore::new(&sdk_config, config.storage.bucket.clone(), path_style)),
                Arc::new(DynamoKeyedStore::new(&sdk_config, config.storage.table.clone())),
            )
        };

        let mut stages: Vec<Box<dyn Stage>> = vec![Box::new(IngestionStage::new(
            build_coordinator(config, source, objects, keyed),
        ))];

        if !options.ingest_only {
            stages.extend(downstream_stages(config));
        }

        Ok(Self::new(StageRunner::from_config(&config.retry), stages))
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self) -> Result<(), StageError> {
        info!(stages = ?self.stage_names(), "Starting pipeline");
        self.runner.run_all(&self.stages).await?;
        info!("All stages completed");
        Ok(())
    }
}

fn downstream_stages(config: &PipelineConfig) -> Vec<Box<dyn Stage>> {
    [
        (VIDEO_STAGE, config.stages.video.as_deref()),
        (MEDIACONVERT_STAGE, config.stages.mediaconvert.as_deref()),
    ]
    .into_iter()
    .filter_map(|(name, command)| match command.and_then(|c| CommandStage::parse(name, c)) {
        Some(stage) => Some(Box::new(stage) as Box<dyn Stage>),
        None => {
            warn!(stage = name, "No command configured, stage not scheduled");
            None
        },
    })
    .collect()
}
