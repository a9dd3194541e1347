//! Basketball highlights ingestion pipeline
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Fetches one day of highlights for a league, archives the raw response as a
//! single JSON object and upserts each highlight into a keyed table. The
//! ingestion run is the first of a sequence of retryable stages; downstream
//! media stages run after it as external commands.
//!
//! # Flow
//!
//! ```text
//! HighlightSource ──► IngestionCoordinator ──► ArchivalWriter   (ObjectStore)
//!                                         └──► KeyedStoreWriter (KeyedStore)
//! ```
//!
//! Both writers provision their resource on first use through a shared
//! [`provision::ResourceProvisioner`]. [`stage::StageRunner`] retries each
//! stage a bounded number of times and waits between stages.
//!
//! # Example
//!
//! ```no_run
//! use highlights_pipeline::{config::PipelineConfig, Pipeline, PipelineOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::from_env()?;
//!     let pipeline = Pipeline::from_config(&config, PipelineOptions::default()).await?;
//!     pipeline.run().await?;
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod config;
pub mod coordinator;
pub mod downstream;
pub mod error;
pub mod keyed;
pub mod pipeline;
pub mod provision;
pub mod source;
pub mod stage;
pub mod storage;

pub use config::PipelineConfig;
pub use coordinator::{IngestionCoordinator, IngestionReport, RunState};
pub use error::{FetchError, IngestError, ProvisionError, StageError, WriteError};
pub use pipeline::{build_coordinator, Pipeline, PipelineOptions};
pub use stage::{RetryPolicy, Stage, StageRunner};
