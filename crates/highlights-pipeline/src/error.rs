//! Error types for the highlights pipeline
//!
//! Each failure class is its own type so callers can tell what is
//! recoverable. Fetch and provisioning failures end an ingestion run; write
//! and per-record failures are collected in the run report; only a
//! [`StageError`] stops the pipeline.

use highlights_common::{CommonError, RecordKey};
use thiserror::Error;

/// Boxed error from a storage backend
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A storage backend call failed
#[derive(Error, Debug)]
#[error("{operation} failed: {source}")]
pub struct StoreError {
    pub operation: &'static str,
    #[source]
    pub source: BoxError,
}

impl StoreError {
    pub fn new(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }
}

/// The highlights API could not produce a batch
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request to highlights API failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Highlights API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Highlights API returned an unusable body: {0}")]
    Body(#[from] CommonError),
}

/// Unexpected failure while checking or creating a storage resource.
///
/// "Not found" during a probe is not an error; it leads to creation.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Failed to check bucket '{bucket}': {source}")]
    BucketProbe {
        bucket: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to create bucket '{bucket}': {source}")]
    BucketCreate {
        bucket: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to check table '{table}': {source}")]
    TableProbe {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to create table '{table}': {source}")]
    TableCreate {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("Table '{table}' was not ready after {polls} status checks")]
    TableNotReady { table: String, polls: u32 },
}

/// The archive object was not written
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Failed to encode batch: {0}")]
    Encode(#[from] CommonError),

    #[error("Failed to write s3://{bucket}/{key}: {source}")]
    Put {
        bucket: String,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Archive bucket unavailable: {0}")]
    Provision(#[from] ProvisionError),
}

/// One record's upsert failed; siblings are unaffected
#[derive(Error, Debug)]
#[error("Failed to store record '{key}': {source}")]
pub struct RecordPersistError {
    pub key: RecordKey,
    #[source]
    pub source: StoreError,
}

/// An ingestion run ended without completing
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

/// A stage used up its attempts
#[derive(Error, Debug)]
#[error("Stage '{stage}' failed after {attempts} attempt(s): {source:#}")]
pub struct StageError {
    pub stage: String,
    pub attempts: u32,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            reason: reason.into(),
        }
    }
}
