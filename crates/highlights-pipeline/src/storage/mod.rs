//! Storage backends
//!
//! Two sinks sit behind traits: an object store for the raw batch archive and
//! a keyed store with one item per highlight. The AWS implementations use
//! S3 and DynamoDB; the in-memory ones back tests and dry runs.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::StorageConfig;
use crate::error::StoreError;

pub mod dynamodb;
pub mod memory;
pub mod s3;

pub use dynamodb::DynamoKeyedStore;
pub use memory::{MemoryKeyedStore, MemoryObjectStore};
pub use s3::S3ObjectStore;

/// Result of a create call against a shared resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// Someone else created it first
    AlreadyExists,
}

/// Lifecycle state reported by the keyed store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableState {
    Creating,
    Active,
    /// Updating, deleting, or anything else that is not usable yet
    Other(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    /// `Ok(false)` only when the store says the bucket does not exist
    async fn bucket_exists(&self) -> Result<bool, StoreError>;

    /// Create the bucket, with a location constraint when one is given
    async fn create_bucket(
        &self,
        location_constraint: Option<&str>,
    ) -> Result<CreateOutcome, StoreError>;

    /// Write (or overwrite) one object
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait KeyedStore: Send + Sync {
    fn table(&self) -> &str;

    /// `Ok(None)` only when the store says the table does not exist
    async fn describe_table(&self) -> Result<Option<TableState>, StoreError>;

    /// Create the table keyed by string `id`, billed on demand
    async fn create_table(&self) -> Result<CreateOutcome, StoreError>;

    /// Upsert one item; an existing item with the same `id` is replaced
    async fn put_item(&self, item: Map<String, Value>) -> Result<(), StoreError>;
}

/// Shared AWS configuration for the S3 and DynamoDB clients
pub async fn load_aws_config(config: &StorageConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()));

    if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
        debug!("Using static AWS credentials");
        loader = loader.credentials_provider(Credentials::new(
            access_key,
            secret_key,
            None,
            None,
            "highlights-pipeline",
        ));
    }

    if let Some(endpoint) = &config.endpoint {
        debug!(endpoint = %endpoint, "Using AWS endpoint override");
        loader = loader.endpoint_url(endpoint);
    }

    loader.load().await
}
