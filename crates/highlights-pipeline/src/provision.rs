//! Ensure-exists logic for the bucket and the table
//!
//! Both operations are safe to run on every pipeline run and alongside other
//! runs: an "already exists" answer from a create call counts as success.
//! Nothing here ever deletes or reconfigures an existing resource.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::config::{StorageConfig, DEFAULT_REGION};
use crate::error::ProvisionError;
use crate::storage::{CreateOutcome, KeyedStore, ObjectStore, TableState};

pub struct ResourceProvisioner {
    objects: Arc<dyn ObjectStore>,
    keyed: Arc<dyn KeyedStore>,
    region: String,
    poll_interval: Duration,
    max_polls: u32,
}

/// Buckets in the default region are created without a location constraint
pub fn location_constraint(region: &str) -> Option<&str> {
    if region == DEFAULT_REGION {
        None
    } else {
        Some(region)
    }
}

impl ResourceProvisioner {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        keyed: Arc<dyn KeyedStore>,
        config: &StorageConfig,
    ) -> Self {
        Self {
            objects,
            keyed,
            region: config.region.clone(),
            poll_interval: config.table_ready_poll_interval(),
            max_polls: config.table_ready_max_polls,
        }
    }

    #[instrument(skip(self), fields(bucket = %self.objects.bucket()))]
    pub async fn ensure_bucket(&self) -> Result<(), ProvisionError> {
        let bucket = self.objects.bucket();

        let exists = self
            .objects
            .bucket_exists()
            .await
            .map_err(|source| ProvisionError::BucketProbe {
                bucket: bucket.to_string(),
                source,
            })?;

        if exists {
            debug!("Bucket exists");
            return Ok(());
        }

        info!(region = %self.region, "Bucket not found, creating it");
        let outcome = self
            .objects
            .create_bucket(location_constraint(&self.region))
            .await
            .map_err(|source| ProvisionError::BucketCreate {
                bucket: bucket.to_string(),
                source,
            })?;

        match outcome {
            CreateOutcome::Created => info!("Bucket created"),
            CreateOutcome::AlreadyExists => info!("Bucket was created concurrently"),
        }

        Ok(())
    }

    #[instrument(skip(self), fields(table = %self.keyed.table()))]
    pub async fn ensure_table(&self) -> Result<(), ProvisionError> {
        match self.describe().await? {
            Some(TableState::Active) => {
                debug!("Table exists");
                return Ok(());
            },
            Some(state) => {
                info!(state = ?state, "Table exists but is not active yet");
            },
            None => {
                info!("Table not found, creating it");
                let outcome =
                    self.keyed
                        .create_table()
                        .await
                        .map_err(|source| ProvisionError::TableCreate {
                            table: self.keyed.table().to_string(),
                            source,
                        })?;

                if outcome == CreateOutcome::AlreadyExists {
                    info!("Table was created concurrently");
                }
            },
        }

        self.wait_until_active().await
    }

    /// Poll until the table reports active, up to `max_polls` checks
    async fn wait_until_active(&self) -> Result<(), ProvisionError> {
        for poll in 1..=self.max_polls {
            if let Some(TableState::Active) = self.describe().await? {
                info!(polls = poll, "Table is active");
                return Ok(());
            }

            if poll < self.max_polls {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        Err(ProvisionError::TableNotReady {
            table: self.keyed.table().to_string(),
            polls: self.max_polls,
        })
    }

    async fn describe(&self) -> Result<Option<TableState>, ProvisionError> {
        self.keyed
            .describe_table()
            .await
            .map_err(|source| ProvisionError::TableProbe {
                table: self.keyed.table().to_string(),
                source,
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::tests::sample;
    use crate::storage::{MemoryKeyedStore, MemoryObjectStore};
    use tokio::time::Instant;

    fn provisioner(
        objects: Arc<MemoryObjectStore>,
        keyed: Arc<MemoryKeyedStore>,
        region: &str,
    ) -> ResourceProvisioner {
        let mut config = sample().storage;
        config.region = region.to_string();
        ResourceProvisioner::new(objects, keyed, &config)
    }

    #[test]
    fn test_location_constraint() {
        assert_eq!(location_constraint("us-east-1"), None);
        assert_eq!(location_constraint("eu-west-1"), Some("eu-west-1"));
    }

    #[tokio::test]
    async fn test_ensure_bucket_creates_once() {
        let objects = Arc::new(MemoryObjectStore::new("b"));
        let p = provisioner(objects.clone(), Arc::new(MemoryKeyedStore::new("t")), "us-east-1");

        for _ in 0..3 {
            p.ensure_bucket().await.unwrap();
        }

        assert_eq!(objects.creates(), 1);
        assert_eq!(objects.location_constraint(), None);
    }

    #[tokio::test]
    async fn test_ensure_bucket_uses_region_constraint() {
        let objects = Arc::new(MemoryObjectStore::new("b"));
        let p = provisioner(objects.clone(), Arc::new(MemoryKeyedStore::new("t")), "eu-west-1");

        p.ensure_bucket().await.unwrap();
        assert_eq!(objects.location_constraint().as_deref(), Some("eu-west-1"));
    }

    #[tokio::test]
    async fn test_ensure_bucket_existing_never_creates() {
        let objects = Arc::new(MemoryObjectStore::existing("b"));
        let p = provisioner(objects.clone(), Arc::new(MemoryKeyedStore::new("t")), "us-east-1");

        for _ in 0..5 {
            p.ensure_bucket().await.unwrap();
        }
        assert_eq!(objects.creates(), 0);
    }

    #[tokio::test]
    async fn test_ensure_bucket_probe_failure_is_fatal() {
        let objects = Arc::new(MemoryObjectStore::new("b"));
        objects.fail_probe();
        let p = provisioner(objects.clone(), Arc::new(MemoryKeyedStore::new("t")), "us-east-1");

        let err = p.ensure_bucket().await.unwrap_err();
        assert!(matches!(err, ProvisionError::BucketProbe { .. }));
        assert_eq!(objects.creates(), 0);
    }

    #[tokio::test]
    async fn test_ensure_bucket_create_failure_is_fatal() {
        let objects = Arc::new(MemoryObjectStore::new("b"));
        objects.fail_create();
        let p = provisioner(objects, Arc::new(MemoryKeyedStore::new("t")), "eu-west-1");

        let err = p.ensure_bucket().await.unwrap_err();
        assert!(matches!(err, ProvisionError::BucketCreate { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_table_creates_and_waits() {
        let keyed = Arc::new(MemoryKeyedStore::new("t").with_creation_delay(1));
        let p = provisioner(Arc::new(MemoryObjectStore::new("b")), keyed.clone(), "us-east-1");

        p.ensure_table().await.unwrap();
        p.ensure_table().await.unwrap();

        assert_eq!(keyed.creates(), 1);
    }

    #[tokio::test]
    async fn test_ensure_bucket_tolerates_concurrent_create() {
        let objects = Arc::new(MemoryObjectStore::new("b"));
        objects.race_on_create();
        let p = provisioner(objects.clone(), Arc::new(MemoryKeyedStore::new("t")), "us-east-1");

        p.ensure_bucket().await.unwrap();
        p.ensure_bucket().await.unwrap();

        assert_eq!(objects.creates(), 0);
        objects.put_object("k", vec![1], "application/json").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_table_tolerates_concurrent_create() {
        let keyed = Arc::new(MemoryKeyedStore::new("t").with_creation_delay(2));
        keyed.race_on_create();
        let p = provisioner(Arc::new(MemoryObjectStore::new("b")), keyed.clone(), "us-east-1");

        let start = Instant::now();
        p.ensure_table().await.unwrap();

        assert_eq!(keyed.creates(), 0);
        // two `Creating` checks before it turns active, one poll interval apart
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(keyed.describe_table().await.unwrap(), Some(TableState::Active));
    }

    #[tokio::test]
    async fn test_ensure_table_existing_never_creates() {
        let keyed = Arc::new(MemoryKeyedStore::existing("t"));
        let p = provisioner(Arc::new(MemoryObjectStore::new("b")), keyed.clone(), "us-east-1");

        for _ in 0..5 {
            p.ensure_table().await.unwrap();
        }

        assert_eq!(keyed.creates(), 0);
        assert_eq!(keyed.puts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_table_gives_up_when_never_active() {
        let keyed = Arc::new(MemoryKeyedStore::new("t").with_creation_delay(100));
        let p = provisioner(Arc::new(MemoryObjectStore::new("b")), keyed, "us-east-1");

        let err = p.ensure_table().await.unwrap_err();
        assert!(matches!(err, ProvisionError::TableNotReady { polls: 3, .. }));
    }

    #[tokio::test]
    async fn test_ensure_table_probe_error_propagates() {
        let keyed = Arc::new(MemoryKeyedStore::new("t"));
        keyed.fail_probe();
        let p = provisioner(Arc::new(MemoryObjectStore::new("b")), keyed.clone(), "us-east-1");

        let err = p.ensure_table().await.unwrap_err();
        assert!(matches!(err, ProvisionError::TableProbe { .. }));
        assert_eq!(keyed.creates(), 0);
    }
}
