//! S3 archive backend

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::{
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client,
};
use tracing::{debug, instrument, warn};

use super::{CreateOutcome, ObjectStore};
use crate::error::StoreError;

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(sdk_config: &SdkConfig, bucket: impl Into<String>, path_style: bool) -> Self {
        let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
            .force_path_style(path_style)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: bucket.into(),
        }
    }
}

fn sdk_error<E>(operation: &'static str, err: E) -> StoreError
where
    E: std::error::Error,
{
    StoreError::new(operation, DisplayErrorContext(err).to_string())
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn bucket_exists(&self) -> Result<bool, StoreError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                    || err
                        .raw_response()
                        .map(|r| r.status().as_u16() == 404)
                        .unwrap_or(false);

                if not_found {
                    Ok(false)
                } else {
                    Err(sdk_error("HeadBucket", err))
                }
            },
        }
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn create_bucket(
        &self,
        location_constraint: Option<&str>,
    ) -> Result<CreateOutcome, StoreError> {
        let mut request = self.client.create_bucket().bucket(&self.bucket);

        if let Some(region) = location_constraint {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(err) => match err.as_service_error() {
                Some(e) if e.is_bucket_already_owned_by_you() => Ok(CreateOutcome::AlreadyExists),
                Some(e) if e.is_bucket_already_exists() => {
                    warn!("Bucket name is already taken, possibly by another account");
                    Ok(CreateOutcome::AlreadyExists)
                },
                _ => Err(sdk_error("CreateBucket", err)),
            },
        }
    }

    #[instrument(skip(self, body), fields(bucket = %self.bucket))]
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        debug!(bytes = body.len(), "Uploading object");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| sdk_error("PutObject", err))?;

        Ok(())
    }
}
