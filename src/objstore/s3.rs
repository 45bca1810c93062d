use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::head_bucket::HeadBucketError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use tokio::runtime::Runtime;
use tracing::info;

use super::{valid_key, ObjectStore, S3Settings, StoreError};

/// Store backed by an S3-compatible bucket.
///
/// Requests run on a private current-thread runtime, so the store must not
/// be driven from inside another tokio runtime.
#[derive(Debug)]
pub struct S3ObjectStore {
    rt: Runtime,
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Connects and makes sure the bucket exists, creating it when missing.
    pub fn connect(settings: &S3Settings) -> Result<Self, StoreError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let client = rt.block_on(client_for(settings));
        let store = Self {
            rt,
            client,
            bucket: settings.bucket.clone(),
        };
        store.ensure_bucket()?;
        Ok(store)
    }

    /// Bucket objects are written to.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn ensure_bucket(&self) -> Result<(), StoreError> {
        let head = self
            .rt
            .block_on(self.client.head_bucket().bucket(&self.bucket).send());
        match head {
            Ok(_) => Ok(()),
            Err(err) if bucket_missing(&err) => {
                self.rt
                    .block_on(self.client.create_bucket().bucket(&self.bucket).send())
                    .map_err(|err| StoreError::Remote(format!("make bucket failed: {err:?}")))?;
                info!(bucket = self.bucket.as_str(), "created bucket");
                Ok(())
            }
            Err(err) => Err(StoreError::Remote(format!(
                "bucket exist check failed: {err:?}"
            ))),
        }
    }

    fn checked_key<'a>(&self, key: &'a str) -> Result<&'a str, StoreError> {
        if valid_key(key) {
            Ok(key)
        } else {
            Err(StoreError::InvalidKey(key.to_string()))
        }
    }
}

impl ObjectStore for S3ObjectStore {
    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let key = self.checked_key(key)?;
        let head = self.rt.block_on(
            self.client
                .head_object()
                .bucket(&self.bucket)
                .key(key)
                .send(),
        );
        match head {
            Ok(_) => Ok(true),
            Err(err) if object_missing(&err) => Ok(false),
            Err(err) => Err(StoreError::Remote(format!(
                "s3 head_object {key} failed: {err:?}"
            ))),
        }
    }

    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StoreError> {
        let key = self.checked_key(key)?;
        self.rt
            .block_on(
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .content_type(content_type)
                    .body(ByteStream::from(bytes.to_vec()))
                    .send(),
            )
            .map_err(|err| StoreError::Remote(format!("s3 put_object {key} failed: {err:?}")))?;
        Ok(())
    }
}

async fn client_for(settings: &S3Settings) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        settings.access_key.clone(),
        settings.secret_key.clone(),
        None,
        None,
        "gifcities-env",
    );
    let cfg = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(settings.region.clone()))
        .credentials_provider(credentials)
        .load()
        .await;

    let conf = aws_sdk_s3::config::Builder::from(&cfg)
        .endpoint_url(settings.endpoint_url())
        .force_path_style(true)
        .build();
    aws_sdk_s3::Client::from_conf(conf)
}

fn bucket_missing<R>(err: &SdkError<HeadBucketError, R>) -> bool {
    matches!(err, SdkError::ServiceError(se) if se.err().is_not_found())
}

fn object_missing<R>(err: &SdkError<HeadObjectError, R>) -> bool {
    matches!(err, SdkError::ServiceError(se) if se.err().is_not_found())
}
