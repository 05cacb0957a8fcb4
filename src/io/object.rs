//! Object-storage client seam.
//!
//! [`S3RangeReader`](super::S3RangeReader) and the resolver talk to storage
//! only through [`ObjectClient`], and obtain clients for a profile through a
//! [`Connector`]. The production pair wraps `aws-sdk-s3`.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use tokio::io::AsyncRead;
use tracing::debug;

use crate::error::{Error, Result};
use crate::scope::ConnectionProfile;

/// Streaming body of a range request.
pub type ObjectBody = Pin<Box<dyn AsyncRead + Send>>;

/// Minimal object-storage API needed for ranged reads.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Metadata probe; returns the exact object size.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<u64>;

    /// Open the inclusive byte range `start..=end` as a stream.
    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        end: u64,
    ) -> Result<ObjectBody>;
}

/// Builds an [`ObjectClient`] for a connection profile.
pub trait Connector: Send + Sync {
    fn connect(&self, profile: &ConnectionProfile) -> Arc<dyn ObjectClient>;
}

/// `aws-sdk-s3` backed client.
#[derive(Clone)]
pub struct S3Client {
    client: aws_sdk_s3::Client,
}

impl S3Client {
    /// Build a client with the profile's static credentials and endpoint.
    pub fn from_profile(profile: &ConnectionProfile) -> Self {
        let creds = Credentials::new(
            profile.access_key.clone(),
            profile.secret_key.clone(),
            None,
            None,
            "rangeread-profile",
        );

        let mut config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(profile.region_or_default().to_owned()))
            .credentials_provider(creds)
            .force_path_style(profile.force_path_style);
        if let Some(endpoint) = profile.endpoint_url() {
            config = config.endpoint_url(endpoint);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(config.build()),
        }
    }
}

impl fmt::Debug for S3Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Client").finish_non_exhaustive()
    }
}

/// Map an SDK failure to `Upstream` when the service answered, else `ObjectStore`.
fn sdk_error<E>(err: SdkError<E, HttpResponse>, bucket: &str, key: &str) -> Error
where
    E: std::error::Error + 'static,
{
    match err.raw_response().map(|resp| resp.status().as_u16()) {
        Some(status) => Error::Upstream {
            status,
            resource: format!("s3://{bucket}/{key}"),
        },
        None => Error::ObjectStore(format!(
            "s3://{bucket}/{key}: {}",
            DisplayErrorContext(&err)
        )),
    }
}

#[async_trait]
impl ObjectClient for S3Client {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<u64> {
        debug!(bucket, key, "HeadObject");
        let resp = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error(e, bucket, key))?;

        resp.content_length()
            .and_then(|len| u64::try_from(len).ok())
            .ok_or_else(|| Error::MissingContentLength(format!("s3://{bucket}/{key}")))
    }

    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        end: u64,
    ) -> Result<ObjectBody> {
        let range = format!("bytes={start}-{end}");
        debug!(bucket, key, range = %range, "GetObject");
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(range)
            .send()
            .await
            .map_err(|e| sdk_error(e, bucket, key))?;

        Ok(Box::pin(resp.body.into_async_read()))
    }
}

/// Connector producing [`S3Client`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct S3Connector;

impl Connector for S3Connector {
    fn connect(&self, profile: &ConnectionProfile) -> Arc<dyn ObjectClient> {
        Arc::new(S3Client::from_profile(profile))
    }
}
