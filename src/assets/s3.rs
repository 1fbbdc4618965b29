use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use super::AssetStore;
use crate::error::AssetError;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default per-operation timeout for S3 calls.
pub const DEFAULT_S3_TIMEOUT: Duration = Duration::from_secs(30);

/// S3-backed implementation of [`AssetStore`].
///
/// Objects are written under `prefix` with a random UUID key. The returned URL
/// is built from `public_base_url` when set (CDN or public bucket domain),
/// otherwise from the endpoint or the regional AWS domain.
#[derive(Clone)]
pub struct S3AssetStore {
    client: Client,
    bucket: String,
    prefix: String,
    region: String,
    endpoint: Option<String>,
    public_base_url: Option<String>,
}

impl S3AssetStore {
    /// Create a store writing to `bucket` in `region`.
    pub fn new(client: Client, bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: String::new(),
            region: region.into(),
            endpoint: None,
            public_base_url: None,
        }
    }

    /// Store objects under a key prefix (a trailing `/` is added if missing).
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.prefix = prefix;
        self
    }

    /// Custom endpoint for S3-compatible services; URLs become path-style.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Base URL under which uploaded objects are publicly served.
    pub fn with_public_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.public_base_url = Some(base_url.into());
        self
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Generate a fresh object key.
    pub fn object_key(&self, extension: &str) -> String {
        format!("{}{}.{}", self.prefix, Uuid::new_v4(), extension)
    }

    /// Public URL of an object key.
    pub fn object_url(&self, key: &str) -> String {
        if let Some(ref base) = self.public_base_url {
            return format!("{}/{}", base.trim_end_matches('/'), key);
        }
        if let Some(ref endpoint) = self.endpoint {
            return format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key);
        }
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket, self.region, key
        )
    }
}

#[async_trait]
impl AssetStore for S3AssetStore {
    async fn upload(
        &self,
        data: Bytes,
        content_type: &str,
        extension: &str,
    ) -> Result<String, AssetError> {
        let key = self.object_key(extension);
        let size = data.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| AssetError::Upload(e.to_string()))?;

        debug!(bucket = %self.bucket, key = %key, size, "Uploaded scan");
        Ok(self.object_url(&key))
    }

    async fn ready(&self) -> Result<(), AssetError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| AssetError::Connection(e.to_string()))?;
        Ok(())
    }
}

/// Create an S3 client with optional custom endpoint, region, and timeout.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1", DEFAULT_S3_TIMEOUT).await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str, timeout: Duration) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let timeouts = aws_config::timeout::TimeoutConfig::builder()
        .operation_timeout(timeout)
        .build();

    let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(region)
        .timeout_config(timeouts);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services generally need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
