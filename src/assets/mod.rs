//! Remote asset storage for uploaded scans.
//!
//! Accepted predictions keep a durable link to the original image. The
//! [`AssetStore`] trait hides the hosting service; [`S3AssetStore`] writes to
//! S3 or any S3-compatible host (MinIO, R2, ...).

mod s3;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::AssetError;

pub use s3::{create_s3_client, S3AssetStore, DEFAULT_REGION, DEFAULT_S3_TIMEOUT};

/// Destination for raw image uploads.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store `data` and return a URL that can be used to fetch it later.
    async fn upload(&self, data: Bytes, content_type: &str, extension: &str)
        -> Result<String, AssetError>;

    /// Check that the destination is reachable.
    async fn ready(&self) -> Result<(), AssetError>;
}
