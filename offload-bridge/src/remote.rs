//! Remote Object Store Abstraction
//!
//! The trait every remote/CDN connector implements. The engine drives it
//! exclusively from sync handlers; nothing here is called from a UI path.
//!
//! Error contract: connectors map the remote's "public id already taken"
//! response to [`BridgeError::AlreadyExists`] and its "file type not allowed"
//! response to [`BridgeError::Restricted`], because the upload handler retries
//! the former exactly once and records the latter as fatal.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// Payload for creating a remote resource
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Desired public id, including any folder prefix
    pub public_id: String,
    /// Raw media bytes
    pub data: Bytes,
    /// Content type, e.g. `image/jpeg`
    pub content_type: String,
    /// Arbitrary context metadata stored alongside the resource
    pub context: HashMap<String, String>,
}

/// Result of an upload or copy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResult {
    /// Public id the remote actually assigned
    pub public_id: String,
    /// Remote version number; bumps on overwrite
    pub version: i64,
    /// Delivery classification, e.g. `upload`, `private`, `authenticated`
    pub delivery_type: String,
    /// Stored byte size
    pub bytes: u64,
    /// Canonical delivery URL
    pub url: String,
}

/// A resource as the remote reports it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteResource {
    pub public_id: String,
    pub version: i64,
    pub delivery_type: String,
    pub bytes: u64,
    pub url: String,
}

/// Result of an eager transformation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformResult {
    /// URL of the derived rendition
    pub url: String,
    /// Byte size of the derived rendition
    pub bytes: u64,
}

/// Remote object/CDN store operations
///
/// # Example
///
/// ```ignore
/// use offload_bridge::remote::{RemoteMediaStore, UploadRequest};
///
/// async fn push(store: &dyn RemoteMediaStore, request: UploadRequest)
///     -> offload_bridge::error::Result<String>
/// {
///     let result = store.upload(request).await?;
///     Ok(result.public_id)
/// }
/// ```
#[async_trait]
pub trait RemoteMediaStore: Send + Sync {
    /// Create a remote resource from raw bytes
    async fn upload(&self, request: UploadRequest) -> Result<UploadResult>;

    /// Server-side copy of an existing resource to a new public id
    async fn copy(&self, from_public_id: &str, to_public_id: &str) -> Result<UploadResult>;

    /// Replace the context metadata of an existing resource
    async fn context_update(
        &self,
        public_id: &str,
        context: HashMap<String, String>,
    ) -> Result<()>;

    /// Eagerly derive a transformed rendition and report its URL and size
    async fn explicit_transform(
        &self,
        public_id: &str,
        transformation: &str,
    ) -> Result<TransformResult>;

    /// Delete a resource, optionally invalidating CDN caches
    async fn destroy(&self, public_id: &str, invalidate: bool) -> Result<()>;

    /// Look up a resource. `Ok(None)` when the remote does not have it.
    async fn resource(&self, public_id: &str) -> Result<Option<RemoteResource>>;

    /// Fetch the bytes of a resource, canonical or transformed
    async fn fetch(&self, public_id: &str, transformation: Option<&str>) -> Result<Bytes>;

    /// Reachability probe; `false` means keep work queued and try later
    async fn probe(&self) -> bool;
}
