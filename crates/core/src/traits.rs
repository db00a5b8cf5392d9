//! ObjectStore trait and its request/response types
//!
//! Every remote call made by `ObjectLocation` goes through this trait. The S3
//! backend lives in the `s3url-s3` crate; [`crate::MemoryStore`] implements it
//! in memory.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::{Error, Result};
use crate::path::ObjectPath;

/// Default lifetime of presigned URLs
pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(3600);

/// Object metadata as returned by a head request or a listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Object key
    pub key: String,

    /// Size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,

    /// ETag without surrounding quotes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Storage class, `None` means the service default (`STANDARD`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_side_encryption: Option<String>,

    /// Raw restore status, e.g. `ongoing-request="false", expiry-date="..."`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore: Option<String>,

    /// User-defined metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl ObjectInfo {
    pub fn file(key: impl Into<String>, size: i64) -> Self {
        Self {
            key: key.into(),
            size_bytes: Some(size),
            ..Default::default()
        }
    }

    /// True once a restore request has completed
    pub fn is_restored(&self) -> bool {
        self.restore
            .as_deref()
            .is_some_and(|r| r.starts_with("ongoing-request=\"false\""))
    }
}

/// Server-side encryption mode applied by the service on write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerSideEncryption {
    #[serde(rename = "AES256")]
    Aes256,
    #[serde(rename = "aws:kms")]
    AwsKms,
    #[serde(rename = "aws:kms:dsse")]
    AwsKmsDsse,
}

impl ServerSideEncryption {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerSideEncryption::Aes256 => "AES256",
            ServerSideEncryption::AwsKms => "aws:kms",
            ServerSideEncryption::AwsKmsDsse => "aws:kms:dsse",
        }
    }
}

impl fmt::Display for ServerSideEncryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerSideEncryption {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "AES256" => Ok(ServerSideEncryption::Aes256),
            "aws:kms" => Ok(ServerSideEncryption::AwsKms),
            "aws:kms:dsse" => Ok(ServerSideEncryption::AwsKmsDsse),
            _ => Err(Error::Config(format!(
                "Invalid server-side encryption mode: {s}"
            ))),
        }
    }
}

/// Retrieval speed for restoring archived objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RetrievalTier {
    #[default]
    Standard,
    Bulk,
    Expedited,
}

impl RetrievalTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalTier::Standard => "Standard",
            RetrievalTier::Bulk => "Bulk",
            RetrievalTier::Expedited => "Expedited",
        }
    }
}

impl fmt::Display for RetrievalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(RetrievalTier::Standard),
            "bulk" => Ok(RetrievalTier::Bulk),
            "expedited" => Ok(RetrievalTier::Expedited),
            _ => Err(Error::Config(format!("Invalid retrieval tier: {s}"))),
        }
    }
}

/// Options for uploads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutOptions {
    /// Only sent to the service when set
    pub server_side_encryption: Option<ServerSideEncryption>,
}

impl PutOptions {
    pub fn encrypted(encryption: Option<ServerSideEncryption>) -> Self {
        Self {
            server_side_encryption: encryption,
        }
    }
}

/// Options for server-side copies
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyOptions {
    /// Target storage class; `None` keeps the service default
    pub storage_class: Option<String>,

    /// Keep the source tag set on the destination instead of clearing it
    pub preserve_tags: bool,
}

/// Extra parameters signed into a presigned PUT URL
///
/// The uploader has to send matching headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresignPutOptions {
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub server_side_encryption: Option<ServerSideEncryption>,
    pub metadata: HashMap<String, String>,
}

impl PresignPutOptions {
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = Some(cache_control.into());
        self
    }

    pub fn with_encryption(mut self, encryption: ServerSideEncryption) -> Self {
        self.server_side_encryption = Some(encryption);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// One page request of a prefix listing; the prefix is the path's key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListRequest {
    /// Group keys into common prefixes at this delimiter
    pub delimiter: Option<String>,

    /// Page size hint, the service may return fewer entries
    pub max_keys: Option<i32>,

    /// Token returned by the previous page
    pub continuation_token: Option<String>,
}

/// One page of a prefix listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub objects: Vec<ObjectInfo>,

    /// Common prefixes, each ending with the delimiter
    pub common_prefixes: Vec<String>,

    /// Token for the next page, `None` on the last page
    pub next_continuation_token: Option<String>,
}

impl ListPage {
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.common_prefixes.is_empty()
    }
}

/// Remote object-storage operations used by `ObjectLocation`
///
/// Implementations must not interpret errors: failures are returned as
/// [`Error::Remote`] with whatever code and status the service reported.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Region the client signs requests for
    fn region(&self) -> Option<String>;

    /// Fetch metadata only
    async fn head_object(&self, path: &ObjectPath) -> Result<ObjectInfo>;

    /// Fetch the full object body
    async fn get_object(&self, path: &ObjectPath) -> Result<Bytes>;

    /// Upload a body, replacing any existing object
    async fn put_object(&self, path: &ObjectPath, body: Bytes, options: PutOptions) -> Result<()>;

    /// Upload from a reader of unknown length, returning the number of bytes sent
    async fn upload_stream(
        &self,
        path: &ObjectPath,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        options: PutOptions,
    ) -> Result<u64>;

    /// Delete the exact key; deleting a missing key succeeds
    async fn delete_object(&self, path: &ObjectPath) -> Result<()>;

    /// List one page of objects whose key starts with `path.key()`
    async fn list_objects(&self, path: &ObjectPath, request: ListRequest) -> Result<ListPage>;

    async fn get_object_tags(&self, path: &ObjectPath) -> Result<HashMap<String, String>>;

    /// Replace the full tag set
    async fn put_object_tags(&self, path: &ObjectPath, tags: HashMap<String, String>)
    -> Result<()>;

    /// Server-side copy; `src` and `dst` may be the same object
    async fn copy_object(
        &self,
        src: &ObjectPath,
        dst: &ObjectPath,
        options: CopyOptions,
    ) -> Result<()>;

    /// Request a temporary restore of an archived object
    async fn restore_object(&self, path: &ObjectPath, days: i32, tier: RetrievalTier)
    -> Result<()>;

    async fn presign_get(&self, path: &ObjectPath, expires: Duration) -> Result<String>;

    async fn presign_put(
        &self,
        path: &ObjectPath,
        expires: Duration,
        options: PresignPutOptions,
    ) -> Result<String>;
}
