//! ObjectLocation: an `s3://bucket/key` value bound to a storage client

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use s3url_core::{
    CopyOptions, ListRequest, ObjectInfo, ObjectPath, ObjectStore, PresignPutOptions, PutOptions,
    Result, RetrievalTier, SCHEME, ServerSideEncryption,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncRead;

use crate::context;
use crate::encoding::TextEncoding;
use crate::listing;

/// A bucket/key pair plus the client used to act on it
///
/// Identity is the canonical url alone: two locations bound to different
/// clients compare equal when they name the same object.
#[derive(Clone)]
pub struct ObjectLocation {
    path: ObjectPath,
    store: Arc<dyn ObjectStore>,
}

/// Anything that names a second location for copy operations
///
/// Strings and bare paths are bound to the client passed in, which is the
/// client of the location the operation is called on.
pub trait IntoLocation {
    fn into_location(self, store: &Arc<dyn ObjectStore>) -> Result<ObjectLocation>;
}

impl IntoLocation for &str {
    fn into_location(self, store: &Arc<dyn ObjectStore>) -> Result<ObjectLocation> {
        ObjectLocation::with_store(self, Arc::clone(store))
    }
}

impl IntoLocation for String {
    fn into_location(self, store: &Arc<dyn ObjectStore>) -> Result<ObjectLocation> {
        self.as_str().into_location(store)
    }
}

impl IntoLocation for &String {
    fn into_location(self, store: &Arc<dyn ObjectStore>) -> Result<ObjectLocation> {
        self.as_str().into_location(store)
    }
}

impl IntoLocation for ObjectPath {
    fn into_location(self, store: &Arc<dyn ObjectStore>) -> Result<ObjectLocation> {
        Ok(ObjectLocation::new(self, Arc::clone(store)))
    }
}

impl IntoLocation for ObjectLocation {
    fn into_location(self, _store: &Arc<dyn ObjectStore>) -> Result<ObjectLocation> {
        Ok(self)
    }
}

impl IntoLocation for &ObjectLocation {
    fn into_location(self, _store: &Arc<dyn ObjectStore>) -> Result<ObjectLocation> {
        Ok(self.clone())
    }
}

impl ObjectLocation {
    /// Bind an already parsed path to a store
    pub fn new(path: ObjectPath, store: Arc<dyn ObjectStore>) -> Self {
        Self { path, store }
    }

    /// Parse an `s3://bucket/key` string, using the calling thread's client
    ///
    /// Requires [`crate::init`] (or another installed registry).
    pub fn parse(input: &str) -> Result<Self> {
        let path = ObjectPath::parse(input)?;
        Ok(Self::new(path, context::current_store()?))
    }

    pub fn from_url(input: &str) -> Result<Self> {
        Self::parse(input)
    }

    /// Same as parsing `s3://{bucket}/{key}`
    pub fn from_bucket_key(bucket: &str, key: &str) -> Result<Self> {
        let path = ObjectPath::from_bucket_key(bucket, key)?;
        Ok(Self::new(path, context::current_store()?))
    }

    /// Parse a string and bind it to `store` instead of the registry client
    pub fn with_store(input: &str, store: Arc<dyn ObjectStore>) -> Result<Self> {
        Ok(Self::new(ObjectPath::parse(input)?, store))
    }

    pub fn from_bucket_key_with_store(
        bucket: &str,
        key: &str,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self> {
        Ok(Self::new(ObjectPath::from_bucket_key(bucket, key)?, store))
    }

    pub fn scheme(&self) -> &'static str {
        SCHEME
    }

    pub fn bucket(&self) -> &str {
        self.path.bucket()
    }

    pub fn key(&self) -> &str {
        self.path.key()
    }

    /// Canonical `s3://bucket/key` form
    pub fn url(&self) -> &str {
        self.path.url()
    }

    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// The client this location is bound to
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// True if the exact key exists
    ///
    /// Only a not-found answer maps to `false`; access denied and every other
    /// failure is returned as an error.
    pub async fn exists(&self) -> Result<bool> {
        match self.store.head_object(&self.path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// True if at least one object key starts with this key
    ///
    /// The key is matched as a plain string prefix, so `a/b` also matches
    /// `a/bc`. Sends a single list request for one entry.
    pub async fn prefix_exists(&self) -> Result<bool> {
        let request = ListRequest {
            max_keys: Some(1),
            ..Default::default()
        };

        match self.store.list_objects(&self.path, request).await {
            Ok(page) => Ok(!page.objects.is_empty()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Object metadata from a head request
    pub async fn metadata(&self) -> Result<ObjectInfo> {
        self.store.head_object(&self.path).await
    }

    /// Full object body
    pub async fn read(&self) -> Result<Bytes> {
        self.store.get_object(&self.path).await
    }

    pub async fn read_text(&self, encoding: TextEncoding) -> Result<String> {
        let body = self.read().await?;
        encoding.decode(&body)
    }

    /// Parse the body as JSON, dropping a leading byte-order mark
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T> {
        self.read_json_with(TextEncoding::default()).await
    }

    pub async fn read_json_with<T: DeserializeOwned>(&self, encoding: TextEncoding) -> Result<T> {
        let text = self.read_text(encoding).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Upload `body`, replacing the object
    ///
    /// The encryption header is only sent when `encryption` is set.
    pub async fn write(
        &self,
        body: impl Into<Bytes>,
        encryption: Option<ServerSideEncryption>,
    ) -> Result<()> {
        let body = body.into();
        let size = body.len();

        self.store
            .put_object(&self.path, body, PutOptions::encrypted(encryption))
            .await?;

        tracing::debug!(url = %self, size_bytes = size, "Wrote object");
        Ok(())
    }

    pub async fn write_text(
        &self,
        text: &str,
        encryption: Option<ServerSideEncryption>,
    ) -> Result<()> {
        self.write(text.to_string(), encryption).await
    }

    pub async fn write_json<T: Serialize + ?Sized>(
        &self,
        value: &T,
        encryption: Option<ServerSideEncryption>,
    ) -> Result<()> {
        let body = serde_json::to_vec(value)?;
        self.write(body, encryption).await
    }

    /// Stream a reader of any length to the object, returning the bytes sent
    pub async fn upload_file<R>(
        &self,
        reader: R,
        encryption: Option<ServerSideEncryption>,
    ) -> Result<u64>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let size = self
            .store
            .upload_stream(&self.path, Box::new(reader), PutOptions::encrypted(encryption))
            .await?;

        tracing::debug!(url = %self, size_bytes = size, "Uploaded stream");
        Ok(size)
    }

    /// Upload a local file
    pub async fn upload_path(
        &self,
        path: impl AsRef<Path>,
        encryption: Option<ServerSideEncryption>,
    ) -> Result<u64> {
        let file = tokio::fs::File::open(path.as_ref()).await?;
        self.upload_file(file, encryption).await
    }

    /// Delete the exact key; a missing object is not an error
    pub async fn delete(&self) -> Result<()> {
        self.store.delete_object(&self.path).await?;
        tracing::debug!(url = %self, "Deleted object");
        Ok(())
    }

    /// Delete every object under this key as a prefix, returning how many
    pub async fn delete_all(&self) -> Result<usize> {
        let mut listing = self.list_objects_under_prefix();
        let mut deleted = 0;

        while let Some(object) = listing.try_next().await? {
            object.delete().await?;
            deleted += 1;
        }

        tracing::debug!(url = %self, deleted, "Deleted prefix");
        Ok(deleted)
    }

    pub async fn delete_dir(&self) -> Result<usize> {
        self.delete_all().await
    }

    /// Replace the tag set; `None` or an empty map removes all tags
    pub async fn write_tags(&self, tags: Option<&HashMap<String, String>>) -> Result<()> {
        let tags = tags.cloned().unwrap_or_default();
        self.store.put_object_tags(&self.path, tags).await
    }

    pub async fn read_tags(&self) -> Result<HashMap<String, String>> {
        self.store.get_object_tags(&self.path).await
    }

    pub async fn copy_tags_to(&self, target: impl IntoLocation) -> Result<()> {
        let target = target.into_location(&self.store)?;
        let tags = self.read_tags().await?;
        target.write_tags(Some(&tags)).await
    }

    pub async fn copy_tags_from(&self, source: impl IntoLocation) -> Result<()> {
        let source = source.into_location(&self.store)?;
        let tags = source.read_tags().await?;
        self.write_tags(Some(&tags)).await
    }

    /// Server-side copy of content and metadata; the target ends up untagged
    pub async fn copy_to(&self, target: impl IntoLocation) -> Result<()> {
        let target = target.into_location(&self.store)?;
        self.store
            .copy_object(&self.path, &target.path, CopyOptions::default())
            .await
    }

    /// Server-side copy from `source` onto this location; tags are not copied
    pub async fn copy_from(&self, source: impl IntoLocation) -> Result<()> {
        let source = source.into_location(&self.store)?;
        self.store
            .copy_object(&source.path, &self.path, CopyOptions::default())
            .await
    }

    /// Rewrite the object in place with a new storage class
    ///
    /// Tags and metadata are kept. The service decides which transitions are
    /// allowed; leaving `GLACIER` without a restore, for example, is rejected
    /// with `InvalidObjectState`.
    pub async fn transition_to_storage_tier(&self, storage_class: &str) -> Result<()> {
        let options = CopyOptions {
            storage_class: Some(storage_class.to_string()),
            preserve_tags: true,
        };
        self.store
            .copy_object(&self.path, &self.path, options)
            .await?;

        tracing::debug!(url = %self, storage_class, "Transitioned object");
        Ok(())
    }

    /// Request a temporary restore of an archived object for `days` days
    pub async fn restore_to_storage_tier(&self, days: i32, tier: RetrievalTier) -> Result<()> {
        self.store.restore_object(&self.path, days, tier).await?;
        tracing::debug!(url = %self, days, tier = %tier, "Requested restore");
        Ok(())
    }

    pub async fn restore_for_days(&self, days: i32) -> Result<()> {
        self.restore_to_storage_tier(days, RetrievalTier::default())
            .await
    }

    /// Every object whose key starts with this key, across all pages
    ///
    /// Pages are requested as the stream is polled. The stream cannot be
    /// restarted; call again to list afresh.
    pub fn list_objects_under_prefix(&self) -> BoxStream<'static, Result<ObjectLocation>> {
        listing::objects(self, None)
    }

    pub fn list_prefix_objects(&self) -> BoxStream<'static, Result<ObjectLocation>> {
        self.list_objects_under_prefix()
    }

    /// Like [`Self::list_objects_under_prefix`], asking for `page_size` keys per request
    ///
    /// Sizes below 1 are raised to 1 and sizes above 1000 lowered to 1000.
    pub fn list_objects_under_prefix_paged(
        &self,
        page_size: i32,
    ) -> BoxStream<'static, Result<ObjectLocation>> {
        listing::objects(self, Some(page_size))
    }

    /// The `/`-delimited "directories" directly below this key
    pub fn list_common_prefixes(&self) -> BoxStream<'static, Result<ObjectLocation>> {
        listing::common_prefixes(self)
    }

    /// URL granting GET access for `ttl`
    pub async fn generate_presigned_get_url(&self, ttl: Duration) -> Result<String> {
        self.store.presign_get(&self.path, ttl).await
    }

    /// URL granting PUT access for `ttl`; uploaders must send the signed headers
    pub async fn generate_presigned_put_url(
        &self,
        ttl: Duration,
        options: PresignPutOptions,
    ) -> Result<String> {
        self.store.presign_put(&self.path, ttl, options).await
    }
}

impl From<&ObjectLocation> for ObjectLocation {
    fn from(location: &ObjectLocation) -> Self {
        location.clone()
    }
}

impl FromStr for ObjectLocation {
    type Err = s3url_core::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl PartialEq for ObjectLocation {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for ObjectLocation {}

impl Hash for ObjectLocation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url())
    }
}

impl fmt::Debug for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectLocation")
            .field("url", &self.url())
            .field("region", &self.store.region())
            .finish()
    }
}
