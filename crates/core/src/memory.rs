//! In-memory object store for tests and local tooling.
//!
//! [`MemoryStore`] keeps buckets in `BTreeMap`s behind a `RwLock` and mimics the
//! S3 behaviours `ObjectLocation` depends on: not-found codes, paginated
//! listings with delimiters, tag sets, storage-class transitions that refuse to
//! leave an archival class without a restore, and restore requests.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use jiff::{SignedDuration, Timestamp};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{RemoteError, Result};
use crate::path::ObjectPath;
use crate::traits::{
    CopyOptions, ListPage, ListRequest, ObjectInfo, ObjectStore, PresignPutOptions, PutOptions,
    RetrievalTier,
};

/// Largest page a listing returns, as on S3
pub const MAX_PAGE_SIZE: usize = 1000;

/// Storage classes that need a restore before the data can be copied
const ARCHIVE_CLASSES: &[&str] = &["GLACIER", "DEEP_ARCHIVE"];

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    last_modified: Timestamp,
    etag: String,
    storage_class: Option<String>,
    server_side_encryption: Option<String>,
    restore: Option<String>,
    tags: HashMap<String, String>,
    metadata: HashMap<String, String>,
}

impl StoredObject {
    fn new(body: Bytes, options: &PutOptions) -> Self {
        Self {
            etag: etag_of(&body),
            body,
            last_modified: Timestamp::now(),
            storage_class: None,
            server_side_encryption: options.server_side_encryption.map(|e| e.as_str().to_string()),
            restore: None,
            tags: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    fn info(&self, key: &str) -> ObjectInfo {
        ObjectInfo {
            key: key.to_string(),
            size_bytes: Some(self.body.len() as i64),
            last_modified: Some(self.last_modified),
            etag: Some(self.etag.clone()),
            content_type: Some("binary/octet-stream".to_string()),
            storage_class: self.storage_class.clone(),
            server_side_encryption: self.server_side_encryption.clone(),
            restore: self.restore.clone(),
            metadata: self.metadata.clone(),
        }
    }

    fn is_archived(&self) -> bool {
        self.storage_class
            .as_deref()
            .is_some_and(|class| ARCHIVE_CLASSES.contains(&class))
    }
}

type Buckets = BTreeMap<String, BTreeMap<String, StoredObject>>;

/// An in-memory implementation of [`ObjectStore`].
///
/// Data is lost when the store is dropped. Buckets must be created before use;
/// requests against unknown buckets fail with `NoSuchBucket`.
#[derive(Debug)]
pub struct MemoryStore {
    buckets: RwLock<Buckets>,
    region: String,
    page_size: usize,
    list_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(BTreeMap::new()),
            region: "us-east-1".to_string(),
            page_size: MAX_PAGE_SIZE,
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Add a bucket while building the store
    pub fn with_bucket(self, bucket: &str) -> Self {
        self.create_bucket(bucket);
        self
    }

    /// Cap every listing page at `page_size` entries
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn create_bucket(&self, bucket: &str) {
        if let Ok(mut buckets) = self.buckets.write() {
            buckets.entry(bucket.to_string()).or_default();
        }
    }

    /// Number of `list_objects` calls served so far
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of objects in a bucket, zero for unknown buckets
    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets
            .read()
            .map(|buckets| buckets.get(bucket).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    fn read(&self, operation: &'static str) -> Result<RwLockReadGuard<'_, Buckets>> {
        self.buckets
            .read()
            .map_err(|e| RemoteError::new(operation, format!("lock poisoned: {e}")).into())
    }

    fn write(&self, operation: &'static str) -> Result<RwLockWriteGuard<'_, Buckets>> {
        self.buckets
            .write()
            .map_err(|e| RemoteError::new(operation, format!("lock poisoned: {e}")).into())
    }

    fn with_object<T>(
        &self,
        operation: &'static str,
        path: &ObjectPath,
        f: impl FnOnce(&StoredObject) -> T,
    ) -> Result<T> {
        let buckets = self.read(operation)?;
        let objects = buckets
            .get(path.bucket())
            .ok_or_else(|| no_such_bucket(operation, path.bucket()))?;
        let object = objects
            .get(path.key())
            .ok_or_else(|| no_such_key(operation))?;
        Ok(f(object))
    }

    fn with_object_mut<T>(
        &self,
        operation: &'static str,
        path: &ObjectPath,
        f: impl FnOnce(&mut StoredObject) -> Result<T>,
    ) -> Result<T> {
        let mut buckets = self.write(operation)?;
        let objects = buckets
            .get_mut(path.bucket())
            .ok_or_else(|| no_such_bucket(operation, path.bucket()))?;
        let object = objects
            .get_mut(path.key())
            .ok_or_else(|| no_such_key(operation))?;
        f(object)
    }

    fn store(&self, operation: &'static str, path: &ObjectPath, object: StoredObject) -> Result<()> {
        let mut buckets = self.write(operation)?;
        let objects = buckets
            .get_mut(path.bucket())
            .ok_or_else(|| no_such_bucket(operation, path.bucket()))?;
        objects.insert(path.key().to_string(), object);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

enum Entry<'a> {
    Object(&'a str, &'a StoredObject),
    Prefix(String),
}

impl Entry<'_> {
    fn name(&self) -> &str {
        match self {
            Entry::Object(key, _) => key,
            Entry::Prefix(prefix) => prefix,
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn region(&self) -> Option<String> {
        Some(self.region.clone())
    }

    async fn head_object(&self, path: &ObjectPath) -> Result<ObjectInfo> {
        // HEAD responses carry no body, so S3 reports a bare `NotFound`.
        self.with_object("HeadObject", path, |object| object.info(path.key()))
            .map_err(|e| {
                let missing_key = e
                    .as_remote()
                    .is_some_and(|remote| remote.code() == Some("NoSuchKey"));
                if missing_key {
                    RemoteError::new("HeadObject", "Not Found")
                        .with_code("NotFound")
                        .with_status(404)
                        .into()
                } else {
                    e
                }
            })
    }

    async fn get_object(&self, path: &ObjectPath) -> Result<Bytes> {
        self.with_object("GetObject", path, |object| object.body.clone())
    }

    async fn put_object(&self, path: &ObjectPath, body: Bytes, options: PutOptions) -> Result<()> {
        self.store("PutObject", path, StoredObject::new(body, &options))
    }

    async fn upload_stream(
        &self,
        path: &ObjectPath,
        mut reader: Box<dyn AsyncRead + Send + Unpin>,
        options: PutOptions,
    ) -> Result<u64> {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await?;
        let size = buffer.len() as u64;
        self.store("PutObject", path, StoredObject::new(Bytes::from(buffer), &options))?;
        Ok(size)
    }

    async fn delete_object(&self, path: &ObjectPath) -> Result<()> {
        let mut buckets = self.write("DeleteObject")?;
        let objects = buckets
            .get_mut(path.bucket())
            .ok_or_else(|| no_such_bucket("DeleteObject", path.bucket()))?;
        objects.remove(path.key());
        Ok(())
    }

    async fn list_objects(&self, path: &ObjectPath, request: ListRequest) -> Result<ListPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let buckets = self.read("ListObjectsV2")?;
        let objects = buckets
            .get(path.bucket())
            .ok_or_else(|| no_such_bucket("ListObjectsV2", path.bucket()))?;

        let prefix = path.key();
        let delimiter = request.delimiter.as_deref().filter(|d| !d.is_empty());

        // Keys in order, with everything past the delimiter folded into one prefix.
        let mut entries = Vec::new();
        let mut seen_prefixes = BTreeSet::new();
        for (key, object) in objects.range(prefix.to_string()..) {
            let Some(rest) = key.strip_prefix(prefix) else {
                break;
            };
            match delimiter.and_then(|d| rest.find(d).map(|idx| idx + d.len())) {
                Some(end) => {
                    let common = format!("{prefix}{}", &rest[..end]);
                    if seen_prefixes.insert(common.clone()) {
                        entries.push(Entry::Prefix(common));
                    }
                }
                None => entries.push(Entry::Object(key, object)),
            }
        }

        let start = match request.continuation_token.as_deref() {
            Some(token) => entries.partition_point(|entry| entry.name() <= token),
            None => 0,
        };

        let max_keys = request
            .max_keys
            .map_or(MAX_PAGE_SIZE, |n| usize::try_from(n).unwrap_or(0))
            .min(self.page_size);
        let end = (start + max_keys).min(entries.len());

        let mut page = ListPage::default();
        for entry in &entries[start..end] {
            match entry {
                Entry::Object(key, object) => page.objects.push(object.info(key)),
                Entry::Prefix(common) => page.common_prefixes.push(common.clone()),
            }
        }
        if end < entries.len() && end > start {
            page.next_continuation_token = Some(entries[end - 1].name().to_string());
        }

        tracing::trace!(
            bucket = %path.bucket(),
            prefix = %prefix,
            returned = end - start,
            truncated = page.next_continuation_token.is_some(),
            "Memory listing page"
        );

        Ok(page)
    }

    async fn get_object_tags(&self, path: &ObjectPath) -> Result<HashMap<String, String>> {
        self.with_object("GetObjectTagging", path, |object| object.tags.clone())
    }

    async fn put_object_tags(
        &self,
        path: &ObjectPath,
        tags: HashMap<String, String>,
    ) -> Result<()> {
        self.with_object_mut("PutObjectTagging", path, |object| {
            object.tags = tags;
            Ok(())
        })
    }

    async fn copy_object(
        &self,
        src: &ObjectPath,
        dst: &ObjectPath,
        options: CopyOptions,
    ) -> Result<()> {
        let source = self.with_object("CopyObject", src, StoredObject::clone)?;

        if source.is_archived() && !source.restore.as_deref().is_some_and(is_restore_complete) {
            return Err(RemoteError::new(
                "CopyObject",
                "Operation is not valid for the source object's storage class",
            )
            .with_code("InvalidObjectState")
            .with_status(403)
            .into());
        }

        let storage_class = options
            .storage_class
            .filter(|class| class.as_str() != "STANDARD");
        let copied = StoredObject {
            last_modified: Timestamp::now(),
            storage_class,
            server_side_encryption: None,
            restore: None,
            tags: if options.preserve_tags {
                source.tags.clone()
            } else {
                HashMap::new()
            },
            ..source
        };

        self.store("CopyObject", dst, copied)
    }

    async fn restore_object(
        &self,
        path: &ObjectPath,
        days: i32,
        _tier: RetrievalTier,
    ) -> Result<()> {
        if days < 1 {
            return Err(RemoteError::new("RestoreObject", "Days must be at least 1")
                .with_code("InvalidArgument")
                .with_status(400)
                .into());
        }

        self.with_object_mut("RestoreObject", path, |object| {
            if !object.is_archived() {
                return Err(RemoteError::new(
                    "RestoreObject",
                    "Restore is not allowed for the object's current storage class",
                )
                .with_code("InvalidObjectState")
                .with_status(403)
                .into());
            }

            let now = Timestamp::now();
            let expiry = now
                .checked_add(SignedDuration::from_hours(24 * i64::from(days)))
                .unwrap_or(now);
            object.restore = Some(format!(
                "ongoing-request=\"false\", expiry-date=\"{}\"",
                expiry.strftime("%a, %d %b %Y %H:%M:%S GMT")
            ));
            Ok(())
        })
    }

    async fn presign_get(&self, path: &ObjectPath, expires: Duration) -> Result<String> {
        Ok(self.presigned_url("GET", path, expires))
    }

    async fn presign_put(
        &self,
        path: &ObjectPath,
        expires: Duration,
        options: PresignPutOptions,
    ) -> Result<String> {
        let mut url = self.presigned_url("PUT", path, expires);
        if let Some(content_type) = options.content_type {
            url.push_str(&format!("&content-type={content_type}"));
        }
        Ok(url)
    }
}

impl MemoryStore {
    fn presigned_url(&self, method: &str, path: &ObjectPath, expires: Duration) -> String {
        format!(
            "memory://{}/{}?method={method}&region={}&expires={}",
            path.bucket(),
            path.key(),
            self.region,
            expires.as_secs()
        )
    }
}

fn is_restore_complete(restore: &str) -> bool {
    restore.starts_with("ongoing-request=\"false\"")
}

fn etag_of(body: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn no_such_key(operation: &'static str) -> RemoteError {
    RemoteError::new(operation, "The specified key does not exist.")
        .with_code("NoSuchKey")
        .with_status(404)
}

fn no_such_bucket(operation: &'static str, bucket: &str) -> RemoteError {
    RemoteError::new(operation, format!("The specified bucket does not exist: {bucket}"))
        .with_code("NoSuchBucket")
        .with_status(404)
}
