//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from s3url-core.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, GlacierJobParameters, MetadataDirective,
    RestoreRequest, StorageClass, Tag, TaggingDirective, Tier,
};
use bytes::Bytes;
use jiff::Timestamp;
use s3url_core::{
    CopyOptions, ListPage, ListRequest, ObjectInfo, ObjectPath, ObjectStore, PresignPutOptions,
    PutOptions, Result, RetrievalTier, ServerSideEncryption, StoreConfig,
};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{local_error, remote_error};

/// Size of each part in a streamed upload; S3 requires at least 5 MiB
pub const PART_SIZE: usize = 8 * 1024 * 1024;

/// Largest source a single CopyObject request accepts
pub const MAX_SINGLE_COPY_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Preferred part size for multipart copies
pub const COPY_PART_SIZE: u64 = 512 * 1024 * 1024;

/// Upper bound on parts in one multipart upload
const MAX_PARTS: u64 = 10_000;

/// Load the shared SDK configuration
///
/// This resolves region and credentials and is the expensive part of client
/// setup; clients built from the result with [`S3Client::from_sdk_config`] are
/// cheap.
pub async fn load_sdk_config(config: &StoreConfig) -> Result<SdkConfig> {
    config.validate()?;

    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

    if let Some(region) = &config.region {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }

    if let Some(profile) = &config.profile {
        loader = loader.profile_name(profile);
    }

    if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
        let credentials = aws_credential_types::Credentials::new(
            access_key,
            secret_key,
            config.session_token.clone(),
            None, // expiry
            "s3url-static-credentials",
        );
        loader = loader.credentials_provider(credentials);
    }

    if let Some(max_attempts) = config.max_attempts {
        loader = loader.retry_config(
            aws_config::retry::RetryConfig::standard().with_max_attempts(max_attempts),
        );
    }

    Ok(loader.load().await)
}

/// S3 client wrapper
#[derive(Debug, Clone)]
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    region: Option<String>,
}

impl S3Client {
    /// Create a new S3 client, loading the SDK configuration
    pub async fn new(config: &StoreConfig) -> Result<Self> {
        let sdk_config = load_sdk_config(config).await?;
        Ok(Self::from_sdk_config(&sdk_config, config))
    }

    /// Build a client on an already loaded SDK configuration
    pub fn from_sdk_config(sdk_config: &SdkConfig, config: &StoreConfig) -> Self {
        let mut builder = aws_sdk_s3::config::Builder::from(sdk_config)
            .force_path_style(config.force_path_style);

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        let s3_config = builder.build();
        let region = s3_config.region().map(|r| r.as_ref().to_string());

        Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            region,
        }
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    async fn upload_parts(
        &self,
        path: &ObjectPath,
        upload_id: &str,
        first_part: Vec<u8>,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(Vec<CompletedPart>, u64)> {
        let mut parts = Vec::new();
        let mut total = 0u64;
        let mut part = first_part;
        let mut part_number = 1i32;

        while !part.is_empty() {
            let size = part.len();
            total += size as u64;

            let response = self
                .inner
                .upload_part()
                .bucket(path.bucket())
                .key(path.key())
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part))
                .send()
                .await
                .map_err(|e| remote_error("UploadPart", e))?;

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(response.e_tag().map(str::to_string))
                    .build(),
            );
            tracing::trace!(key = %path.key(), part_number, size, "Uploaded part");

            if size < PART_SIZE {
                break;
            }
            part = read_part(reader).await?;
            part_number += 1;
        }

        Ok((parts, total))
    }

    async fn abort_upload(&self, path: &ObjectPath, upload_id: &str) {
        if let Err(e) = self
            .inner
            .abort_multipart_upload()
            .bucket(path.bucket())
            .key(path.key())
            .upload_id(upload_id)
            .send()
            .await
        {
            tracing::warn!(
                bucket = %path.bucket(),
                key = %path.key(),
                upload_id = %upload_id,
                error = %e,
                "Failed to abort multipart upload"
            );
        }
    }

    async fn complete_upload(
        &self,
        path: &ObjectPath,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<()> {
        self.inner
            .complete_multipart_upload()
            .bucket(path.bucket())
            .key(path.key())
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| remote_error("CompleteMultipartUpload", e))?;
        Ok(())
    }

    async fn single_copy(
        &self,
        src: &ObjectPath,
        dst: &ObjectPath,
        options: &CopyOptions,
    ) -> Result<()> {
        let mut request = self
            .inner
            .copy_object()
            .copy_source(copy_source(src))
            .bucket(dst.bucket())
            .key(dst.key())
            .metadata_directive(MetadataDirective::Copy);

        if let Some(class) = &options.storage_class {
            request = request.storage_class(StorageClass::from(class.as_str()));
        }

        // Without tagging headers REPLACE leaves the destination untagged.
        if !options.preserve_tags {
            request = request.tagging_directive(TaggingDirective::Replace);
        }

        request
            .send()
            .await
            .map_err(|e| remote_error("CopyObject", e))?;
        Ok(())
    }

    /// Copy a source too large for CopyObject, one byte range per part
    ///
    /// Content type and user metadata are carried over explicitly since
    /// UploadPartCopy only moves data.
    async fn multipart_copy(
        &self,
        src: &ObjectPath,
        dst: &ObjectPath,
        source: &ObjectInfo,
        size: u64,
        options: &CopyOptions,
    ) -> Result<usize> {
        let tagging = if options.preserve_tags {
            let tags = self.get_object_tags(src).await?;
            (!tags.is_empty()).then(|| tagging_header(&tags))
        } else {
            None
        };
        let metadata = (!source.metadata.is_empty()).then(|| source.metadata.clone());

        let created = self
            .inner
            .create_multipart_upload()
            .bucket(dst.bucket())
            .key(dst.key())
            .set_content_type(source.content_type.clone())
            .set_metadata(metadata)
            .set_storage_class(options.storage_class.as_deref().map(StorageClass::from))
            .set_tagging(tagging)
            .send()
            .await
            .map_err(|e| remote_error("CreateMultipartUpload", e))?;
        let upload_id = upload_id_of(created.upload_id())?;

        let parts = match self.copy_parts(src, dst, &upload_id, size).await {
            Ok(parts) => parts,
            Err(e) => {
                self.abort_upload(dst, &upload_id).await;
                return Err(e);
            }
        };

        let part_count = parts.len();
        if let Err(e) = self.complete_upload(dst, &upload_id, parts).await {
            self.abort_upload(dst, &upload_id).await;
            return Err(e);
        }
        Ok(part_count)
    }

    async fn copy_parts(
        &self,
        src: &ObjectPath,
        dst: &ObjectPath,
        upload_id: &str,
        size: u64,
    ) -> Result<Vec<CompletedPart>> {
        let source = copy_source(src);
        let mut parts = Vec::new();

        for (part_number, range) in (1i32..).zip(copy_part_ranges(size)) {
            let response = self
                .inner
                .upload_part_copy()
                .bucket(dst.bucket())
                .key(dst.key())
                .upload_id(upload_id)
                .part_number(part_number)
                .copy_source(&source)
                .copy_source_range(&range)
                .send()
                .await
                .map_err(|e| remote_error("UploadPartCopy", e))?;

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(
                        response
                            .copy_part_result()
                            .and_then(|result| result.e_tag())
                            .map(str::to_string),
                    )
                    .build(),
            );
            tracing::trace!(key = %dst.key(), part_number, range = %range, "Copied part");
        }

        Ok(parts)
    }
}

/// Fill a buffer of up to [`PART_SIZE`] bytes, shorter only at end of stream
async fn read_part(reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; PART_SIZE];
    let mut filled = 0;
    while filled < PART_SIZE {
        let read = reader.read(&mut buffer[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    buffer.truncate(filled);
    Ok(buffer)
}

/// `bucket/key` with each key segment percent-encoded
fn copy_source(path: &ObjectPath) -> String {
    let key = path
        .key()
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}", path.bucket(), key)
}

/// Byte ranges for a multipart copy of `size` bytes, as `bytes=first-last`
fn copy_part_ranges(size: u64) -> Vec<String> {
    let part_size = COPY_PART_SIZE.max(size.div_ceil(MAX_PARTS));
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < size {
        let end = (start + part_size).min(size);
        ranges.push(format!("bytes={start}-{}", end - 1));
        start = end;
    }
    ranges
}

/// Tag set as the URL query string expected by the `x-amz-tagging` header
fn tagging_header(tags: &HashMap<String, String>) -> String {
    let mut pairs: Vec<_> = tags
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    pairs.sort();
    pairs.join("&")
}

fn upload_id_of(upload_id: Option<&str>) -> Result<String> {
    upload_id.map(str::to_string).ok_or_else(|| {
        local_error(
            "CreateMultipartUpload",
            std::io::Error::other("no upload id returned"),
        )
    })
}

fn sse(encryption: ServerSideEncryption) -> aws_sdk_s3::types::ServerSideEncryption {
    aws_sdk_s3::types::ServerSideEncryption::from(encryption.as_str())
}

fn timestamp(dt: &aws_smithy_types::DateTime) -> Option<Timestamp> {
    Timestamp::from_second(dt.secs()).ok()
}

fn presigning_config(operation: &'static str, expires: Duration) -> Result<PresigningConfig> {
    PresigningConfig::builder()
        .expires_in(expires)
        .build()
        .map_err(|e| local_error(operation, e))
}

#[async_trait]
impl ObjectStore for S3Client {
    fn region(&self) -> Option<String> {
        self.region.clone()
    }

    async fn head_object(&self, path: &ObjectPath) -> Result<ObjectInfo> {
        let response = self
            .inner
            .head_object()
            .bucket(path.bucket())
            .key(path.key())
            .send()
            .await
            .map_err(|e| remote_error("HeadObject", e))?;

        let mut info = ObjectInfo::file(path.key(), response.content_length().unwrap_or(0));
        info.last_modified = response.last_modified().and_then(timestamp);
        info.etag = response.e_tag().map(|e| e.trim_matches('"').to_string());
        info.content_type = response.content_type().map(str::to_string);
        info.storage_class = response.storage_class().map(|sc| sc.as_str().to_string());
        info.server_side_encryption = response
            .server_side_encryption()
            .map(|sse| sse.as_str().to_string());
        info.restore = response.restore().map(str::to_string);
        info.metadata = response.metadata().cloned().unwrap_or_default();

        Ok(info)
    }

    async fn get_object(&self, path: &ObjectPath) -> Result<Bytes> {
        let response = self
            .inner
            .get_object()
            .bucket(path.bucket())
            .key(path.key())
            .send()
            .await
            .map_err(|e| remote_error("GetObject", e))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| local_error("GetObject", e))?
            .into_bytes();

        tracing::debug!(bucket = %path.bucket(), key = %path.key(), size_bytes = data.len(), "Downloaded object");
        Ok(data)
    }

    async fn put_object(&self, path: &ObjectPath, body: Bytes, options: PutOptions) -> Result<()> {
        let size = body.len();

        self.inner
            .put_object()
            .bucket(path.bucket())
            .key(path.key())
            .body(ByteStream::from(body))
            .set_server_side_encryption(options.server_side_encryption.map(sse))
            .send()
            .await
            .map_err(|e| remote_error("PutObject", e))?;

        tracing::debug!(bucket = %path.bucket(), key = %path.key(), size_bytes = size, "Uploaded object");
        Ok(())
    }

    async fn upload_stream(
        &self,
        path: &ObjectPath,
        mut reader: Box<dyn AsyncRead + Send + Unpin>,
        options: PutOptions,
    ) -> Result<u64> {
        let first_part = read_part(reader.as_mut()).await?;

        // Content that fits in one part goes up as a plain PutObject.
        if first_part.len() < PART_SIZE {
            let size = first_part.len() as u64;
            self.put_object(path, Bytes::from(first_part), options).await?;
            return Ok(size);
        }

        let created = self
            .inner
            .create_multipart_upload()
            .bucket(path.bucket())
            .key(path.key())
            .set_server_side_encryption(options.server_side_encryption.map(sse))
            .send()
            .await
            .map_err(|e| remote_error("CreateMultipartUpload", e))?;

        let upload_id = upload_id_of(created.upload_id())?;

        let (parts, total) = match self
            .upload_parts(path, &upload_id, first_part, reader.as_mut())
            .await
        {
            Ok(uploaded) => uploaded,
            Err(e) => {
                self.abort_upload(path, &upload_id).await;
                return Err(e);
            }
        };

        let part_count = parts.len();
        if let Err(e) = self.complete_upload(path, &upload_id, parts).await {
            self.abort_upload(path, &upload_id).await;
            return Err(e);
        }

        tracing::debug!(
            bucket = %path.bucket(),
            key = %path.key(),
            size_bytes = total,
            parts = part_count,
            "Multipart upload complete"
        );
        Ok(total)
    }

    async fn delete_object(&self, path: &ObjectPath) -> Result<()> {
        self.inner
            .delete_object()
            .bucket(path.bucket())
            .key(path.key())
            .send()
            .await
            .map_err(|e| remote_error("DeleteObject", e))?;

        Ok(())
    }

    async fn list_objects(&self, path: &ObjectPath, request: ListRequest) -> Result<ListPage> {
        let mut builder = self.inner.list_objects_v2().bucket(path.bucket());

        if !path.key().is_empty() {
            builder = builder.prefix(path.key());
        }

        let response = builder
            .set_delimiter(request.delimiter)
            .set_max_keys(request.max_keys)
            .set_continuation_token(request.continuation_token)
            .send()
            .await
            .map_err(|e| remote_error("ListObjectsV2", e))?;

        let objects = response
            .contents()
            .iter()
            .map(|object| {
                let mut info = ObjectInfo::file(
                    object.key().unwrap_or_default(),
                    object.size().unwrap_or(0),
                );
                info.last_modified = object.last_modified().and_then(timestamp);
                info.etag = object.e_tag().map(|e| e.trim_matches('"').to_string());
                info.storage_class = object.storage_class().map(|sc| sc.as_str().to_string());
                info
            })
            .collect();

        let common_prefixes = response
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();

        let next_continuation_token = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            objects,
            common_prefixes,
            next_continuation_token,
        })
    }

    async fn get_object_tags(&self, path: &ObjectPath) -> Result<HashMap<String, String>> {
        let response = self
            .inner
            .get_object_tagging()
            .bucket(path.bucket())
            .key(path.key())
            .send()
            .await
            .map_err(|e| remote_error("GetObjectTagging", e))?;

        Ok(response
            .tag_set()
            .iter()
            .map(|tag| (tag.key().to_string(), tag.value().to_string()))
            .collect())
    }

    async fn put_object_tags(
        &self,
        path: &ObjectPath,
        tags: HashMap<String, String>,
    ) -> Result<()> {
        use aws_sdk_s3::types::Tagging;

        let tag_set = tags
            .into_iter()
            .map(|(k, v)| {
                Tag::builder()
                    .key(k)
                    .value(v)
                    .build()
                    .map_err(|e| local_error("PutObjectTagging", e))
            })
            .collect::<Result<Vec<_>>>()?;

        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|e| local_error("PutObjectTagging", e))?;

        self.inner
            .put_object_tagging()
            .bucket(path.bucket())
            .key(path.key())
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| remote_error("PutObjectTagging", e))?;

        Ok(())
    }

    async fn copy_object(
        &self,
        src: &ObjectPath,
        dst: &ObjectPath,
        options: CopyOptions,
    ) -> Result<()> {
        let source = self.head_object(src).await?;
        let size = source
            .size_bytes
            .and_then(|size| u64::try_from(size).ok())
            .unwrap_or(0);

        let parts = if size > MAX_SINGLE_COPY_SIZE {
            self.multipart_copy(src, dst, &source, size, &options)
                .await?
        } else {
            self.single_copy(src, dst, &options).await?;
            1
        };

        tracing::debug!(
            src = %src,
            dst = %dst,
            size_bytes = size,
            parts,
            storage_class = options.storage_class.as_deref().unwrap_or("-"),
            "Copied object"
        );
        Ok(())
    }

    async fn restore_object(
        &self,
        path: &ObjectPath,
        days: i32,
        tier: RetrievalTier,
    ) -> Result<()> {
        let job = GlacierJobParameters::builder()
            .tier(Tier::from(tier.as_str()))
            .build()
            .map_err(|e| local_error("RestoreObject", e))?;

        let request = RestoreRequest::builder()
            .days(days)
            .glacier_job_parameters(job)
            .build();

        self.inner
            .restore_object()
            .bucket(path.bucket())
            .key(path.key())
            .restore_request(request)
            .send()
            .await
            .map_err(|e| remote_error("RestoreObject", e))?;

        Ok(())
    }

    async fn presign_get(&self, path: &ObjectPath, expires: Duration) -> Result<String> {
        let config = presigning_config("GetObject", expires)?;

        let request = self
            .inner
            .get_object()
            .bucket(path.bucket())
            .key(path.key())
            .presigned(config)
            .await
            .map_err(|e| remote_error("GetObject", e))?;

        Ok(request.uri().to_string())
    }

    async fn presign_put(
        &self,
        path: &ObjectPath,
        expires: Duration,
        options: PresignPutOptions,
    ) -> Result<String> {
        let config = presigning_config("PutObject", expires)?;

        let metadata = (!options.metadata.is_empty()).then_some(options.metadata);

        let request = self
            .inner
            .put_object()
            .bucket(path.bucket())
            .key(path.key())
            .set_content_type(options.content_type)
            .set_cache_control(options.cache_control)
            .set_server_side_encryption(options.server_side_encryption.map(sse))
            .set_metadata(metadata)
            .presigned(config)
            .await
            .map_err(|e| remote_error("PutObject", e))?;

        Ok(request.uri().to_string())
    }
}
