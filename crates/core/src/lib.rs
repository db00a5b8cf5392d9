//! s3url-core: Core library for s3-url
//!
//! This crate provides the SDK-independent pieces of s3-url:
//! - `s3://bucket/key` parsing and identity
//! - Error types
//! - The ObjectStore trait every backend implements
//! - Client configuration and the per-thread client registry
//! - An in-memory backend
//!
//! The aws-sdk-s3 backend lives in `s3url-s3`, keeping this crate free of any
//! particular SDK.

pub mod config;
pub mod error;
pub mod memory;
pub mod path;
pub mod registry;
pub mod traits;

pub use config::StoreConfig;
pub use error::{Error, RemoteError, Result};
pub use memory::MemoryStore;
pub use path::{DELIMITER, ObjectPath, SCHEME, SCHEME_PREFIX};
pub use registry::ClientRegistry;
#[cfg(feature = "mock")]
pub use traits::MockObjectStore;
pub use traits::{
    CopyOptions, DEFAULT_PRESIGN_TTL, ListPage, ListRequest, ObjectInfo, ObjectStore,
    PresignPutOptions, PutOptions, RetrievalTier, ServerSideEncryption,
};
