//! s3-url: `s3://bucket/key` locations with object operations attached
//!
//! ```no_run
//! # async fn demo() -> s3_url::Result<()> {
//! s3_url::init().await?;
//!
//! let location = s3_url::ObjectLocation::parse("s3://bucket/prefix/file.json")?;
//! location.write_text(r#"{"a":1}"#, None).await?;
//! let value: serde_json::Value = location.read_json().await?;
//! assert_eq!(value["a"], 1);
//!
//! location.delete().await?;
//! assert!(!location.exists().await?);
//! # Ok(())
//! # }
//! ```
//!
//! Locations parsed from strings use the calling thread's client from the
//! registry installed by [`init`]. [`ObjectLocation::with_store`] binds any
//! other [`ObjectStore`], such as [`MemoryStore`] in tests.

mod context;
mod encoding;
mod listing;
mod location;

pub use context::{
    current_store, init, init_with, install_registry, is_initialized, release_current_store,
};
pub use encoding::TextEncoding;
pub use location::{IntoLocation, ObjectLocation};

pub use s3url_core::{
    ClientRegistry, DEFAULT_PRESIGN_TTL, Error, MemoryStore, ObjectInfo, ObjectPath, ObjectStore,
    PresignPutOptions, RemoteError, Result, RetrievalTier, ServerSideEncryption, StoreConfig,
};
pub use s3url_s3::S3Client;
