//! Process-wide client registry
//!
//! Locations parsed without an explicit store take the calling thread's client
//! from the registry installed here. [`init`] and [`init_with`] install the
//! aws-sdk-s3 backed registry; [`install_registry`] accepts any other.

use std::sync::{Arc, OnceLock};

use s3url_core::{ClientRegistry, Error, ObjectStore, Result, StoreConfig};
use s3url_s3::{S3Client, load_sdk_config};

static REGISTRY: OnceLock<ClientRegistry> = OnceLock::new();

/// Install the registry used by [`crate::ObjectLocation::parse`]
///
/// Fails if a registry is already installed; the first one stays in place.
pub fn install_registry(registry: ClientRegistry) -> Result<()> {
    REGISTRY
        .set(registry)
        .map_err(|_| Error::Config("client registry is already initialized".to_string()))
}

/// Initialize from `S3URL_*` environment variables and the SDK default chain
pub async fn init() -> Result<()> {
    init_with(StoreConfig::from_env()?).await
}

/// Initialize with an explicit configuration
///
/// Region and credentials are resolved once here. Each thread then gets its own
/// client built on the shared SDK configuration the first time it asks for one.
pub async fn init_with(config: StoreConfig) -> Result<()> {
    let sdk_config = load_sdk_config(&config).await?;
    tracing::debug!(
        region = sdk_config.region().map(|r| r.as_ref()).unwrap_or("-"),
        endpoint = config.endpoint_url.as_deref().unwrap_or("-"),
        "Loaded S3 configuration"
    );

    install_registry(ClientRegistry::new(move || {
        Ok(Arc::new(S3Client::from_sdk_config(&sdk_config, &config)) as Arc<dyn ObjectStore>)
    }))
}

/// True once a registry has been installed
pub fn is_initialized() -> bool {
    REGISTRY.get().is_some()
}

/// Client handle for the calling thread
pub fn current_store() -> Result<Arc<dyn ObjectStore>> {
    REGISTRY
        .get()
        .ok_or_else(|| {
            Error::Config("s3-url is not initialized, call s3_url::init() first".to_string())
        })?
        .current()
}

/// Drop the calling thread's client, e.g. before a short-lived thread exits
///
/// Returns whether a client was held. Does nothing before initialization.
pub fn release_current_store() -> bool {
    REGISTRY
        .get()
        .is_some_and(ClientRegistry::release_current)
}
