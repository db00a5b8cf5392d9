//! Client configuration
//!
//! Anything left unset here falls back to the SDK's default provider chain
//! (`AWS_REGION`, `AWS_PROFILE`, shared config files, instance metadata, ...).

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Environment variable prefix for s3-url settings
pub const ENV_PREFIX: &str = "S3URL_";

/// Settings used to build storage clients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Region to sign requests for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible services (MinIO, RustFS, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,

    /// Use `endpoint/bucket/key` addressing instead of virtual hosts
    pub force_path_style: bool,

    /// Named profile from the shared AWS config files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Attempts made by the SDK's retry policy, including the first one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Static credentials; both keys must be set together
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    pub fn with_path_style(mut self, force_path_style: bool) -> Self {
        self.force_path_style = force_path_style;
        self
    }

    pub fn with_static_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }

    /// Read `S3URL_*` variables from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|value| !value.trim().is_empty())
        };

        let force_path_style = match var("FORCE_PATH_STYLE") {
            Some(value) => parse_bool(&value).ok_or_else(|| {
                Error::Config(format!("Invalid {ENV_PREFIX}FORCE_PATH_STYLE: {value}"))
            })?,
            None => false,
        };

        let max_attempts = var("MAX_ATTEMPTS")
            .map(|value| {
                value.parse::<u32>().map_err(|_| {
                    Error::Config(format!("Invalid {ENV_PREFIX}MAX_ATTEMPTS: {value}"))
                })
            })
            .transpose()?;

        let config = Self {
            region: var("REGION"),
            endpoint_url: var("ENDPOINT_URL"),
            force_path_style,
            profile: var("PROFILE"),
            max_attempts,
            access_key: var("ACCESS_KEY"),
            secret_key: var("SECRET_KEY"),
            session_token: var("SESSION_TOKEN"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))
    }

    /// Check field combinations the SDK would otherwise reject late
    pub fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.endpoint_url {
            let parsed = Url::parse(endpoint)
                .map_err(|e| Error::Config(format!("Invalid endpoint URL '{endpoint}': {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::Config(format!(
                    "Endpoint URL must use http or https: {endpoint}"
                )));
            }
        }

        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(Error::Config(
                "access_key and secret_key must be set together".to_string(),
            ));
        }

        if self.session_token.is_some() && self.access_key.is_none() {
            return Err(Error::Config(
                "session_token requires access_key and secret_key".to_string(),
            ));
        }

        if self.max_attempts == Some(0) {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
