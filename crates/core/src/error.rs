//! Error types for s3-url
//!
//! Remote failures are carried through untouched in [`RemoteError`]; the only
//! classification this crate performs is [`RemoteError::is_not_found`].

use std::fmt;

use thiserror::Error;

/// Result alias used across the workspace
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed source error as produced by a storage backend
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by s3-url
#[derive(Error, Debug)]
pub enum Error {
    /// The input could not be parsed as an `s3://bucket/key` location
    #[error("Unsupported URL: {0}")]
    InvalidLocation(String),

    /// Failure reported by the storage service, passed through as-is
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Object content is not valid text in the requested encoding
    #[error("Decode error: {0}")]
    Decode(String),

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local I/O failed while reading an upload source
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration or client setup
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for `InvalidLocation` with the standard message
    pub(crate) fn unsupported_url(input: &str, reason: &str) -> Self {
        Error::InvalidLocation(format!("{input}. {reason}"))
    }

    /// True if this is a remote "not found" condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Remote(e) if e.is_not_found())
    }

    /// The remote error, if this error came from the storage service
    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            Error::Remote(e) => Some(e),
            _ => None,
        }
    }
}

/// A failure reported by the storage service
///
/// Holds the service error code and HTTP status when the backend exposes them,
/// plus the original error as `source`.
#[derive(Debug)]
pub struct RemoteError {
    operation: &'static str,
    code: Option<String>,
    status: Option<u16>,
    message: String,
    request_id: Option<String>,
    source: Option<BoxError>,
}

impl RemoteError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            code: None,
            status: None,
            message: message.into(),
            request_id: None,
            source: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// API operation that failed, e.g. `HeadObject`
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Service error code, e.g. `NoSuchKey` or `AccessDenied`
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// HTTP status of the failed response
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// True for a missing key or bucket
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
            || matches!(
                self.code.as_deref(),
                Some("NotFound" | "NoSuchKey" | "NoSuchBucket" | "404")
            )
    }

    /// True if the service refused the request for lack of permissions
    pub fn is_access_denied(&self) -> bool {
        (self.status == Some(403) && self.code.as_deref() != Some("InvalidObjectState"))
            || matches!(self.code.as_deref(), Some("AccessDenied" | "Forbidden" | "403"))
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed", self.operation)?;
        match (&self.code, self.status) {
            (Some(code), Some(status)) => write!(f, " ({code}, HTTP {status})")?,
            (Some(code), None) => write!(f, " ({code})")?,
            (None, Some(status)) => write!(f, " (HTTP {status})")?,
            (None, None) => {}
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for RemoteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
