//! Translation of aws-sdk-s3 errors into [`RemoteError`]
//!
//! Nothing is reclassified here: the service code, HTTP status and request id
//! are copied over and the SDK error is kept as the source.

use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::RequestId;
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_types::error::display::DisplayErrorContext;
use s3url_core::{Error, RemoteError};

/// Wrap a failed SDK call
pub(crate) fn remote_error<E>(operation: &'static str, err: SdkError<E, HttpResponse>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

    let mut remote = RemoteError::new(operation, message);
    if let Some(code) = err.code() {
        remote = remote.with_code(code);
    }
    if let Some(response) = err.raw_response() {
        remote = remote.with_status(response.status().as_u16());
    }
    if let Some(request_id) = err.meta().request_id() {
        remote = remote.with_request_id(request_id);
    }

    tracing::debug!(
        operation,
        code = remote.code().unwrap_or("-"),
        status = remote.status().unwrap_or_default(),
        "S3 request failed"
    );

    remote.with_source(err).into()
}

/// Wrap a failure that happened before or after the request itself
pub(crate) fn local_error(
    operation: &'static str,
    err: impl std::error::Error + Send + Sync + 'static,
) -> Error {
    RemoteError::new(operation, err.to_string())
        .with_source(err)
        .into()
}
