//! Error types for publishing.

use iwp_package::PackageError;
use thiserror::Error;

/// Errors that can occur while publishing a package.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Retryable block upload failure; absorbed by the uploader's retry loop
    #[error("transient upload failure for block {block_id}: {source}")]
    TransientUpload {
        block_id: String,
        #[source]
        source: BlobError,
    },

    /// Block upload still failing after every retry
    #[error("upload of block {block_id} failed after {attempts} attempts: {last_error}")]
    UploadFailed {
        block_id: String,
        attempts: u32,
        last_error: String,
    },

    /// Content file never reached the expected state
    #[error("timed out after {elapsed_secs}s waiting for {expected}")]
    RemoteStateTimeout { expected: String, elapsed_secs: u64 },

    /// Backend reported a terminal failure state
    #[error("content file entered {state} while waiting for {expected}")]
    RemoteStateFailure { expected: String, state: String },

    /// Existing app is of a different kind than the package
    #[error("app {app_id} is a {actual} but the package describes a {expected}")]
    TypeMismatch {
        app_id: String,
        expected: String,
        actual: String,
    },

    /// Backend rejected a request
    #[error("{operation} failed with status {status}: {message}")]
    Backend {
        operation: String,
        status: u16,
        message: String,
    },

    /// Backend response did not have the expected shape
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    /// Client settings are unusable
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-retryable blob storage error
    #[error("blob storage error: {0}")]
    Blob(#[from] BlobError),

    /// Packaging error
    #[error("package error: {0}")]
    Package(#[from] PackageError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PublishError {
    /// Whether the failed operation may be retried as is.
    pub fn is_transient(&self) -> bool {
        matches!(self, PublishError::TransientUpload { .. })
    }
}

/// Errors returned by a blob destination.
#[derive(Debug, Error)]
pub enum BlobError {
    /// Storage answered with a non-success status
    #[error("blob request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// Request never completed
    #[error("blob request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Signed URI could not be parsed
    #[error("invalid blob URI: {0}")]
    InvalidUri(String),

    /// Block list could not be serialized
    #[error("block list serialization failed: {0}")]
    Serialize(String),
}

impl BlobError {
    /// HTTP 307, 400 and 403 signal an expired or renewed SAS URI.
    ///
    /// NOTE: 400 is likely too permissive but matches the service's client.
    pub fn is_transient(&self) -> bool {
        matches!(self, BlobError::Status { status: 307 | 400 | 403, .. })
    }
}
