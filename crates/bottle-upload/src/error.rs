//! Error types for the upload pipeline.

use thiserror::Error;

use bottle_core::ApiError;

/// Errors raised by one upload.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The upload server could not be acquired.
    #[error("failed to acquire upload server: {0}")]
    ServerAcquisition(#[source] ApiError),

    /// The source could not be read, or its bytes could not be sent to the
    /// upload server.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// The save call rejected the transfer's result.
    #[error("failed to save upload: {0}")]
    Save(#[source] ApiError),

    /// A response lacked a field the pipeline needs.
    #[error("malformed upload response: {0}")]
    MalformedResponse(String),
}

/// Result type for upload operations.
pub type UploadResult<T> = Result<T, UploadError>;
