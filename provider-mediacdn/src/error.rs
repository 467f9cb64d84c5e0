//! Error types for the media CDN provider

use thiserror::Error;

/// Media CDN provider errors
#[derive(Error, Debug)]
pub enum MediaCdnError {
    /// Authentication failed or key is invalid
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// API request returned an error
    #[error("Media CDN API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// The requested public id is already taken
    #[error("Public id already exists: {0}")]
    AlreadyExists(String),

    /// The remote refuses this file type outright
    #[error("Restricted file type: {0}")]
    RestrictedFileType(String),

    /// Resource not found
    #[error("Resource not found: {public_id}")]
    ResourceNotFound { public_id: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] offload_bridge::error::BridgeError),
}

/// Result type for media CDN operations
pub type Result<T> = std::result::Result<T, MediaCdnError>;

impl From<MediaCdnError> for offload_bridge::error::BridgeError {
    fn from(error: MediaCdnError) -> Self {
        use offload_bridge::error::BridgeError;
        match error {
            MediaCdnError::AlreadyExists(id) => BridgeError::AlreadyExists(id),
            MediaCdnError::RestrictedFileType(msg) => BridgeError::Restricted(msg),
            MediaCdnError::NetworkError(msg) => BridgeError::RemoteUnavailable(msg),
            MediaCdnError::ApiError {
                status_code,
                message,
            } => BridgeError::RemoteApi {
                status: status_code,
                message,
            },
            MediaCdnError::BridgeError(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}
