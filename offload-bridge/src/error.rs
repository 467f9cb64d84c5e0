use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Remote resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Restricted file type: {0}")]
    Restricted(String),

    #[error("Remote store unreachable: {0}")]
    RemoteUnavailable(String),

    #[error("Remote API error (status {status}): {message}")]
    RemoteApi { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the error is terminal for the asset it was raised for.
    ///
    /// A restricted file type will never succeed on retry; everything else
    /// is at least potentially transient.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Restricted(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
