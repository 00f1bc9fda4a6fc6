use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Source not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Returns `true` when the failure concerns the output device rather than
    /// the byte source.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            BridgeError::Device(_) | BridgeError::PermissionDenied(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
