//! Error types for VaultFS

use thiserror::Error;

/// Main error type for store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error: bad framing, unexpected command, malformed reply
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Token mismatch
    #[error("Authentication Failed")]
    Authentication,

    /// Malformed payload: bad hash, bad address, storage-root escape
    #[error("Validation error: {0}")]
    Validation(String),

    /// A bounded operation ran out of time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// No peer able to serve the request
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Metadata backend write or read failed
    #[error("Metadata Persistence Failed: {0}")]
    Persistence(String),

    /// Connection failed or was closed mid-request
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::Protocol("test error".to_string());
        assert!(err.to_string().contains("test error"));
        assert_eq!(
            StoreError::Authentication.to_string(),
            "Authentication Failed"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::other("test");
        let err: StoreError = io_err.into();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
