//! Error types for the protect crate.

use thiserror::Error;

/// Errors that can occur while encrypting, decrypting, or loading key material.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtectError {
    /// Caller-supplied data or parameters are unusable (unknown format
    /// version, input shorter than the format overhead, bad chunk size).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Authentication failed or the cipher text is structurally broken.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Local secret data does not decrypt or does not have the expected shape.
    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("core error: {0}")]
    Core(#[from] trustcore_core::CoreError),
}

/// Result type for protect operations.
pub type Result<T> = std::result::Result<T, ProtectError>;
