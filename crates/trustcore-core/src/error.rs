//! Error types for trustcore core.

use thiserror::Error;

use crate::entry::Nature;

/// Core errors raised while decoding blocks, checking keys, or folding entries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("truncated data while reading {field}")]
    Truncated { field: &'static str },

    #[error("{count} trailing bytes after {context}")]
    TrailingBytes { context: &'static str, count: usize },

    #[error("invalid varint while reading {field}")]
    InvalidVarint { field: &'static str },

    #[error("unknown block nature: {0}")]
    UnknownNature(u64),

    #[error("unsupported block version: {0}")]
    UnsupportedBlockVersion(u64),

    #[error("unexpected nature: expected {expected:?}, got {got:?}")]
    UnexpectedNature { expected: Nature, got: Nature },

    /// The fold over verified entries reached a state that cannot happen for
    /// well-ordered input. Always a bug, never untrusted data.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

/// Rejection of a single entry by the verification rules.
///
/// These are the "invalid block" outcomes: the entry came from an untrusted
/// source and is dropped, processing of unrelated entries continues.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid {0} signature")]
    InvalidSignature(&'static str),

    #[error("invalid delegation signature")]
    InvalidDelegationSignature,

    #[error("author not found")]
    UnknownAuthor,

    #[error("author revoked at index {revoked_at}, entry at index {index}")]
    RevokedAuthor { revoked_at: u64, index: u64 },

    #[error("author does not belong to the target user")]
    UserIdMismatch,

    #[error("user already exists")]
    UserAlreadyExists,

    #[error("device already exists")]
    DeviceAlreadyExists,

    #[error("target device not found")]
    UnknownTargetDevice,

    #[error("target device already revoked")]
    TargetAlreadyRevoked,

    #[error("user public key mismatch")]
    InvalidUserKey,

    #[error("invalid key recipients: {0}")]
    InvalidRecipients(String),

    #[error("invalid trustchain creation: {0}")]
    InvalidTrustchainCreation(&'static str),

    #[error("malformed entry: {0}")]
    Malformed(#[from] CoreError),
}

impl ValidationError {
    /// Short machine-friendly code, used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSignature(_) => "invalid_signature",
            Self::InvalidDelegationSignature => "invalid_delegation_signature",
            Self::UnknownAuthor => "unknown_author",
            Self::RevokedAuthor { .. } => "revoked_author",
            Self::UserIdMismatch => "user_id_mismatch",
            Self::UserAlreadyExists => "forbidden",
            Self::DeviceAlreadyExists => "device_already_exists",
            Self::UnknownTargetDevice => "invalid_revoked_device",
            Self::TargetAlreadyRevoked => "device_already_revoked",
            Self::InvalidUserKey => "invalid_user_public_key",
            Self::InvalidRecipients(_) => "invalid_new_key",
            Self::InvalidTrustchainCreation(_) => "invalid_trustchain_creation",
            Self::Malformed(_) => "malformed",
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
