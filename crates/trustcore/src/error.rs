//! Error types for trust chain verification.

use trustcore_core::{CoreError, ValidationError};
use trustcore_store::StoreError;
use thiserror::Error;

/// Errors that can occur while verifying trust chain entries.
#[derive(Debug, Error)]
pub enum TrustchainError {
    /// The entry was rejected by a verification rule. Carries the rule's code.
    #[error("invalid block ({}): {0}", .0.code())]
    InvalidBlock(#[from] ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Local state is inconsistent with the entries being verified.
    #[error("internal error: {0}")]
    Internal(String),

    /// The detached verification task panicked or its runtime shut down.
    #[error("verification task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl TrustchainError {
    pub fn is_invalid_block(&self) -> bool {
        matches!(self, Self::InvalidBlock(_))
    }
}

/// Result type for verifier operations.
pub type Result<T> = std::result::Result<T, TrustchainError>;
