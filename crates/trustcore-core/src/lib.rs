//! # trustcore core
//!
//! Pure primitives for trustcore: trust chain blocks, typed entries, and the
//! user/device fold.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`Block`] - A serialized trust chain entry as delivered by the server
//! - [`Entry`] - A decoded entry with a typed payload
//! - [`Nature`] - Discriminator for payload interpretation
//! - [`User`] / [`Device`] - Verified state, folded from entries
//!
//! ## Wire format
//!
//! Blocks and payload records are fixed-field concatenations with varint
//! prefixes. See [`block`] and [`entry`].

pub mod block;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod types;
pub mod user;
pub mod validation;
pub mod varint;

pub use block::{compute_hash, Block, BlockBuilder, BLOCK_VERSION};
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair, X25519PublicKey};
pub use entry::{
    DeviceCreationEntry, DeviceCreationRecord, DeviceRevocationEntry, DeviceRevocationRecord,
    Entry, Nature, Payload, ProvisionalIdentityClaimEntry, ProvisionalIdentityClaimRecord,
    Record, SealedKeyForDevice, TrustchainCreationEntry, TrustchainCreationRecord, UserEntry,
    UserKeyPair,
};
pub use error::{CoreError, ValidationError};
pub use types::{DeviceId, TrustchainId, UserId};
pub use user::{Device, User, UserPublicKey};
pub use validation::{
    verify_device_creation, verify_device_revocation, verify_provisional_identity_claim,
    verify_trustchain_creation, Author,
};
