//! # trustcore
//!
//! The trust and content-protection core of an end-to-end encryption client.
//!
//! ## Overview
//!
//! - **Trust chain verification**: signed entries delivered by an untrusted
//!   server are checked and folded into a verified view of users and their
//!   devices. See [`TrustchainVerifier`].
//! - **Resource encryption**: versioned formats, a chunked streaming mode,
//!   the key safe and the encrypted resource key store. See [`protect`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use trustcore::core::{Block, TrustchainId, UserEntry};
//! use trustcore::store::{MemoryStore, UnverifiedStore};
//! use trustcore::{TrustchainVerifier, VerifierConfig};
//!
//! async fn example(trustchain_id: TrustchainId, root: Block, blocks: Vec<Block>) {
//!     let store = Arc::new(MemoryStore::new());
//!     let verifier = TrustchainVerifier::new(trustchain_id, store.clone(), VerifierConfig::default());
//!
//!     verifier
//!         .verify_trustchain_creation(&root.to_typed_entry().unwrap())
//!         .await
//!         .unwrap();
//!
//!     // Device creations only; revocations also need their target user.
//!     let entries: Vec<UserEntry> = blocks
//!         .iter()
//!         .map(|b| UserEntry::DeviceCreation(b.to_typed_entry().unwrap()))
//!         .collect();
//!     let user_ids: Vec<_> = entries.iter().map(UserEntry::user_id).collect();
//!     store.add_unverified_user_entries(&entries).await.unwrap();
//!     verifier.update_user_store(&user_ids).await.unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `trustcore::core` - Blocks, entries, users and validation rules
//! - `trustcore::protect` - Encryption formats, streams and the key safe
//! - `trustcore::store` - Storage traits, memory and SQLite stores

pub mod error;
pub mod queue;
pub mod verifier;

pub use trustcore_core as core;
pub use trustcore_protect as protect;
pub use trustcore_store as store;

pub use error::{Result, TrustchainError};
pub use queue::TaskQueue;
pub use verifier::{TrustchainVerifier, VerifierConfig, VerifierStore};

pub use trustcore_core::{
    Block, Device, DeviceCreationEntry, DeviceId, ProvisionalIdentityClaimEntry,
    TrustchainCreationEntry, TrustchainId, User, UserEntry, UserId,
};
pub use trustcore_protect::{
    EncryptionFormat, EncryptorStream, DecryptorStream, Resource, ResourceId, StreamConfig,
};
