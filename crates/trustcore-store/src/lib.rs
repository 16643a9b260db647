//! # trustcore store
//!
//! Storage abstraction for trustcore. Provides trait-based interfaces for
//! trust chain state and resource keys, with in-memory and SQLite
//! implementations.
//!
//! ## Key Types
//!
//! - [`UnverifiedStore`] - Entries received but not verified yet
//! - [`UserStore`] - Verified users and devices
//! - [`TrustchainStore`] - The trust chain root key
//! - [`ResourceKeyBackend`] - Raw encrypted resource key rows
//! - [`ResourceStore`] - Encrypts resource keys under the user secret
//! - [`MemoryStore`] - Implements every trait, in memory
//! - [`SqliteStore`] - Persistent root key and resource keys
//!
//! ## Usage
//!
//! ```rust,no_run
//! use trustcore_protect::{make_resource, UserSecret};
//! use trustcore_store::{ResourceStore, SqliteStore};
//!
//! async fn example() {
//!     let backend = SqliteStore::open("trustcore.db").unwrap();
//!     let store = ResourceStore::new(backend, UserSecret::generate());
//!
//!     let resource = make_resource();
//!     store
//!         .save_resource_key(&resource.resource_id, &resource.key)
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod error;
pub mod memory;
pub mod migration;
pub mod resource;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use resource::ResourceStore;
pub use sqlite::SqliteStore;
pub use traits::{ResourceKeyBackend, TrustchainStore, UnverifiedStore, UserStore};
