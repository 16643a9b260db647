//! # trustcore protect
//!
//! Symmetric protection of resources and local secrets.
//!
//! ## Overview
//!
//! Every encrypted payload starts with a format version. Five formats coexist:
//!
//! - **v1**: local secrets only (key safe, resource key store), optional AAD
//! - **v2**: random IV, resource id is the mac
//! - **v3**: single-use key with a zero IV, default for shared resources
//! - **v4**: chunked streaming format, see [`stream`]
//! - **v5**: resource id pinned in the header and bound as AAD
//!
//! [`format::extract_encryption_format`] dispatches on the version.
//!
//! ## Key Material
//!
//! - [`Resource`]: a symmetric key and the id derived from it
//! - [`KeySafe`]: the device's secret state, encrypted under the [`UserSecret`]
//! - [`seal`] / [`seal_open`]: anonymous encryption to an X25519 public key
//!
//! ## Usage
//!
//! ```rust,no_run
//! use trustcore_protect::{format, make_resource};
//!
//! let resource = make_resource();
//! let encrypted = format::simple_encryption()
//!     .encrypt(&resource.key, &resource.resource_id, b"hello")
//!     .unwrap();
//! let clear = format::decrypt(&resource.key, &encrypted).unwrap();
//! assert_eq!(clear, b"hello");
//! ```

pub mod crypto;
pub mod error;
pub mod format;
pub mod keysafe;
pub mod resource;
pub mod stream;
pub mod tagged_base64;

pub use crypto::{
    seal, seal_open, EncryptionKey, EphemeralKeyPair, SharedKey, X25519StaticSecret,
};
pub use error::{ProtectError, Result};
pub use format::{
    extract_encryption_format, get_clear_size, get_encrypted_size, EncryptionFormat,
    EncryptionFormatDescription, SAFE_EXTRACTION_LENGTH,
};
pub use keysafe::{
    deserialize_key_safe, serialize_key_safe, EncryptedUserKey, KeyPair, KeySafe,
    ProvisionalUserKeyPairs, UserSecret,
};
pub use resource::{make_resource, Resource, ResourceId};
pub use stream::{
    ChunkDecryptor, ChunkEncryptor, DecryptorStream, EncryptorStream, Resizer, StreamConfig,
};
