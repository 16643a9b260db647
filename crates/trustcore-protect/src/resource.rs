//! Resources: a symmetric key and the public id it is indexed by.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::EncryptionKey;

/// Size of a resource id.
pub const RESOURCE_ID_SIZE: usize = 16;

/// Identifier of an encrypted resource. Not secret; used as index and AAD.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub [u8; RESOURCE_ID_SIZE]);

impl ResourceId {
    /// Derive the id of a resource from its key.
    pub fn derive(key: &EncryptionKey) -> Self {
        let hash = blake3::derive_key("trustcore resource id v1", key.as_bytes());
        let mut id = [0u8; RESOURCE_ID_SIZE];
        id.copy_from_slice(&hash[..RESOURCE_ID_SIZE]);
        Self(id)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; RESOURCE_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; RESOURCE_ID_SIZE] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.to_hex())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for ResourceId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for ResourceId {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        Ok(Self(slice.try_into()?))
    }
}

/// A resource key together with its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub resource_id: ResourceId,
    pub key: EncryptionKey,
}

impl Resource {
    pub fn new(key: EncryptionKey) -> Self {
        Self {
            resource_id: ResourceId::derive(&key),
            key,
        }
    }
}

/// Create a fresh resource with a random key.
pub fn make_resource() -> Resource {
    Resource::new(EncryptionKey::generate())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_is_keyed_hash() {
        let key = EncryptionKey::from_bytes([7; 32]);
        assert_eq!(ResourceId::derive(&key), ResourceId::derive(&key));
        assert_ne!(
            ResourceId::derive(&key),
            ResourceId::derive(&EncryptionKey::from_bytes([8; 32]))
        );
    }

    #[test]
    fn test_make_resource_unique() {
        let a = make_resource();
        let b = make_resource();
        assert_ne!(a.resource_id, b.resource_id);
        assert_eq!(a.resource_id, ResourceId::derive(&a.key));
    }
}
