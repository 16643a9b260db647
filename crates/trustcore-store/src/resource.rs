//! Encrypted resource key store.
//!
//! Resource keys are encrypted with format v1 under the user secret, with the
//! resource id bound as associated data, then stored through a
//! [`ResourceKeyBackend`]. The first key saved for an id is kept forever.

use trustcore_protect::crypto::KEY_SIZE;
use trustcore_protect::format::v1;
use trustcore_protect::{EncryptionKey, ProtectError, ResourceId, UserSecret};

use crate::error::Result;
use crate::traits::ResourceKeyBackend;

/// Resource keys of one user, encrypted at rest.
pub struct ResourceStore<B> {
    backend: B,
    user_secret: UserSecret,
}

impl<B: ResourceKeyBackend> ResourceStore<B> {
    pub fn new(backend: B, user_secret: UserSecret) -> Self {
        Self {
            backend,
            user_secret,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Persist `key` for `resource_id` unless a key is already stored.
    pub async fn save_resource_key(
        &self,
        resource_id: &ResourceId,
        key: &EncryptionKey,
    ) -> Result<()> {
        let encrypted = v1::encrypt(
            self.user_secret.key(),
            key.as_bytes(),
            Some(resource_id.as_bytes()),
        )?;
        let inserted = self
            .backend
            .put_encrypted_key_if_absent(resource_id, encrypted)
            .await?;
        if !inserted {
            tracing::debug!(%resource_id, "resource key already stored, keeping the first one");
        }
        Ok(())
    }

    /// Load and decrypt the key of `resource_id`.
    ///
    /// Rows written before the resource id was bound as associated data are
    /// still accepted.
    pub async fn find_resource_key(&self, resource_id: &ResourceId) -> Result<Option<EncryptionKey>> {
        let Some(encrypted) = self.backend.get_encrypted_key(resource_id).await? else {
            return Ok(None);
        };

        if encrypted.len() < v1::OVERHEAD + KEY_SIZE {
            return Err(ProtectError::DecryptionFailed(format!(
                "stored key for {} is truncated ({} bytes)",
                resource_id,
                encrypted.len()
            ))
            .into());
        }

        let clear = v1::compat_decrypt(self.user_secret.key(), &encrypted, resource_id.as_bytes())?;
        let key = EncryptionKey::try_from(clear.as_slice()).map_err(|_| {
            ProtectError::DecryptionFailed(format!(
                "stored key for {} has {} bytes",
                resource_id,
                clear.len()
            ))
        })?;
        Ok(Some(key))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::MemoryStore;
    use crate::sqlite::SqliteStore;
    use crate::StoreError;
    use trustcore_protect::make_resource;

    #[tokio::test]
    async fn test_save_then_find() {
        let store = ResourceStore::new(MemoryStore::new(), UserSecret::generate());
        let resource = make_resource();

        assert!(store
            .find_resource_key(&resource.resource_id)
            .await
            .unwrap()
            .is_none());
        store
            .save_resource_key(&resource.resource_id, &resource.key)
            .await
            .unwrap();
        assert_eq!(
            store.find_resource_key(&resource.resource_id).await.unwrap(),
            Some(resource.key)
        );
    }

    #[tokio::test]
    async fn test_first_write_wins() {
        let store = ResourceStore::new(SqliteStore::open_memory().unwrap(), UserSecret::generate());
        let id = ResourceId([2; 16]);
        let first = EncryptionKey::from_bytes([1; 32]);
        let second = EncryptionKey::from_bytes([2; 32]);

        store.save_resource_key(&id, &first).await.unwrap();
        store.save_resource_key(&id, &second).await.unwrap();
        assert_eq!(store.find_resource_key(&id).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_truncated_row_is_decryption_error() {
        let backend = Arc::new(MemoryStore::new());
        let id = ResourceId([4; 16]);
        backend
            .put_encrypted_key_if_absent(&id, vec![1; 20])
            .await
            .unwrap();

        let store = ResourceStore::new(backend, UserSecret::generate());
        let err = store.find_resource_key(&id).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Protect(ProtectError::DecryptionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_reads_rows_without_associated_data() {
        let backend = Arc::new(MemoryStore::new());
        let secret = UserSecret::from_bytes([8; 32]);
        let resource = make_resource();
        let legacy = v1::encrypt(secret.key(), resource.key.as_bytes(), None).unwrap();
        backend
            .put_encrypted_key_if_absent(&resource.resource_id, legacy)
            .await
            .unwrap();

        let store = ResourceStore::new(backend, secret);
        assert_eq!(
            store.find_resource_key(&resource.resource_id).await.unwrap(),
            Some(resource.key)
        );
    }

    #[tokio::test]
    async fn test_wrong_secret_fails() {
        let backend = Arc::new(MemoryStore::new());
        let resource = make_resource();
        ResourceStore::new(backend.clone(), UserSecret::generate())
            .save_resource_key(&resource.resource_id, &resource.key)
            .await
            .unwrap();

        let other = ResourceStore::new(backend, UserSecret::generate());
        assert!(other.find_resource_key(&resource.resource_id).await.is_err());
    }
}
