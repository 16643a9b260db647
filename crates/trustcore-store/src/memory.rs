//! In-memory implementation of every store trait.
//!
//! Used by tests and by clients without persistent storage. It has the same
//! semantics as the SQLite store but keeps everything in memory.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use trustcore_core::{
    Blake3Hash, Device, DeviceCreationEntry, DeviceId, Ed25519PublicKey, User, UserEntry, UserId,
};
use trustcore_protect::ResourceId;

use crate::error::Result;
use crate::traits::{ResourceKeyBackend, TrustchainStore, UnverifiedStore, UserStore};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Pending entries by (index, hash); the index orders reads.
    unverified: BTreeMap<(u64, Blake3Hash), UserEntry>,

    /// Verified users.
    users: HashMap<UserId, User>,

    /// Device index: device_id -> owning user.
    device_owners: HashMap<DeviceId, UserId>,

    trustchain_public_key: Option<Ed25519PublicKey>,

    /// Encrypted resource key rows.
    resource_keys: HashMap<ResourceId, Vec<u8>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    /// Number of entries awaiting verification.
    pub fn unverified_len(&self) -> usize {
        self.read().unverified.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryStoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryStoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UnverifiedStore for MemoryStore {
    async fn add_unverified_user_entries(&self, entries: &[UserEntry]) -> Result<()> {
        let mut inner = self.write();
        for entry in entries {
            inner
                .unverified
                .insert((entry.index(), entry.hash()), entry.clone());
        }
        Ok(())
    }

    async fn find_unverified_user_entries(
        &self,
        user_ids: &[UserId],
        before_index: Option<u64>,
    ) -> Result<Vec<UserEntry>> {
        let inner = self.read();
        Ok(inner
            .unverified
            .values()
            .take_while(|entry| before_index.map_or(true, |before| entry.index() < before))
            .filter(|entry| user_ids.contains(&entry.user_id()))
            .cloned()
            .collect())
    }

    async fn find_unverified_devices_by_hash(
        &self,
        device_ids: &[DeviceId],
    ) -> Result<Vec<DeviceCreationEntry>> {
        let inner = self.read();
        Ok(inner
            .unverified
            .values()
            .filter_map(|entry| match entry {
                UserEntry::DeviceCreation(creation)
                    if device_ids.contains(&creation.device_id()) =>
                {
                    Some(creation.clone())
                }
                _ => None,
            })
            .collect())
    }

    async fn remove_verified_user_entries(&self, entries: &[UserEntry]) -> Result<()> {
        let mut inner = self.write();
        for entry in entries {
            inner.unverified.remove(&(entry.index(), entry.hash()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, user_id: &UserId) -> Result<Option<User>> {
        Ok(self.read().users.get(user_id).cloned())
    }

    async fn find_devices(&self, device_ids: &[DeviceId]) -> Result<HashMap<DeviceId, Device>> {
        let inner = self.read();
        let mut devices = HashMap::new();
        for device_id in device_ids {
            let device = inner
                .device_owners
                .get(device_id)
                .and_then(|user_id| inner.users.get(user_id))
                .and_then(|user| user.device(device_id));
            if let Some(device) = device {
                devices.insert(*device_id, device.clone());
            }
        }
        Ok(devices)
    }

    async fn apply_entry(&self, entry: &UserEntry) -> Result<User> {
        let mut inner = self.write();
        let user_id = entry.user_id();
        let user = User::apply(inner.users.get(&user_id).cloned(), entry)?;

        if let UserEntry::DeviceCreation(creation) = entry {
            inner.device_owners.insert(creation.device_id(), user_id);
        }
        inner.users.insert(user_id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl TrustchainStore for MemoryStore {
    async fn trustchain_public_key(&self) -> Result<Option<Ed25519PublicKey>> {
        Ok(self.read().trustchain_public_key)
    }

    async fn set_trustchain_public_key(&self, key: &Ed25519PublicKey) -> Result<()> {
        self.write().trustchain_public_key = Some(*key);
        Ok(())
    }
}

#[async_trait]
impl ResourceKeyBackend for MemoryStore {
    async fn get_encrypted_key(&self, resource_id: &ResourceId) -> Result<Option<Vec<u8>>> {
        Ok(self.read().resource_keys.get(resource_id).cloned())
    }

    async fn put_encrypted_key_if_absent(
        &self,
        resource_id: &ResourceId,
        encrypted_key: Vec<u8>,
    ) -> Result<bool> {
        let mut inner = self.write();
        if inner.resource_keys.contains_key(resource_id) {
            return Ok(false);
        }
        inner.resource_keys.insert(*resource_id, encrypted_key);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustcore_core::crypto::sizes::SEALED_KEY_SIZE;
    use trustcore_core::{
        DeviceCreationRecord, DeviceRevocationRecord, Ed25519Signature, Entry, UserKeyPair,
        X25519PublicKey,
    };

    fn creation(index: u64, user: u8, tag: u8) -> UserEntry {
        UserEntry::DeviceCreation(Entry {
            index,
            author: DeviceId([0xee; 32]),
            signature: Ed25519Signature::ZERO,
            hash: Blake3Hash([tag; 32]),
            payload: DeviceCreationRecord {
                ephemeral_public_signature_key: Ed25519PublicKey([1; 32]),
                user_id: UserId([user; 32]),
                delegation_signature: Ed25519Signature::ZERO,
                public_signature_key: Ed25519PublicKey([tag; 32]),
                public_encryption_key: X25519PublicKey([tag; 32]),
                user_key_pair: UserKeyPair {
                    public_encryption_key: X25519PublicKey([user; 32]),
                    sealed_private_encryption_key: [0; SEALED_KEY_SIZE],
                },
                is_ghost_device: false,
            },
        })
    }

    fn revocation(index: u64, user: u8, target: u8) -> UserEntry {
        UserEntry::DeviceRevocation {
            user_id: UserId([user; 32]),
            entry: Entry {
                index,
                author: DeviceId([target; 32]),
                signature: Ed25519Signature::ZERO,
                hash: Blake3Hash([index as u8; 32]),
                payload: DeviceRevocationRecord {
                    device_id: DeviceId([target; 32]),
                    public_encryption_key: X25519PublicKey([0x77; 32]),
                    previous_public_encryption_key: X25519PublicKey([user; 32]),
                    sealed_previous_private_key: [0; SEALED_KEY_SIZE],
                    sealed_keys_for_devices: vec![],
                },
            },
        }
    }

    #[tokio::test]
    async fn test_unverified_entries_ordered_and_filtered() {
        let store = MemoryStore::new();
        store
            .add_unverified_user_entries(&[
                creation(9, 1, 0xa9),
                creation(3, 2, 0xa3),
                creation(5, 1, 0xa5),
            ])
            .await
            .unwrap();

        let user1 = store
            .find_unverified_user_entries(&[UserId([1; 32])], None)
            .await
            .unwrap();
        let indexes: Vec<u64> = user1.iter().map(UserEntry::index).collect();
        assert_eq!(indexes, vec![5, 9]);

        let before = store
            .find_unverified_user_entries(&[UserId([1; 32]), UserId([2; 32])], Some(9))
            .await
            .unwrap();
        let indexes: Vec<u64> = before.iter().map(UserEntry::index).collect();
        assert_eq!(indexes, vec![3, 5]);
    }

    #[tokio::test]
    async fn test_add_is_idempotent_and_remove_ignores_unknown() {
        let store = MemoryStore::new();
        let entry = creation(4, 1, 0xb4);
        store
            .add_unverified_user_entries(&[entry.clone(), entry.clone()])
            .await
            .unwrap();
        assert_eq!(store.unverified_len(), 1);

        store
            .remove_verified_user_entries(&[entry, creation(8, 1, 0xb8)])
            .await
            .unwrap();
        assert_eq!(store.unverified_len(), 0);
    }

    #[tokio::test]
    async fn test_find_unverified_devices_by_hash() {
        let store = MemoryStore::new();
        store
            .add_unverified_user_entries(&[creation(2, 1, 0xc2), creation(3, 1, 0xc3)])
            .await
            .unwrap();

        let found = store
            .find_unverified_devices_by_hash(&[DeviceId([0xc3; 32]), DeviceId([0xff; 32])])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].device_id(), DeviceId([0xc3; 32]));
    }

    #[tokio::test]
    async fn test_apply_entries_updates_user_and_devices() {
        let store = MemoryStore::new();
        let users = store
            .apply_entries(&[creation(2, 1, 0xd2), creation(3, 1, 0xd3)])
            .await
            .unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[1].devices.len(), 2);

        let user = store.apply_entry(&revocation(6, 1, 0xd2)).await.unwrap();
        assert_eq!(user.device(&DeviceId([0xd2; 32])).unwrap().revoked_at, Some(6));
        assert_eq!(user.current_public_key(), Some(&X25519PublicKey([0x77; 32])));

        let devices = store
            .find_devices(&[DeviceId([0xd2; 32]), DeviceId([0xd3; 32]), DeviceId([9; 32])])
            .await
            .unwrap();
        assert_eq!(devices.len(), 2);
        assert!(devices[&DeviceId([0xd2; 32])].is_revoked());
        assert_eq!(
            store.find_user(&UserId([1; 32])).await.unwrap(),
            Some(user)
        );
    }

    #[tokio::test]
    async fn test_apply_inconsistent_entry_fails() {
        let store = MemoryStore::new();
        let err = store.apply_entry(&revocation(6, 1, 0xd2)).await.unwrap_err();
        assert!(matches!(err, crate::StoreError::Core(_)));
        assert!(store.find_user(&UserId([1; 32])).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_trustchain_key() {
        let store = MemoryStore::new();
        assert!(store.trustchain_public_key().await.unwrap().is_none());
        store
            .set_trustchain_public_key(&Ed25519PublicKey([4; 32]))
            .await
            .unwrap();
        assert_eq!(
            store.trustchain_public_key().await.unwrap(),
            Some(Ed25519PublicKey([4; 32]))
        );
    }

    #[tokio::test]
    async fn test_resource_key_first_write_wins() {
        let store = MemoryStore::new();
        let id = ResourceId([1; 16]);
        assert!(store.put_encrypted_key_if_absent(&id, vec![1]).await.unwrap());
        assert!(!store.put_encrypted_key_if_absent(&id, vec![2]).await.unwrap());
        assert_eq!(store.get_encrypted_key(&id).await.unwrap(), Some(vec![1]));
    }
}
