//! Store traits: the abstract interfaces the verifier and the resource key
//! store persist through.
//!
//! The verifier is storage-agnostic. Implementations include an in-memory
//! store (every trait) and SQLite (trust chain key and resource keys).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use trustcore_core::{
    DeviceCreationEntry, DeviceId, Ed25519PublicKey, User, UserEntry, UserId,
};
use trustcore_protect::ResourceId;

use crate::error::Result;

/// Entries received from the log but not verified yet.
///
/// # Design Notes
///
/// - **Keyed by hash**: adding an entry twice keeps one copy.
/// - **Ordered reads**: lookups return entries by increasing index, which is
///   the order they must be folded in.
#[async_trait]
pub trait UnverifiedStore: Send + Sync {
    /// Record entries awaiting verification.
    async fn add_unverified_user_entries(&self, entries: &[UserEntry]) -> Result<()>;

    /// Pending entries of the given users, ordered by index.
    ///
    /// With `before_index`, only entries with a strictly lower index are
    /// returned.
    async fn find_unverified_user_entries(
        &self,
        user_ids: &[UserId],
        before_index: Option<u64>,
    ) -> Result<Vec<UserEntry>>;

    /// Pending creations of the given devices, ordered by index.
    async fn find_unverified_devices_by_hash(
        &self,
        device_ids: &[DeviceId],
    ) -> Result<Vec<DeviceCreationEntry>>;

    /// Drop entries that were verified or rejected. Unknown entries are ignored.
    async fn remove_verified_user_entries(&self, entries: &[UserEntry]) -> Result<()>;
}

/// Verified users and their devices.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, user_id: &UserId) -> Result<Option<User>>;

    /// Verified devices among `device_ids`. Unknown ids are absent from the map.
    async fn find_devices(
        &self,
        device_ids: &[DeviceId],
    ) -> Result<HashMap<DeviceId, trustcore_core::Device>>;

    /// Fold a verified entry into its user and persist the result.
    async fn apply_entry(&self, entry: &UserEntry) -> Result<User>;

    /// Fold several verified entries, in order.
    async fn apply_entries(&self, entries: &[UserEntry]) -> Result<Vec<User>> {
        let mut users = Vec::with_capacity(entries.len());
        for entry in entries {
            users.push(self.apply_entry(entry).await?);
        }
        Ok(users)
    }
}

/// The root key of the trust chain.
#[async_trait]
pub trait TrustchainStore: Send + Sync {
    /// `None` until the trust chain creation has been verified.
    async fn trustchain_public_key(&self) -> Result<Option<Ed25519PublicKey>>;

    async fn set_trustchain_public_key(&self, key: &Ed25519PublicKey) -> Result<()>;
}

/// Raw rows of encrypted resource keys.
///
/// Rows are immutable once written. See [`crate::ResourceStore`] for the
/// encrypting layer on top.
#[async_trait]
pub trait ResourceKeyBackend: Send + Sync {
    async fn get_encrypted_key(&self, resource_id: &ResourceId) -> Result<Option<Vec<u8>>>;

    /// Insert a row unless one exists for `resource_id`.
    ///
    /// Returns `true` if the row was inserted.
    async fn put_encrypted_key_if_absent(
        &self,
        resource_id: &ResourceId,
        encrypted_key: Vec<u8>,
    ) -> Result<bool>;
}

#[async_trait]
impl<T: UnverifiedStore + ?Sized> UnverifiedStore for Arc<T> {
    async fn add_unverified_user_entries(&self, entries: &[UserEntry]) -> Result<()> {
        (**self).add_unverified_user_entries(entries).await
    }

    async fn find_unverified_user_entries(
        &self,
        user_ids: &[UserId],
        before_index: Option<u64>,
    ) -> Result<Vec<UserEntry>> {
        (**self)
            .find_unverified_user_entries(user_ids, before_index)
            .await
    }

    async fn find_unverified_devices_by_hash(
        &self,
        device_ids: &[DeviceId],
    ) -> Result<Vec<DeviceCreationEntry>> {
        (**self).find_unverified_devices_by_hash(device_ids).await
    }

    async fn remove_verified_user_entries(&self, entries: &[UserEntry]) -> Result<()> {
        (**self).remove_verified_user_entries(entries).await
    }
}

#[async_trait]
impl<T: UserStore + ?Sized> UserStore for Arc<T> {
    async fn find_user(&self, user_id: &UserId) -> Result<Option<User>> {
        (**self).find_user(user_id).await
    }

    async fn find_devices(
        &self,
        device_ids: &[DeviceId],
    ) -> Result<HashMap<DeviceId, trustcore_core::Device>> {
        (**self).find_devices(device_ids).await
    }

    async fn apply_entry(&self, entry: &UserEntry) -> Result<User> {
        (**self).apply_entry(entry).await
    }

    async fn apply_entries(&self, entries: &[UserEntry]) -> Result<Vec<User>> {
        (**self).apply_entries(entries).await
    }
}

#[async_trait]
impl<T: TrustchainStore + ?Sized> TrustchainStore for Arc<T> {
    async fn trustchain_public_key(&self) -> Result<Option<Ed25519PublicKey>> {
        (**self).trustchain_public_key().await
    }

    async fn set_trustchain_public_key(&self, key: &Ed25519PublicKey) -> Result<()> {
        (**self).set_trustchain_public_key(key).await
    }
}

#[async_trait]
impl<T: ResourceKeyBackend + ?Sized> ResourceKeyBackend for Arc<T> {
    async fn get_encrypted_key(&self, resource_id: &ResourceId) -> Result<Option<Vec<u8>>> {
        (**self).get_encrypted_key(resource_id).await
    }

    async fn put_encrypted_key_if_absent(
        &self,
        resource_id: &ResourceId,
        encrypted_key: Vec<u8>,
    ) -> Result<bool> {
        (**self)
            .put_encrypted_key_if_absent(resource_id, encrypted_key)
            .await
    }
}
