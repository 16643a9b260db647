//! User and device state, rebuilt by folding verified entries in index order.

use crate::crypto::{Ed25519PublicKey, X25519PublicKey};
use crate::entry::UserEntry;
use crate::error::{CoreError, Result};
use crate::types::{DeviceId, UserId};

/// A registered device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub device_id: DeviceId,
    pub user_id: UserId,
    pub public_signature_key: Ed25519PublicKey,
    pub public_encryption_key: X25519PublicKey,
    /// Index of the creation entry.
    pub created_at: u64,
    /// Index of the revocation entry, if any.
    pub revoked_at: Option<u64>,
    pub is_ghost_device: bool,
}

impl Device {
    /// Whether this device may author an entry at `index`.
    pub fn is_valid_at(&self, index: u64) -> bool {
        match self.revoked_at {
            None => true,
            Some(revoked_at) => revoked_at > index,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// A user public encryption key and the index it took effect at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserPublicKey {
    pub public_encryption_key: X25519PublicKey,
    pub index: u64,
}

/// A user and all of its devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: UserId,
    pub devices: Vec<Device>,
    /// Every user key, oldest first. The last one is current.
    pub user_public_keys: Vec<UserPublicKey>,
}

impl User {
    /// Look up a device of this user.
    pub fn device(&self, device_id: &DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| d.device_id == *device_id)
    }

    /// The current user public encryption key.
    pub fn current_public_key(&self) -> Option<&X25519PublicKey> {
        self.user_public_keys
            .last()
            .map(|key| &key.public_encryption_key)
    }

    /// Devices that are not revoked.
    pub fn active_devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| !d.is_revoked())
    }

    /// Fold one verified entry into the user state.
    ///
    /// Verification has already accepted the entry, so every failure here is
    /// an invariant violation.
    pub fn apply(user: Option<User>, entry: &UserEntry) -> Result<User> {
        match entry {
            UserEntry::DeviceCreation(creation) => {
                let record = &creation.payload;
                let device = Device {
                    device_id: creation.device_id(),
                    user_id: record.user_id,
                    public_signature_key: record.public_signature_key,
                    public_encryption_key: record.public_encryption_key,
                    created_at: creation.index,
                    revoked_at: None,
                    is_ghost_device: record.is_ghost_device,
                };

                match user {
                    None => Ok(User {
                        user_id: record.user_id,
                        devices: vec![device],
                        user_public_keys: vec![UserPublicKey {
                            public_encryption_key: record.user_key_pair.public_encryption_key,
                            index: creation.index,
                        }],
                    }),
                    Some(mut user) => {
                        if user.user_id != record.user_id {
                            return Err(CoreError::Invariant(format!(
                                "device creation for {} applied to {}",
                                record.user_id, user.user_id
                            )));
                        }
                        if user.device(&device.device_id).is_some() {
                            return Err(CoreError::Invariant(format!(
                                "device {} applied twice",
                                device.device_id
                            )));
                        }
                        user.devices.push(device);
                        Ok(user)
                    }
                }
            }
            UserEntry::DeviceRevocation { user_id, entry } => {
                let mut user = user.ok_or_else(|| {
                    CoreError::Invariant(format!("revocation for unknown user {}", user_id))
                })?;
                let record = &entry.payload;
                let device = user
                    .devices
                    .iter_mut()
                    .find(|d| d.device_id == record.device_id)
                    .ok_or_else(|| {
                        CoreError::Invariant(format!(
                            "revocation of unknown device {}",
                            record.device_id
                        ))
                    })?;
                device.revoked_at = Some(entry.index);
                user.user_public_keys.push(UserPublicKey {
                    public_encryption_key: record.public_encryption_key,
                    index: entry.index,
                });
                Ok(user)
            }
        }
    }
}
