//! Entries: decoded, typed views of trust chain blocks.
//!
//! Each nature has a fixed-layout payload record. Field lengths are carried by
//! the `[u8; N]` types, so a record with a wrong-sized field cannot be built;
//! a byte string with a wrong size is rejected at decode time with the name
//! of the offending field.

use crate::crypto::sizes::{SEALED_KEY_PAIR_SIZE, SEALED_KEY_SIZE};
use crate::crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, X25519PublicKey};
use crate::error::CoreError;
use crate::types::{DeviceId, UserId};
use crate::varint::{self, Reader};

/// The kind of an entry, selecting how its payload is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum Nature {
    /// Root of the chain, carries the root signature key.
    TrustchainCreation = 1,
    /// Registers a device for a user.
    DeviceCreation = 7,
    /// Revokes a device and rotates the user key.
    DeviceRevocation = 13,
    /// Attaches a provisional identity to a user.
    ProvisionalIdentityClaim = 15,
}

impl Nature {
    /// Convert to u64 for serialization.
    pub fn to_u64(self) -> u64 {
        self as u64
    }

    /// Parse a wire tag. Unknown tags are a decode error.
    pub fn from_u64(value: u64) -> Result<Self, CoreError> {
        match value {
            1 => Ok(Self::TrustchainCreation),
            7 => Ok(Self::DeviceCreation),
            13 => Ok(Self::DeviceRevocation),
            15 => Ok(Self::ProvisionalIdentityClaim),
            other => Err(CoreError::UnknownNature(other)),
        }
    }
}

/// A payload record with a fixed nature and binary layout.
pub trait Record: Sized {
    const NATURE: Nature;

    /// Serialize to the payload bytes of a block.
    fn to_bytes(&self) -> Vec<u8>;

    /// Parse payload bytes. The whole input must be consumed.
    fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError>;

    /// Extract this record from a decoded payload, or hand the payload back.
    fn from_payload(payload: Payload) -> Result<Self, Payload>;
}

/// Payload of the root entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustchainCreationRecord {
    pub public_signature_key: Ed25519PublicKey,
}

impl Record for TrustchainCreationRecord {
    const NATURE: Nature = Nature::TrustchainCreation;

    fn to_bytes(&self) -> Vec<u8> {
        self.public_signature_key.0.to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        let mut r = Reader::new(bytes);
        let public_signature_key = Ed25519PublicKey(r.array("public_signature_key")?);
        r.finish("trustchain creation")?;
        Ok(Self {
            public_signature_key,
        })
    }

    fn from_payload(payload: Payload) -> Result<Self, Payload> {
        match payload {
            Payload::TrustchainCreation(record) => Ok(record),
            other => Err(other),
        }
    }
}

/// The user key as carried by a device creation: the public half and the
/// private half sealed for the new device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserKeyPair {
    pub public_encryption_key: X25519PublicKey,
    pub sealed_private_encryption_key: [u8; SEALED_KEY_SIZE],
}

/// Payload of a device creation entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCreationRecord {
    pub ephemeral_public_signature_key: Ed25519PublicKey,
    pub user_id: UserId,
    /// Signature of `ephemeral_public_signature_key ‖ user_id` by the author.
    pub delegation_signature: Ed25519Signature,
    pub public_signature_key: Ed25519PublicKey,
    pub public_encryption_key: X25519PublicKey,
    pub user_key_pair: UserKeyPair,
    pub is_ghost_device: bool,
}

impl DeviceCreationRecord {
    /// The message covered by the delegation signature.
    pub fn delegation_message(&self) -> Vec<u8> {
        delegation_message(&self.ephemeral_public_signature_key, &self.user_id)
    }
}

/// Build the delegation message for an ephemeral key and a user.
pub fn delegation_message(ephemeral_key: &Ed25519PublicKey, user_id: &UserId) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(ephemeral_key.as_bytes());
    buf.extend_from_slice(user_id.as_bytes());
    buf
}

impl Record for DeviceCreationRecord {
    const NATURE: Nature = Nature::DeviceCreation;

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 * 6 + 64 + SEALED_KEY_SIZE + 1);
        buf.extend_from_slice(self.ephemeral_public_signature_key.as_bytes());
        buf.extend_from_slice(self.user_id.as_bytes());
        buf.extend_from_slice(self.delegation_signature.as_bytes());
        buf.extend_from_slice(self.public_signature_key.as_bytes());
        buf.extend_from_slice(self.public_encryption_key.as_bytes());
        buf.extend_from_slice(self.user_key_pair.public_encryption_key.as_bytes());
        buf.extend_from_slice(&self.user_key_pair.sealed_private_encryption_key);
        buf.push(u8::from(self.is_ghost_device));
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        let mut r = Reader::new(bytes);
        let record = Self {
            ephemeral_public_signature_key: Ed25519PublicKey(
                r.array("ephemeral_public_signature_key")?,
            ),
            user_id: UserId(r.array("user_id")?),
            delegation_signature: Ed25519Signature(r.array("delegation_signature")?),
            public_signature_key: Ed25519PublicKey(r.array("public_signature_key")?),
            public_encryption_key: X25519PublicKey(r.array("public_encryption_key")?),
            user_key_pair: UserKeyPair {
                public_encryption_key: X25519PublicKey(r.array("user_public_encryption_key")?),
                sealed_private_encryption_key: r.array("sealed_private_user_key")?,
            },
            is_ghost_device: match r.byte("is_ghost_device")? {
                0 => false,
                1 => true,
                _ => {
                    return Err(CoreError::InvalidVarint {
                        field: "is_ghost_device",
                    })
                }
            },
        };
        r.finish("device creation")?;
        Ok(record)
    }

    fn from_payload(payload: Payload) -> Result<Self, Payload> {
        match payload {
            Payload::DeviceCreation(record) => Ok(record),
            other => Err(other),
        }
    }
}

/// The new user private key sealed for one of the remaining devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedKeyForDevice {
    pub recipient: DeviceId,
    pub sealed_private_key: [u8; SEALED_KEY_SIZE],
}

/// Payload of a device revocation entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRevocationRecord {
    pub device_id: DeviceId,
    /// New user public key.
    pub public_encryption_key: X25519PublicKey,
    /// User public key being replaced; must be the user's current key.
    pub previous_public_encryption_key: X25519PublicKey,
    /// Previous user private key sealed with the new user public key.
    pub sealed_previous_private_key: [u8; SEALED_KEY_SIZE],
    pub sealed_keys_for_devices: Vec<SealedKeyForDevice>,
}

impl Record for DeviceRevocationRecord {
    const NATURE: Nature = Nature::DeviceRevocation;

    fn to_bytes(&self) -> Vec<u8> {
        let n = self.sealed_keys_for_devices.len();
        let mut buf = Vec::with_capacity(96 + SEALED_KEY_SIZE + 10 + n * (32 + SEALED_KEY_SIZE));
        buf.extend_from_slice(self.device_id.as_bytes());
        buf.extend_from_slice(self.public_encryption_key.as_bytes());
        buf.extend_from_slice(self.previous_public_encryption_key.as_bytes());
        buf.extend_from_slice(&self.sealed_previous_private_key);
        varint::encode_to(&mut buf, n as u64);
        for key in &self.sealed_keys_for_devices {
            buf.extend_from_slice(key.recipient.as_bytes());
            buf.extend_from_slice(&key.sealed_private_key);
        }
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        let mut r = Reader::new(bytes);
        let device_id = DeviceId(r.array("device_id")?);
        let public_encryption_key = X25519PublicKey(r.array("public_encryption_key")?);
        let previous_public_encryption_key =
            X25519PublicKey(r.array("previous_public_encryption_key")?);
        let sealed_previous_private_key = r.array("sealed_previous_private_key")?;

        let count = r.varint("sealed_keys_count")?;
        // Each element takes at least this many bytes, which bounds the
        // allocation below by the input size.
        let element_len = (32 + SEALED_KEY_SIZE) as u64;
        if count.saturating_mul(element_len) > r.remaining() as u64 {
            return Err(CoreError::Truncated {
                field: "sealed_keys_for_devices",
            });
        }
        let mut sealed_keys_for_devices = Vec::with_capacity(count as usize);
        for _ in 0..count {
            sealed_keys_for_devices.push(SealedKeyForDevice {
                recipient: DeviceId(r.array("recipient")?),
                sealed_private_key: r.array("sealed_private_key")?,
            });
        }
        r.finish("device revocation")?;

        Ok(Self {
            device_id,
            public_encryption_key,
            previous_public_encryption_key,
            sealed_previous_private_key,
            sealed_keys_for_devices,
        })
    }

    fn from_payload(payload: Payload) -> Result<Self, Payload> {
        match payload {
            Payload::DeviceRevocation(record) => Ok(record),
            other => Err(other),
        }
    }
}

/// Payload of a provisional identity claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionalIdentityClaimRecord {
    pub user_id: UserId,
    pub app_signature_public_key: Ed25519PublicKey,
    pub tanker_signature_public_key: Ed25519PublicKey,
    pub author_signature_by_app_key: Ed25519Signature,
    pub author_signature_by_tanker_key: Ed25519Signature,
    pub recipient_user_public_key: X25519PublicKey,
    pub sealed_private_keys: [u8; SEALED_KEY_PAIR_SIZE],
}

impl ProvisionalIdentityClaimRecord {
    /// The message signed by both provisional identity keys:
    /// `author ‖ app key ‖ tanker key`.
    pub fn multi_signed_message(&self, author: &DeviceId) -> Vec<u8> {
        claim_message(
            author,
            &self.app_signature_public_key,
            &self.tanker_signature_public_key,
        )
    }
}

/// Build the message signed by both provisional identity keys.
pub fn claim_message(
    author: &DeviceId,
    app_key: &Ed25519PublicKey,
    tanker_key: &Ed25519PublicKey,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(96);
    buf.extend_from_slice(author.as_bytes());
    buf.extend_from_slice(app_key.as_bytes());
    buf.extend_from_slice(tanker_key.as_bytes());
    buf
}

impl Record for ProvisionalIdentityClaimRecord {
    const NATURE: Nature = Nature::ProvisionalIdentityClaim;

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 * 4 + 64 * 2 + SEALED_KEY_PAIR_SIZE);
        buf.extend_from_slice(self.user_id.as_bytes());
        buf.extend_from_slice(self.app_signature_public_key.as_bytes());
        buf.extend_from_slice(self.tanker_signature_public_key.as_bytes());
        buf.extend_from_slice(self.author_signature_by_app_key.as_bytes());
        buf.extend_from_slice(self.author_signature_by_tanker_key.as_bytes());
        buf.extend_from_slice(self.recipient_user_public_key.as_bytes());
        buf.extend_from_slice(&self.sealed_private_keys);
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        let mut r = Reader::new(bytes);
        let record = Self {
            user_id: UserId(r.array("user_id")?),
            app_signature_public_key: Ed25519PublicKey(r.array("app_signature_public_key")?),
            tanker_signature_public_key: Ed25519PublicKey(
                r.array("tanker_signature_public_key")?,
            ),
            author_signature_by_app_key: Ed25519Signature(
                r.array("author_signature_by_app_key")?,
            ),
            author_signature_by_tanker_key: Ed25519Signature(
                r.array("author_signature_by_tanker_key")?,
            ),
            recipient_user_public_key: X25519PublicKey(r.array("recipient_user_public_key")?),
            sealed_private_keys: r.array("sealed_private_keys")?,
        };
        r.finish("provisional identity claim")?;
        Ok(record)
    }

    fn from_payload(payload: Payload) -> Result<Self, Payload> {
        match payload {
            Payload::ProvisionalIdentityClaim(record) => Ok(record),
            other => Err(other),
        }
    }
}

/// Any decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    TrustchainCreation(TrustchainCreationRecord),
    DeviceCreation(DeviceCreationRecord),
    DeviceRevocation(DeviceRevocationRecord),
    ProvisionalIdentityClaim(ProvisionalIdentityClaimRecord),
}

impl Payload {
    /// The nature of this payload.
    pub fn nature(&self) -> Nature {
        match self {
            Self::TrustchainCreation(_) => Nature::TrustchainCreation,
            Self::DeviceCreation(_) => Nature::DeviceCreation,
            Self::DeviceRevocation(_) => Nature::DeviceRevocation,
            Self::ProvisionalIdentityClaim(_) => Nature::ProvisionalIdentityClaim,
        }
    }

    /// Decode payload bytes for the given nature.
    pub fn decode(nature: Nature, bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(match nature {
            Nature::TrustchainCreation => {
                Self::TrustchainCreation(TrustchainCreationRecord::from_bytes(bytes)?)
            }
            Nature::DeviceCreation => Self::DeviceCreation(DeviceCreationRecord::from_bytes(bytes)?),
            Nature::DeviceRevocation => {
                Self::DeviceRevocation(DeviceRevocationRecord::from_bytes(bytes)?)
            }
            Nature::ProvisionalIdentityClaim => {
                Self::ProvisionalIdentityClaim(ProvisionalIdentityClaimRecord::from_bytes(bytes)?)
            }
        })
    }
}

/// A decoded entry: the verification fields of a block plus its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<P> {
    /// Position in the global log, strictly increasing.
    pub index: u64,
    pub author: DeviceId,
    pub signature: Ed25519Signature,
    /// Content hash of the block (see [`crate::block::compute_hash`]).
    pub hash: Blake3Hash,
    pub payload: P,
}

impl Entry<Payload> {
    /// Narrow a generic entry to a specific record type.
    pub fn downcast<P: Record>(self) -> Result<Entry<P>, CoreError> {
        let got = self.payload.nature();
        let payload = P::from_payload(self.payload).map_err(|_| CoreError::UnexpectedNature {
            expected: P::NATURE,
            got,
        })?;
        Ok(Entry {
            index: self.index,
            author: self.author,
            signature: self.signature,
            hash: self.hash,
            payload,
        })
    }

    pub fn nature(&self) -> Nature {
        self.payload.nature()
    }
}

impl<P: Record> Entry<P> {
    pub fn nature(&self) -> Nature {
        P::NATURE
    }
}

pub type TrustchainCreationEntry = Entry<TrustchainCreationRecord>;
pub type DeviceCreationEntry = Entry<DeviceCreationRecord>;
pub type DeviceRevocationEntry = Entry<DeviceRevocationRecord>;
pub type ProvisionalIdentityClaimEntry = Entry<ProvisionalIdentityClaimRecord>;

impl DeviceCreationEntry {
    /// The id of the device this entry creates.
    pub fn device_id(&self) -> DeviceId {
        DeviceId(self.hash.0)
    }
}

/// An entry that mutates a user: creation or revocation of one of its devices.
///
/// Revocations do not name their user on the wire; the user id is resolved
/// from the target device when the entry is stored as unverified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEntry {
    DeviceCreation(DeviceCreationEntry),
    DeviceRevocation {
        user_id: UserId,
        entry: DeviceRevocationEntry,
    },
}

impl UserEntry {
    pub fn user_id(&self) -> UserId {
        match self {
            Self::DeviceCreation(entry) => entry.payload.user_id,
            Self::DeviceRevocation { user_id, .. } => *user_id,
        }
    }

    pub fn index(&self) -> u64 {
        match self {
            Self::DeviceCreation(entry) => entry.index,
            Self::DeviceRevocation { entry, .. } => entry.index,
        }
    }

    pub fn hash(&self) -> Blake3Hash {
        match self {
            Self::DeviceCreation(entry) => entry.hash,
            Self::DeviceRevocation { entry, .. } => entry.hash,
        }
    }

    pub fn author(&self) -> DeviceId {
        match self {
            Self::DeviceCreation(entry) => entry.author,
            Self::DeviceRevocation { entry, .. } => entry.author,
        }
    }

    pub fn nature(&self) -> Nature {
        match self {
            Self::DeviceCreation(_) => Nature::DeviceCreation,
            Self::DeviceRevocation { .. } => Nature::DeviceRevocation,
        }
    }
}

impl From<DeviceCreationEntry> for UserEntry {
    fn from(entry: DeviceCreationEntry) -> Self {
        Self::DeviceCreation(entry)
    }
}
