//! Key safe: the device's local secret state, stored as one encrypted blob.
//!
//! The safe is written as JSON with every byte field encoded by
//! [`tagged_base64`](crate::tagged_base64), encrypted with format version 1
//! under the user secret, and base64-encoded. Loading accepts two older
//! layouts: provisional keys stored as a list, and no provisional keys at all.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use trustcore_core::crypto::sizes::SEALED_KEY_SIZE;
use trustcore_core::{DeviceId, Keypair};

use crate::crypto::{EncryptionKey, X25519StaticSecret};
use crate::error::{ProtectError, Result};
use crate::format::v1;
use crate::tagged_base64;

/// Fields that must be present once legacy layouts are migrated.
const MANDATORY_FIELDS: [&str; 6] = [
    "signaturePair",
    "encryptionPair",
    "userSecret",
    "userKeys",
    "encryptedUserKeys",
    "provisionalUserKeys",
];

/// The per-user root secret. Owned by whoever needs it and wiped when dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct UserSecret(EncryptionKey);

impl UserSecret {
    pub fn generate() -> Self {
        Self(EncryptionKey::generate())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(EncryptionKey::from_bytes(bytes))
    }

    /// The secret as a symmetric key.
    pub fn key(&self) -> &EncryptionKey {
        &self.0
    }
}

impl fmt::Debug for UserSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UserSecret([REDACTED])")
    }
}

impl AsRef<[u8]> for UserSecret {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl TryFrom<&[u8]> for UserSecret {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> std::result::Result<Self, Self::Error> {
        EncryptionKey::try_from(slice).map(Self)
    }
}

/// A public/private key pair (signature or encryption).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    #[serde(with = "tagged_base64")]
    pub public_key: [u8; 32],
    #[serde(with = "tagged_base64")]
    pub private_key: [u8; 32],
}

impl KeyPair {
    /// A fresh Ed25519 pair; the private key is the seed.
    pub fn generate_signature() -> Self {
        let keypair = Keypair::generate();
        Self {
            public_key: keypair.public_key().0,
            private_key: keypair.seed(),
        }
    }

    /// A fresh X25519 pair.
    pub fn generate_encryption() -> Self {
        let secret = X25519StaticSecret::generate();
        Self {
            public_key: secret.public_key().0,
            private_key: secret.to_bytes(),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(self.public_key))
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// A user key pair as distributed to this device, still sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedUserKey {
    #[serde(with = "tagged_base64")]
    pub public_user_encryption_key: [u8; 32],
    #[serde(with = "tagged_base64")]
    pub encrypted_private_user_encryption_key: [u8; SEALED_KEY_SIZE],
}

/// Keys of a provisional identity claimed by this user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionalUserKeyPairs {
    pub id: String,
    pub app_encryption_key_pair: KeyPair,
    pub tanker_encryption_key_pair: KeyPair,
}

/// The device's root secret state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySafe {
    #[serde(with = "tagged_base64::option", default)]
    pub device_id: Option<DeviceId>,
    pub signature_pair: KeyPair,
    pub encryption_pair: KeyPair,
    #[serde(with = "tagged_base64")]
    pub user_secret: UserSecret,
    pub user_keys: Vec<KeyPair>,
    pub encrypted_user_keys: Vec<EncryptedUserKey>,
    pub provisional_user_keys: BTreeMap<String, ProvisionalUserKeyPairs>,
}

impl KeySafe {
    /// A new safe for a device that is not registered yet.
    pub fn generate(user_secret: UserSecret) -> Self {
        Self {
            device_id: None,
            signature_pair: KeyPair::generate_signature(),
            encryption_pair: KeyPair::generate_encryption(),
            user_secret,
            user_keys: Vec::new(),
            encrypted_user_keys: Vec::new(),
            provisional_user_keys: BTreeMap::new(),
        }
    }
}

/// Encrypt the safe under its own user secret.
pub fn serialize_key_safe(safe: &KeySafe) -> Result<String> {
    let json =
        serde_json::to_vec(safe).map_err(|e| ProtectError::Serialization(e.to_string()))?;
    seal_json(&json, &safe.user_secret)
}

fn seal_json(json: &[u8], user_secret: &UserSecret) -> Result<String> {
    let encrypted = v1::encrypt(user_secret.key(), json, None)?;
    Ok(STANDARD.encode(encrypted))
}

/// Decrypt a serialized safe, migrating older layouts.
pub fn deserialize_key_safe(serialized: &str, user_secret: &UserSecret) -> Result<KeySafe> {
    let encrypted = STANDARD
        .decode(serialized)
        .map_err(|e| ProtectError::Integrity(format!("key safe is not base64: {}", e)))?;
    let json = v1::decrypt(user_secret.key(), &encrypted, None)
        .map_err(|_| ProtectError::Integrity("key safe does not decrypt".into()))?;
    let mut value: Value = serde_json::from_slice(&json)
        .map_err(|e| ProtectError::Integrity(format!("key safe is not JSON: {}", e)))?;

    let object = value
        .as_object_mut()
        .ok_or_else(|| ProtectError::Integrity("key safe is not an object".into()))?;
    migrate_provisional_user_keys(object)?;

    for field in MANDATORY_FIELDS {
        if object.get(field).map_or(true, Value::is_null) {
            return Err(ProtectError::Integrity(format!(
                "key safe is missing {}",
                field
            )));
        }
    }

    serde_json::from_value(value).map_err(|e| ProtectError::Integrity(e.to_string()))
}

fn migrate_provisional_user_keys(object: &mut Map<String, Value>) -> Result<()> {
    match object.get_mut("provisionalUserKeys") {
        Some(Value::Array(list)) => {
            tracing::debug!(count = list.len(), "migrating provisional user keys from list");
            let mut indexed = Map::with_capacity(list.len());
            for item in list.drain(..) {
                let id = item
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ProtectError::Integrity("provisional user keys without id".into())
                    })?
                    .to_owned();
                indexed.insert(id, item);
            }
            object.insert("provisionalUserKeys".into(), Value::Object(indexed));
        }
        None | Some(Value::Null) => {
            object.insert("provisionalUserKeys".into(), Value::Object(Map::new()));
        }
        Some(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provisional(id: &str) -> ProvisionalUserKeyPairs {
        ProvisionalUserKeyPairs {
            id: id.to_owned(),
            app_encryption_key_pair: KeyPair::generate_encryption(),
            tanker_encryption_key_pair: KeyPair::generate_encryption(),
        }
    }

    fn full_safe() -> KeySafe {
        let mut safe = KeySafe::generate(UserSecret::generate());
        safe.device_id = Some(DeviceId([3; 32]));
        safe.user_keys.push(KeyPair::generate_encryption());
        safe.encrypted_user_keys.push(EncryptedUserKey {
            public_user_encryption_key: [1; 32],
            encrypted_private_user_encryption_key: [2; SEALED_KEY_SIZE],
        });
        for id in ["alice@example.com", "bob@example.com"] {
            safe.provisional_user_keys.insert(id.to_owned(), provisional(id));
        }
        safe
    }

    fn value_of(safe: &KeySafe) -> Value {
        serde_json::to_value(safe).unwrap()
    }

    fn seal_value(value: &Value, secret: &UserSecret) -> String {
        seal_json(&serde_json::to_vec(value).unwrap(), secret).unwrap()
    }

    #[test]
    fn test_roundtrip_fresh_safe() {
        let secret = UserSecret::generate();
        let safe = KeySafe::generate(secret.clone());
        let serialized = serialize_key_safe(&safe).unwrap();
        assert_eq!(deserialize_key_safe(&serialized, &secret).unwrap(), safe);
    }

    #[test]
    fn test_byte_fields_are_tagged() {
        let safe = full_safe();
        let value = value_of(&safe);
        let secret = value["userSecret"].as_str().unwrap();
        assert!(secret.starts_with(tagged_base64::PREFIX));
        assert!(value["deviceId"]
            .as_str()
            .unwrap()
            .starts_with(tagged_base64::PREFIX));
        assert!(value["signaturePair"]["privateKey"]
            .as_str()
            .unwrap()
            .starts_with(tagged_base64::PREFIX));
    }

    #[test]
    fn test_wrong_secret_is_integrity_error() {
        let safe = full_safe();
        let serialized = serialize_key_safe(&safe).unwrap();
        assert!(matches!(
            deserialize_key_safe(&serialized, &UserSecret::generate()),
            Err(ProtectError::Integrity(_))
        ));
        assert!(matches!(
            deserialize_key_safe("not base64!", &safe.user_secret),
            Err(ProtectError::Integrity(_))
        ));
    }

    #[test]
    fn test_migrates_provisional_key_list() {
        let safe = full_safe();
        let mut value = value_of(&safe);
        let list: Vec<Value> = safe
            .provisional_user_keys
            .values()
            .map(|keys| serde_json::to_value(keys).unwrap())
            .collect();
        value["provisionalUserKeys"] = Value::Array(list);

        let serialized = seal_value(&value, &safe.user_secret);
        let loaded = deserialize_key_safe(&serialized, &safe.user_secret).unwrap();
        assert_eq!(loaded.provisional_user_keys, safe.provisional_user_keys);
        assert_eq!(loaded, safe);
    }

    #[test]
    fn test_missing_provisional_keys_default_to_empty() {
        let safe = full_safe();
        let mut value = value_of(&safe);
        value.as_object_mut().unwrap().remove("provisionalUserKeys");

        let serialized = seal_value(&value, &safe.user_secret);
        let loaded = deserialize_key_safe(&serialized, &safe.user_secret).unwrap();
        assert!(loaded.provisional_user_keys.is_empty());
        assert_eq!(loaded.user_keys, safe.user_keys);
    }

    #[test]
    fn test_missing_mandatory_field_rejected() {
        let safe = full_safe();
        for field in ["signaturePair", "userKeys", "encryptedUserKeys"] {
            let mut value = value_of(&safe);
            value.as_object_mut().unwrap().remove(field);
            let serialized = seal_value(&value, &safe.user_secret);
            let err = deserialize_key_safe(&serialized, &safe.user_secret).unwrap_err();
            assert_eq!(
                err,
                ProtectError::Integrity(format!("key safe is missing {}", field))
            );
        }
    }

    #[test]
    fn test_non_object_rejected() {
        let secret = UserSecret::generate();
        let serialized = seal_value(&Value::Array(vec![]), &secret);
        assert_eq!(
            deserialize_key_safe(&serialized, &secret).unwrap_err(),
            ProtectError::Integrity("key safe is not an object".into())
        );
    }
}
