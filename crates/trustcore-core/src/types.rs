//! Strong type definitions for trustcore.
//!
//! All identifiers are 32-byte newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Convert to hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from hex string.
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let bytes = hex::decode(s)?;
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(arr))
            }

            /// The all-zero id.
            pub const ZERO: Self = Self([0u8; 32]);
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), &self.to_hex()[..16])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", &self.to_hex()[..16])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = std::array::TryFromSliceError;

            fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
                let arr: [u8; 32] = slice.try_into()?;
                Ok(Self(arr))
            }
        }
    };
}

id_type! {
    /// Identifier of a trust chain: the hash of its root entry.
    TrustchainId
}

id_type! {
    /// Identifier of a user (a hash of the application user id).
    UserId
}

id_type! {
    /// Identifier of a device: the hash of its creation entry.
    ///
    /// Also used as the `author` field of entries. Root-authored entries carry
    /// the trustchain id there, the root entry itself carries zero.
    DeviceId
}

impl DeviceId {
    /// Whether this author field designates the trust chain root.
    pub fn is_trustchain(&self, trustchain_id: &TrustchainId) -> bool {
        self.0 == trustchain_id.0
    }
}

impl From<TrustchainId> for DeviceId {
    fn from(id: TrustchainId) -> Self {
        Self(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_hex_roundtrip() {
        let id = UserId::from_bytes([0x42; 32]);
        let recovered = UserId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        assert!(DeviceId::from_hex("abcd").is_err());
    }

    #[test]
    fn test_display_and_debug() {
        let id = DeviceId::from_bytes([0xab; 32]);
        assert_eq!(format!("{}", id), "abababababababab");
        assert!(format!("{:?}", id).starts_with("DeviceId("));
    }

    #[test]
    fn test_trustchain_author() {
        let trustchain_id = TrustchainId::from_bytes([0x01; 32]);
        assert!(DeviceId::from(trustchain_id).is_trustchain(&trustchain_id));
        assert!(!DeviceId::from_bytes([0x02; 32]).is_trustchain(&trustchain_id));
    }
}
