//! Versioned encryption formats.
//!
//! Every encrypted payload starts with a varint version. Versions 1, 2, 3 and
//! 5 encrypt a whole buffer at once; version 4 is the chunked streaming
//! format. [`EncryptionFormat`] gives them one interface.

use trustcore_core::varint;

use crate::crypto::{EncryptionKey, IV_SIZE, MAC_SIZE};
use crate::error::{ProtectError, Result};
use crate::resource::{ResourceId, RESOURCE_ID_SIZE};

pub mod v1;
pub mod v2;
pub mod v3;
pub mod v4;
pub mod v5;

/// Largest clear payload encrypted with a whole-buffer format.
pub const MAX_SIMPLE_RESOURCE_SIZE: usize = 5 * 1024 * 1024;

/// Prefix length that always suffices to identify the format and resource id
/// of any well-formed payload.
pub const SAFE_EXTRACTION_LENGTH: usize = 1 + MAC_SIZE + IV_SIZE + MAX_SIMPLE_RESOURCE_SIZE;

/// One of the known wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncryptionFormat {
    V1,
    V2,
    V3,
    V4,
    V5,
}

/// Format metadata needed to compute sizes without decrypting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionFormatDescription {
    pub version: u8,
    /// Only meaningful for the streaming format.
    pub encrypted_chunk_size: Option<u32>,
}

impl EncryptionFormat {
    /// All formats, oldest first.
    pub const ALL: [EncryptionFormat; 5] = [Self::V1, Self::V2, Self::V3, Self::V4, Self::V5];

    pub fn from_version(version: u64) -> Result<Self> {
        match version {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            3 => Ok(Self::V3),
            4 => Ok(Self::V4),
            5 => Ok(Self::V5),
            other => Err(ProtectError::InvalidArgument(format!(
                "unhandled format version {}",
                other
            ))),
        }
    }

    pub fn version(self) -> u8 {
        match self {
            Self::V1 => v1::VERSION,
            Self::V2 => v2::VERSION,
            Self::V3 => v3::VERSION,
            Self::V4 => v4::VERSION,
            Self::V5 => v5::VERSION,
        }
    }

    /// Bytes added by the format. For version 4, per chunk.
    pub fn overhead(self) -> usize {
        match self {
            Self::V1 => v1::OVERHEAD,
            Self::V2 => v2::OVERHEAD,
            Self::V3 => v3::OVERHEAD,
            Self::V4 => v4::OVERHEAD,
            Self::V5 => v5::OVERHEAD,
        }
    }

    /// Encrypt `clear`. Versions 1 to 3 derive the resource id from the mac
    /// and ignore `resource_id`; version 4 uses the default chunk size.
    pub fn encrypt(
        self,
        key: &EncryptionKey,
        resource_id: &ResourceId,
        clear: &[u8],
    ) -> Result<Vec<u8>> {
        match self {
            Self::V1 => v1::encrypt(key, clear, None),
            Self::V2 => v2::encrypt(key, clear),
            Self::V3 => v3::encrypt(key, clear),
            Self::V4 => v4::encrypt(key, resource_id, clear, v4::DEFAULT_MAX_ENCRYPTED_CHUNK_SIZE),
            Self::V5 => v5::encrypt(key, resource_id, clear),
        }
    }

    pub fn decrypt(self, key: &EncryptionKey, encrypted: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::V1 => v1::decrypt(key, encrypted, None),
            Self::V2 => v2::decrypt(key, encrypted),
            Self::V3 => v3::decrypt(key, encrypted),
            Self::V4 => v4::decrypt(key, encrypted),
            Self::V5 => v5::decrypt(key, encrypted),
        }
    }

    pub fn extract_resource_id(self, encrypted: &[u8]) -> Result<ResourceId> {
        match self {
            Self::V1 => v1::extract_resource_id(encrypted),
            Self::V2 => v2::extract_resource_id(encrypted),
            Self::V3 => v3::extract_resource_id(encrypted),
            Self::V4 => v4::extract_resource_id(encrypted),
            Self::V5 => v5::extract_resource_id(encrypted),
        }
    }

    /// Clear length for an encrypted length. `encrypted_chunk_size` is used by
    /// version 4 only and defaults to the format default.
    pub fn get_clear_size(self, encrypted_size: u64, encrypted_chunk_size: Option<u32>) -> Result<u64> {
        match self {
            Self::V1 => v1::get_clear_size(encrypted_size),
            Self::V2 => v2::get_clear_size(encrypted_size),
            Self::V3 => v3::get_clear_size(encrypted_size),
            Self::V4 => v4::get_clear_size(
                encrypted_size,
                encrypted_chunk_size.unwrap_or(v4::DEFAULT_MAX_ENCRYPTED_CHUNK_SIZE),
            ),
            Self::V5 => v5::get_clear_size(encrypted_size),
        }
    }

    pub fn get_encrypted_size(self, clear_size: u64, encrypted_chunk_size: Option<u32>) -> Result<u64> {
        match self {
            Self::V1 => v1::get_encrypted_size(clear_size),
            Self::V2 => v2::get_encrypted_size(clear_size),
            Self::V3 => v3::get_encrypted_size(clear_size),
            Self::V4 => v4::get_encrypted_size(
                clear_size,
                encrypted_chunk_size.unwrap_or(v4::DEFAULT_MAX_ENCRYPTED_CHUNK_SIZE),
            ),
            Self::V5 => v5::get_encrypted_size(clear_size),
        }
    }

    pub fn description(self) -> EncryptionFormatDescription {
        EncryptionFormatDescription {
            version: self.version(),
            encrypted_chunk_size: match self {
                Self::V4 => Some(v4::DEFAULT_MAX_ENCRYPTED_CHUNK_SIZE),
                _ => None,
            },
        }
    }
}

/// Identify the format of an encrypted payload from its leading version.
///
/// Fails with `InvalidArgument` for unknown versions and for input shorter
/// than the format's overhead.
pub fn extract_encryption_format(encrypted: &[u8]) -> Result<EncryptionFormat> {
    let (version, _) = varint::decode(encrypted)
        .ok_or_else(|| ProtectError::InvalidArgument("missing format version".into()))?;
    let format = EncryptionFormat::from_version(version)?;
    check_min_len(encrypted, format.overhead(), format.version())?;
    Ok(format)
}

/// Decrypt any supported format.
pub fn decrypt(key: &EncryptionKey, encrypted: &[u8]) -> Result<Vec<u8>> {
    extract_encryption_format(encrypted)?.decrypt(key, encrypted)
}

/// Resource id of any supported format.
pub fn extract_resource_id(encrypted: &[u8]) -> Result<ResourceId> {
    extract_encryption_format(encrypted)?.extract_resource_id(encrypted)
}

pub fn get_clear_size(description: &EncryptionFormatDescription, encrypted_size: u64) -> Result<u64> {
    EncryptionFormat::from_version(u64::from(description.version))?
        .get_clear_size(encrypted_size, description.encrypted_chunk_size)
}

pub fn get_encrypted_size(description: &EncryptionFormatDescription, clear_size: u64) -> Result<u64> {
    EncryptionFormat::from_version(u64::from(description.version))?
        .get_encrypted_size(clear_size, description.encrypted_chunk_size)
}

/// Default format for non-streamed shared resources.
pub fn simple_encryption() -> EncryptionFormat {
    EncryptionFormat::V3
}

/// Format for a resource whose id is chosen before encryption.
pub fn simple_encryption_with_fixed_resource_id() -> EncryptionFormat {
    EncryptionFormat::V5
}

pub fn stream_encryption_format_description() -> EncryptionFormatDescription {
    EncryptionFormat::V4.description()
}

pub(crate) fn check_min_len(encrypted: &[u8], overhead: usize, version: u8) -> Result<()> {
    if encrypted.len() < overhead {
        return Err(ProtectError::InvalidArgument(format!(
            "truncated encrypted data: {} bytes, version {} needs at least {}",
            encrypted.len(),
            version,
            overhead
        )));
    }
    Ok(())
}

pub(crate) fn sub_overhead(encrypted_size: u64, overhead: u64, version: u8) -> Result<u64> {
    encrypted_size.checked_sub(overhead).ok_or_else(|| {
        ProtectError::InvalidArgument(format!(
            "{} bytes is shorter than the version {} overhead",
            encrypted_size, version
        ))
    })
}

pub(crate) fn add_overhead(clear_size: u64, overhead: u64, version: u8) -> Result<u64> {
    clear_size.checked_add(overhead).ok_or_else(|| size_overflow(clear_size, version))
}

pub(crate) fn size_overflow(clear_size: u64, version: u8) -> ProtectError {
    ProtectError::InvalidArgument(format!(
        "{} clear bytes overflow the version {} encrypted size",
        clear_size, version
    ))
}

/// The mac at the end of `bytes`, used as resource id by versions 1 to 3.
pub(crate) fn mac_resource_id(bytes: &[u8]) -> ResourceId {
    let mut id = [0u8; RESOURCE_ID_SIZE];
    id.copy_from_slice(&bytes[bytes.len() - MAC_SIZE..]);
    ResourceId(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::make_resource;

    #[test]
    fn test_roundtrip_every_format() {
        let resource = make_resource();
        for format in EncryptionFormat::ALL {
            for len in [0usize, 1, 100, 4096] {
                let clear = vec![0x61u8; len];
                let encrypted = format
                    .encrypt(&resource.key, &resource.resource_id, &clear)
                    .unwrap();
                assert_eq!(extract_encryption_format(&encrypted).unwrap(), format);
                assert_eq!(decrypt(&resource.key, &encrypted).unwrap(), clear);
                assert_eq!(
                    format
                        .get_clear_size(encrypted.len() as u64, None)
                        .unwrap(),
                    len as u64
                );
            }
        }
    }

    #[test]
    fn test_resource_id_per_format() {
        let resource = make_resource();
        for format in [EncryptionFormat::V4, EncryptionFormat::V5] {
            let encrypted = format
                .encrypt(&resource.key, &resource.resource_id, b"x")
                .unwrap();
            assert_eq!(extract_resource_id(&encrypted).unwrap(), resource.resource_id);
        }
        let v3 = simple_encryption()
            .encrypt(&resource.key, &resource.resource_id, b"x")
            .unwrap();
        assert_eq!(
            extract_resource_id(&v3).unwrap().as_bytes(),
            &v3[v3.len() - MAC_SIZE..]
        );
    }

    #[test]
    fn test_unknown_version_rejected() {
        for version in [0u8, 6, 0x7f] {
            let mut bytes = vec![version];
            bytes.extend_from_slice(&[0u8; 64]);
            assert!(matches!(
                extract_encryption_format(&bytes),
                Err(ProtectError::InvalidArgument(_))
            ));
        }
        assert!(extract_encryption_format(&[]).is_err());
    }

    #[test]
    fn test_short_input_rejected() {
        let mut bytes = vec![5u8];
        bytes.extend_from_slice(&[0u8; v5::OVERHEAD - 2]);
        assert!(matches!(
            extract_encryption_format(&bytes),
            Err(ProtectError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_get_clear_size_names_unknown_version() {
        let description = EncryptionFormatDescription {
            version: 9,
            encrypted_chunk_size: None,
        };
        let err = get_clear_size(&description, 100).unwrap_err();
        assert!(err.to_string().contains('9'));
    }

    #[test]
    fn test_safe_extraction_length_covers_simple_headers() {
        assert!(SAFE_EXTRACTION_LENGTH >= MAX_SIMPLE_RESOURCE_SIZE + v5::OVERHEAD - MAC_SIZE);
        assert_eq!(stream_encryption_format_description().version, 4);
        assert_eq!(simple_encryption_with_fixed_resource_id(), EncryptionFormat::V5);
        assert_eq!(SAFE_EXTRACTION_LENGTH, 1 + 16 + 24 + 5 * 1024 * 1024);
    }

    #[test]
    fn test_encrypted_size_overflow_rejected() {
        for format in EncryptionFormat::ALL {
            assert!(matches!(
                format.get_encrypted_size(u64::MAX, Some(62)),
                Err(ProtectError::InvalidArgument(_))
            ));
        }
        assert!(matches!(
            get_encrypted_size(&stream_encryption_format_description(), u64::MAX - 10),
            Err(ProtectError::InvalidArgument(_))
        ));
        assert_eq!(
            EncryptionFormat::V3.get_encrypted_size(10, None).unwrap(),
            10 + v3::OVERHEAD as u64
        );
    }
}
