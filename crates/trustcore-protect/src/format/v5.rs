//! Version 5: `5 ‖ resource_id ‖ iv ‖ ciphertext ‖ mac`.
//!
//! The resource id is chosen before encryption and bound as associated data,
//! so a key can be reused under a pinned id across re-encryptions.

use crate::crypto::{decrypt_aead, encrypt_aead, random_iv, EncryptionKey, IV_SIZE, MAC_SIZE};
use crate::error::Result;
use crate::resource::{ResourceId, RESOURCE_ID_SIZE};

use super::{add_overhead, check_min_len, sub_overhead};

pub const VERSION: u8 = 5;
pub const OVERHEAD: usize = 1 + RESOURCE_ID_SIZE + IV_SIZE + MAC_SIZE;

pub fn get_clear_size(encrypted_size: u64) -> Result<u64> {
    sub_overhead(encrypted_size, OVERHEAD as u64, VERSION)
}

pub fn get_encrypted_size(clear_size: u64) -> Result<u64> {
    add_overhead(clear_size, OVERHEAD as u64, VERSION)
}

pub fn encrypt(key: &EncryptionKey, resource_id: &ResourceId, clear: &[u8]) -> Result<Vec<u8>> {
    let iv = random_iv();
    let sealed = encrypt_aead(key, &iv, clear, resource_id.as_bytes())?;

    let mut out = Vec::with_capacity(clear.len() + OVERHEAD);
    out.push(VERSION);
    out.extend_from_slice(resource_id.as_bytes());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&sealed);
    Ok(out)
}

pub fn decrypt(key: &EncryptionKey, encrypted: &[u8]) -> Result<Vec<u8>> {
    let resource_id = extract_resource_id(encrypted)?;
    let iv_start = 1 + RESOURCE_ID_SIZE;
    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(&encrypted[iv_start..iv_start + IV_SIZE]);
    decrypt_aead(
        key,
        &iv,
        &encrypted[iv_start + IV_SIZE..],
        resource_id.as_bytes(),
    )
}

pub fn extract_resource_id(encrypted: &[u8]) -> Result<ResourceId> {
    check_min_len(encrypted, OVERHEAD, VERSION)?;
    let mut id = [0u8; RESOURCE_ID_SIZE];
    id.copy_from_slice(&encrypted[1..1 + RESOURCE_ID_SIZE]);
    Ok(ResourceId(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_pinned_in_header() {
        let key = EncryptionKey::generate();
        let resource_id = ResourceId([0x5a; RESOURCE_ID_SIZE]);
        let encrypted = encrypt(&key, &resource_id, b"data").unwrap();
        assert_eq!(extract_resource_id(&encrypted).unwrap(), resource_id);
        assert_eq!(decrypt(&key, &encrypted).unwrap(), b"data");
    }

    #[test]
    fn test_swapped_resource_id_fails() {
        let key = EncryptionKey::generate();
        let mut encrypted = encrypt(&key, &ResourceId([1; RESOURCE_ID_SIZE]), b"data").unwrap();
        encrypted[1] = 2;
        assert!(decrypt(&key, &encrypted).is_err());
    }
}
