//! Version 3: `3 ‖ ciphertext ‖ mac` under an all-zero IV.
//!
//! Safe only because every key encrypts exactly one payload. Default format
//! for non-streamed shared resources; the resource id is the mac.

use crate::crypto::{decrypt_aead, encrypt_aead, EncryptionKey, IV_SIZE, MAC_SIZE};
use crate::error::Result;
use crate::resource::ResourceId;

use super::{add_overhead, check_min_len, mac_resource_id, sub_overhead};

pub const VERSION: u8 = 3;
pub const OVERHEAD: usize = 1 + MAC_SIZE;

const ZERO_IV: [u8; IV_SIZE] = [0u8; IV_SIZE];

pub fn get_clear_size(encrypted_size: u64) -> Result<u64> {
    sub_overhead(encrypted_size, OVERHEAD as u64, VERSION)
}

pub fn get_encrypted_size(clear_size: u64) -> Result<u64> {
    add_overhead(clear_size, OVERHEAD as u64, VERSION)
}

pub fn encrypt(key: &EncryptionKey, clear: &[u8]) -> Result<Vec<u8>> {
    let sealed = encrypt_aead(key, &ZERO_IV, clear, &[])?;

    let mut out = Vec::with_capacity(clear.len() + OVERHEAD);
    out.push(VERSION);
    out.extend_from_slice(&sealed);
    Ok(out)
}

pub fn decrypt(key: &EncryptionKey, encrypted: &[u8]) -> Result<Vec<u8>> {
    check_min_len(encrypted, OVERHEAD, VERSION)?;
    decrypt_aead(key, &ZERO_IV, &encrypted[1..], &[])
}

pub fn extract_resource_id(encrypted: &[u8]) -> Result<ResourceId> {
    check_min_len(encrypted, OVERHEAD, VERSION)?;
    Ok(mac_resource_id(encrypted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_for_same_key() {
        let key = EncryptionKey::from_bytes([3; 32]);
        let a = encrypt(&key, b"payload").unwrap();
        let b = encrypt(&key, b"payload").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 7 + OVERHEAD);
        assert_eq!(
            extract_resource_id(&a).unwrap().as_bytes(),
            &a[a.len() - MAC_SIZE..]
        );
    }

    #[test]
    fn test_tampered_cipher_text_fails() {
        let key = EncryptionKey::generate();
        let mut encrypted = encrypt(&key, b"payload").unwrap();
        encrypted[2] ^= 0x01;
        assert!(decrypt(&key, &encrypted).is_err());
    }
}
