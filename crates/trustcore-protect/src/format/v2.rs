//! Version 2: `2 ‖ iv ‖ ciphertext ‖ mac`. The resource id is the mac.

use crate::crypto::{decrypt_aead, encrypt_aead, random_iv, EncryptionKey, IV_SIZE, MAC_SIZE};
use crate::error::Result;
use crate::resource::ResourceId;

use super::{add_overhead, check_min_len, mac_resource_id, sub_overhead};

pub const VERSION: u8 = 2;
pub const OVERHEAD: usize = 1 + IV_SIZE + MAC_SIZE;

pub fn get_clear_size(encrypted_size: u64) -> Result<u64> {
    sub_overhead(encrypted_size, OVERHEAD as u64, VERSION)
}

pub fn get_encrypted_size(clear_size: u64) -> Result<u64> {
    add_overhead(clear_size, OVERHEAD as u64, VERSION)
}

pub fn encrypt(key: &EncryptionKey, clear: &[u8]) -> Result<Vec<u8>> {
    let iv = random_iv();
    let sealed = encrypt_aead(key, &iv, clear, &[])?;

    let mut out = Vec::with_capacity(clear.len() + OVERHEAD);
    out.push(VERSION);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&sealed);
    Ok(out)
}

pub fn decrypt(key: &EncryptionKey, encrypted: &[u8]) -> Result<Vec<u8>> {
    check_min_len(encrypted, OVERHEAD, VERSION)?;
    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(&encrypted[1..1 + IV_SIZE]);
    decrypt_aead(key, &iv, &encrypted[1 + IV_SIZE..], &[])
}

pub fn extract_resource_id(encrypted: &[u8]) -> Result<ResourceId> {
    check_min_len(encrypted, OVERHEAD, VERSION)?;
    Ok(mac_resource_id(encrypted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtectError;

    #[test]
    fn test_roundtrip_and_layout() {
        let key = EncryptionKey::generate();
        let encrypted = encrypt(&key, b"payload").unwrap();
        assert_eq!(encrypted.len(), 7 + OVERHEAD);
        assert_eq!(encrypted[0], VERSION);
        assert_eq!(decrypt(&key, &encrypted).unwrap(), b"payload");
        assert_eq!(
            extract_resource_id(&encrypted).unwrap().as_bytes(),
            &encrypted[encrypted.len() - MAC_SIZE..]
        );
        assert_eq!(get_clear_size(encrypted.len() as u64).unwrap(), 7);
    }

    #[test]
    fn test_iv_follows_version() {
        let key = EncryptionKey::from_bytes([2; 32]);
        let a = encrypt(&key, b"same").unwrap();
        let b = encrypt(&key, b"same").unwrap();
        assert_ne!(a[1..1 + IV_SIZE], b[1..1 + IV_SIZE]);

        // Moving the iv out of its header slot breaks decryption.
        let mut shifted = a.clone();
        shifted[1..1 + IV_SIZE].copy_from_slice(&b[1..1 + IV_SIZE]);
        assert!(decrypt(&key, &shifted).is_err());
    }

    #[test]
    fn test_truncated_input_rejected() {
        let key = EncryptionKey::generate();
        let encrypted = encrypt(&key, b"").unwrap();
        assert_eq!(encrypted.len(), OVERHEAD);
        assert!(matches!(
            decrypt(&key, &encrypted[..OVERHEAD - 1]),
            Err(ProtectError::InvalidArgument(_))
        ));
        assert!(extract_resource_id(&encrypted[..OVERHEAD - 1]).is_err());
        assert!(get_clear_size(OVERHEAD as u64 - 1).is_err());
    }

    #[test]
    fn test_tampered_mac_fails() {
        let key = EncryptionKey::generate();
        let mut encrypted = encrypt(&key, b"payload").unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0x01;
        assert!(matches!(
            decrypt(&key, &encrypted),
            Err(ProtectError::DecryptionFailed(_))
        ));
    }
}
