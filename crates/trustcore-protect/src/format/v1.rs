//! Version 1: `1 ‖ ciphertext ‖ mac ‖ iv`, with optional associated data.
//!
//! Reserved for local secrets (key safe, resource key store). Never used for
//! shared resources.

use crate::crypto::{decrypt_aead, encrypt_aead, random_iv, EncryptionKey, IV_SIZE, MAC_SIZE};
use crate::error::Result;
use crate::resource::ResourceId;

use super::{add_overhead, check_min_len, mac_resource_id, sub_overhead};

pub const VERSION: u8 = 1;
pub const OVERHEAD: usize = 1 + MAC_SIZE + IV_SIZE;

pub fn get_clear_size(encrypted_size: u64) -> Result<u64> {
    sub_overhead(encrypted_size, OVERHEAD as u64, VERSION)
}

pub fn get_encrypted_size(clear_size: u64) -> Result<u64> {
    add_overhead(clear_size, OVERHEAD as u64, VERSION)
}

pub fn encrypt(key: &EncryptionKey, clear: &[u8], aad: Option<&[u8]>) -> Result<Vec<u8>> {
    let iv = random_iv();
    let sealed = encrypt_aead(key, &iv, clear, aad.unwrap_or_default())?;

    let mut out = Vec::with_capacity(clear.len() + OVERHEAD);
    out.push(VERSION);
    out.extend_from_slice(&sealed);
    out.extend_from_slice(&iv);
    Ok(out)
}

pub fn decrypt(key: &EncryptionKey, encrypted: &[u8], aad: Option<&[u8]>) -> Result<Vec<u8>> {
    check_min_len(encrypted, OVERHEAD, VERSION)?;
    let iv_start = encrypted.len() - IV_SIZE;
    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(&encrypted[iv_start..]);
    decrypt_aead(key, &iv, &encrypted[1..iv_start], aad.unwrap_or_default())
}

/// Decrypt data that may have been written before associated data was bound:
/// try with `aad`, then without.
pub fn compat_decrypt(key: &EncryptionKey, encrypted: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    decrypt(key, encrypted, Some(aad)).or_else(|_| decrypt(key, encrypted, None))
}

pub fn extract_resource_id(encrypted: &[u8]) -> Result<ResourceId> {
    check_min_len(encrypted, OVERHEAD, VERSION)?;
    let mac_end = encrypted.len() - IV_SIZE;
    Ok(mac_resource_id(&encrypted[..mac_end]))
}
