//! Version 4: chunked streaming format.
//!
//! Every chunk is independently decryptable:
//!
//! ```text
//! 4 ‖ encrypted_chunk_size u32le ‖ resource_id[16] ‖ iv_seed[24] ‖ ciphertext ‖ mac
//! ```
//!
//! The nonce of chunk `i` is derived from its seed and `i`, and the resource
//! id is bound as associated data, so chunks cannot be reordered or moved
//! between resources. Every chunk but the last is exactly
//! `encrypted_chunk_size` bytes; the last one is strictly shorter, which is
//! why a stream whose length is a multiple of the clear chunk size ends with
//! an empty chunk.

use crate::crypto::{decrypt_aead, encrypt_aead, random_iv, EncryptionKey, IV_SIZE, MAC_SIZE};
use crate::error::{ProtectError, Result};
use crate::resource::{ResourceId, RESOURCE_ID_SIZE};
use crate::stream::{ChunkDecryptor, ChunkEncryptor};

use super::{check_min_len, size_overflow};

pub const VERSION: u8 = 4;
pub const HEADER_SIZE: usize = 1 + 4 + RESOURCE_ID_SIZE + IV_SIZE;
pub const OVERHEAD: usize = HEADER_SIZE + MAC_SIZE;
pub const DEFAULT_MAX_ENCRYPTED_CHUNK_SIZE: u32 = 1024 * 1024;

/// Decoded chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub encrypted_chunk_size: u32,
    pub resource_id: ResourceId,
    pub iv_seed: [u8; IV_SIZE],
}

/// Clear payload capacity of a full chunk.
pub fn clear_chunk_size(encrypted_chunk_size: u32) -> Result<usize> {
    let size = encrypted_chunk_size as usize;
    if size <= OVERHEAD {
        return Err(ProtectError::InvalidArgument(format!(
            "encrypted chunk size {} must exceed the chunk overhead {}",
            size, OVERHEAD
        )));
    }
    Ok(size - OVERHEAD)
}

/// Nonce of the chunk at `index`.
pub fn derive_iv(seed: &[u8; IV_SIZE], index: u64) -> [u8; IV_SIZE] {
    let mut hasher = blake3::Hasher::new_derive_key("trustcore v4 chunk iv");
    hasher.update(seed);
    hasher.update(&index.to_le_bytes());
    let mut iv = [0u8; IV_SIZE];
    hasher.finalize_xof().fill(&mut iv);
    iv
}

pub fn read_header(chunk: &[u8]) -> Result<ChunkHeader> {
    check_min_len(chunk, OVERHEAD, VERSION)?;
    if chunk[0] != VERSION {
        return Err(ProtectError::InvalidArgument(format!(
            "expected a version {} chunk, got version {}",
            VERSION, chunk[0]
        )));
    }
    let mut size = [0u8; 4];
    size.copy_from_slice(&chunk[1..5]);
    let encrypted_chunk_size = u32::from_le_bytes(size);
    clear_chunk_size(encrypted_chunk_size)?;

    let mut resource_id = [0u8; RESOURCE_ID_SIZE];
    resource_id.copy_from_slice(&chunk[5..5 + RESOURCE_ID_SIZE]);
    let mut iv_seed = [0u8; IV_SIZE];
    iv_seed.copy_from_slice(&chunk[5 + RESOURCE_ID_SIZE..HEADER_SIZE]);

    Ok(ChunkHeader {
        encrypted_chunk_size,
        resource_id: ResourceId(resource_id),
        iv_seed,
    })
}

/// Encrypt one chunk at position `index`.
pub fn encrypt_chunk(
    key: &EncryptionKey,
    index: u64,
    resource_id: &ResourceId,
    encrypted_chunk_size: u32,
    clear: &[u8],
) -> Result<Vec<u8>> {
    let iv_seed = random_iv();
    let iv = derive_iv(&iv_seed, index);
    let sealed = encrypt_aead(key, &iv, clear, resource_id.as_bytes())?;

    let mut out = Vec::with_capacity(HEADER_SIZE + sealed.len());
    out.push(VERSION);
    out.extend_from_slice(&encrypted_chunk_size.to_le_bytes());
    out.extend_from_slice(resource_id.as_bytes());
    out.extend_from_slice(&iv_seed);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypt one chunk expected at position `index`.
pub fn decrypt_chunk(
    key: &EncryptionKey,
    index: u64,
    chunk: &[u8],
) -> Result<(ChunkHeader, Vec<u8>)> {
    let header = read_header(chunk)?;
    let iv = derive_iv(&header.iv_seed, index);
    let clear = decrypt_aead(
        key,
        &iv,
        &chunk[HEADER_SIZE..],
        header.resource_id.as_bytes(),
    )?;
    Ok((header, clear))
}

/// Total encrypted length for `clear_size` bytes, counting the final short
/// (possibly empty) chunk.
pub fn get_encrypted_size(clear_size: u64, encrypted_chunk_size: u32) -> Result<u64> {
    let clear_chunk = clear_chunk_size(encrypted_chunk_size)? as u64;
    let full_chunks = clear_size / clear_chunk;
    let last = clear_size % clear_chunk;
    full_chunks
        .checked_mul(u64::from(encrypted_chunk_size))
        .and_then(|size| size.checked_add(last + OVERHEAD as u64))
        .ok_or_else(|| size_overflow(clear_size, VERSION))
}

pub fn get_clear_size(encrypted_size: u64, encrypted_chunk_size: u32) -> Result<u64> {
    let clear_chunk = clear_chunk_size(encrypted_chunk_size)? as u64;
    let chunk = u64::from(encrypted_chunk_size);
    let full_chunks = encrypted_size / chunk;
    let last = encrypted_size % chunk;
    if last < OVERHEAD as u64 {
        return Err(ProtectError::InvalidArgument(format!(
            "{} bytes is not a valid version {} length for chunk size {}",
            encrypted_size, VERSION, chunk
        )));
    }
    Ok(full_chunks * clear_chunk + last - OVERHEAD as u64)
}

/// Encrypt a whole buffer in the chunked format.
pub fn encrypt(
    key: &EncryptionKey,
    resource_id: &ResourceId,
    clear: &[u8],
    encrypted_chunk_size: u32,
) -> Result<Vec<u8>> {
    let mut encryptor = ChunkEncryptor::new(key.clone(), *resource_id, encrypted_chunk_size)?;
    let total = get_encrypted_size(clear.len() as u64, encrypted_chunk_size)?;
    let mut out = Vec::with_capacity(usize::try_from(total).unwrap_or(0));

    let mut chunks = clear.chunks_exact(encryptor.clear_chunk_size());
    for chunk in &mut chunks {
        out.extend_from_slice(&encryptor.encrypt_chunk(chunk)?);
    }
    let rest = chunks.remainder();
    if !rest.is_empty() {
        out.extend_from_slice(&encryptor.encrypt_chunk(rest)?);
    }
    if let Some(last) = encryptor.finish()? {
        out.extend_from_slice(&last);
    }
    Ok(out)
}

/// Decrypt a whole chunked buffer.
pub fn decrypt(key: &EncryptionKey, encrypted: &[u8]) -> Result<Vec<u8>> {
    let header = read_header(encrypted)?;
    let mut decryptor = ChunkDecryptor::new(key.clone());
    let mut out = Vec::with_capacity(encrypted.len());
    for chunk in encrypted.chunks(header.encrypted_chunk_size as usize) {
        out.extend_from_slice(&decryptor.decrypt_chunk(chunk)?);
    }
    decryptor.finish()?;
    Ok(out)
}

pub fn extract_resource_id(encrypted: &[u8]) -> Result<ResourceId> {
    Ok(read_header(encrypted)?.resource_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CHUNK: u32 = 1024;

    #[test]
    fn test_overhead() {
        assert_eq!(OVERHEAD, 61);
        assert!(clear_chunk_size(61).is_err());
        assert_eq!(clear_chunk_size(62).unwrap(), 1);
    }

    #[test]
    fn test_sizes_count_boundary_chunk() {
        let clear_chunk = clear_chunk_size(CHUNK).unwrap() as u64;
        assert_eq!(get_encrypted_size(0, CHUNK).unwrap(), OVERHEAD as u64);
        assert_eq!(
            get_encrypted_size(clear_chunk, CHUNK).unwrap(),
            u64::from(CHUNK) + OVERHEAD as u64
        );
        assert_eq!(
            get_encrypted_size(2 * clear_chunk, CHUNK).unwrap(),
            2 * u64::from(CHUNK) + OVERHEAD as u64
        );
        assert!(get_clear_size(u64::from(CHUNK), CHUNK).is_err());
    }

    #[test]
    fn test_encrypted_size_overflow_rejected() {
        for (clear_size, chunk) in [(u64::MAX, 62), (u64::MAX - 100, 62), (u64::MAX, CHUNK)] {
            assert!(matches!(
                get_encrypted_size(clear_size, chunk),
                Err(ProtectError::InvalidArgument(_))
            ));
        }
        // Largest input that still fits with one-byte chunks.
        let max = (u64::MAX - OVERHEAD as u64) / 62;
        assert!(get_encrypted_size(max, 62).is_ok());
    }

    #[test]
    fn test_iv_depends_on_index() {
        let seed = [9u8; IV_SIZE];
        assert_ne!(derive_iv(&seed, 0), derive_iv(&seed, 1));
        assert_eq!(derive_iv(&seed, 7), derive_iv(&seed, 7));
    }

    #[test]
    fn test_chunk_at_wrong_index_fails() {
        let key = EncryptionKey::generate();
        let resource_id = ResourceId([1; RESOURCE_ID_SIZE]);
        let chunk = encrypt_chunk(&key, 3, &resource_id, CHUNK, b"abc").unwrap();
        assert!(decrypt_chunk(&key, 2, &chunk).is_err());
        let (header, clear) = decrypt_chunk(&key, 3, &chunk).unwrap();
        assert_eq!(header.resource_id, resource_id);
        assert_eq!(header.encrypted_chunk_size, CHUNK);
        assert_eq!(clear, b"abc");
    }

    #[test]
    fn test_missing_final_chunk_fails() {
        let key = EncryptionKey::generate();
        let resource_id = ResourceId([1; RESOURCE_ID_SIZE]);
        let clear = vec![7u8; clear_chunk_size(CHUNK).unwrap()];
        let encrypted = encrypt(&key, &resource_id, &clear, CHUNK).unwrap();
        assert_eq!(encrypted.len(), CHUNK as usize + OVERHEAD);

        assert_eq!(decrypt(&key, &encrypted).unwrap(), clear);
        assert!(matches!(
            decrypt(&key, &encrypted[..CHUNK as usize]),
            Err(ProtectError::DecryptionFailed(_))
        ));
    }

    proptest! {
        #[test]
        fn test_clear_size_inverts_encrypted_size(
            clear_size in 0u64..50_000_000,
            chunk in (OVERHEAD as u32 + 1)..4_000_000u32,
        ) {
            let encrypted = get_encrypted_size(clear_size, chunk).unwrap();
            prop_assert_eq!(get_clear_size(encrypted, chunk).unwrap(), clear_size);
        }
    }
}
