//! Proptest generators for property-based testing.

use proptest::prelude::*;

use trustcore_protect::format::v4;
use trustcore_protect::{EncryptionFormat, EncryptionKey, Resource};

/// Generate a resource with a key drawn from the strategy's RNG.
pub fn resource() -> impl Strategy<Value = Resource> {
    any::<[u8; 32]>().prop_map(|key| Resource::new(EncryptionKey::from_bytes(key)))
}

/// One of the five formats.
pub fn encryption_format() -> impl Strategy<Value = EncryptionFormat> {
    prop::sample::select(EncryptionFormat::ALL.to_vec())
}

/// A streaming chunk size small enough to make multi-chunk inputs cheap.
pub fn encrypted_chunk_size() -> impl Strategy<Value = u32> {
    (v4::OVERHEAD as u32 + 1)..=(v4::OVERHEAD as u32 + 512)
}

/// Clear bytes of at most `max_len` bytes.
pub fn clear_data(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// How a clear buffer is cut into input pieces for a stream.
pub fn segmentation(max_piece: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1..=max_piece, 1..16)
}

/// Cut `data` into pieces following `sizes`, cycling through it.
pub fn segment(data: &[u8], sizes: &[usize]) -> Vec<bytes::Bytes> {
    let mut pieces = Vec::new();
    let mut offset = 0;
    let mut i = 0;
    while offset < data.len() {
        let len = sizes[i % sizes.len()].min(data.len() - offset);
        pieces.push(bytes::Bytes::copy_from_slice(&data[offset..offset + len]));
        offset += len;
        i += 1;
    }
    pieces
}
