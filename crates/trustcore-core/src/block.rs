//! Block: the serialized form of a trust chain entry as delivered by the server.
//!
//! ```text
//! varint version | varint index | trustchain_id[32] | varint nature
//!   | varint payload_len | payload | author[32] | signature[64]
//! ```
//!
//! The hash of a block covers `varint(nature) ‖ author ‖ payload`; signatures
//! are computed over that hash.

use bytes::Bytes;

use crate::crypto::{Blake3Hash, Ed25519Signature, Keypair};
use crate::entry::{Entry, Nature, Payload, Record};
use crate::error::{CoreError, Result};
use crate::types::{DeviceId, TrustchainId};
use crate::varint::{self, Reader};

/// The only block version in use.
pub const BLOCK_VERSION: u64 = 1;

/// A raw block, payload still encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub index: u64,
    pub trustchain_id: TrustchainId,
    pub nature: Nature,
    pub payload: Bytes,
    pub author: DeviceId,
    pub signature: Ed25519Signature,
}

/// Compute the content hash of a block.
pub fn compute_hash(nature: Nature, author: &DeviceId, payload: &[u8]) -> Blake3Hash {
    Blake3Hash::hash_parts(&[
        &varint::encode(nature.to_u64()),
        author.as_bytes(),
        payload,
    ])
}

impl Block {
    /// Content hash (also the id of the device a creation block registers).
    pub fn hash(&self) -> Blake3Hash {
        compute_hash(self.nature, &self.author, &self.payload)
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.payload.len() + 32 * 2 + 64 + 4 * 5);
        varint::encode_to(&mut buf, BLOCK_VERSION);
        varint::encode_to(&mut buf, self.index);
        buf.extend_from_slice(self.trustchain_id.as_bytes());
        varint::encode_to(&mut buf, self.nature.to_u64());
        varint::encode_to(&mut buf, self.payload.len() as u64);
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(self.author.as_bytes());
        buf.extend_from_slice(self.signature.as_bytes());
        buf
    }

    /// Parse wire bytes. The whole input must be one block.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);

        let version = r.varint("version")?;
        if version != BLOCK_VERSION {
            return Err(CoreError::UnsupportedBlockVersion(version));
        }
        let index = r.varint("index")?;
        let trustchain_id = TrustchainId(r.array("trustchain_id")?);
        let nature = Nature::from_u64(r.varint("nature")?)?;
        let payload_len = r.varint("payload_len")?;
        let payload_len = usize::try_from(payload_len)
            .map_err(|_| CoreError::Truncated { field: "payload" })?;
        let payload = Bytes::copy_from_slice(r.bytes(payload_len, "payload")?);
        let author = DeviceId(r.array("author")?);
        let signature = Ed25519Signature(r.array("signature")?);
        r.finish("block")?;

        Ok(Self {
            index,
            trustchain_id,
            nature,
            payload,
            author,
            signature,
        })
    }

    /// Decode the payload according to the block's nature.
    pub fn to_entry(&self) -> Result<Entry<Payload>> {
        Ok(Entry {
            index: self.index,
            author: self.author,
            signature: self.signature,
            hash: self.hash(),
            payload: Payload::decode(self.nature, &self.payload)?,
        })
    }

    /// Decode the payload as a specific record type.
    pub fn to_typed_entry<P: Record>(&self) -> Result<Entry<P>> {
        if self.nature != P::NATURE {
            return Err(CoreError::UnexpectedNature {
                expected: P::NATURE,
                got: self.nature,
            });
        }
        Ok(Entry {
            index: self.index,
            author: self.author,
            signature: self.signature,
            hash: self.hash(),
            payload: P::from_bytes(&self.payload)?,
        })
    }
}

/// Builder for creating blocks.
pub struct BlockBuilder {
    trustchain_id: TrustchainId,
    index: u64,
    author: DeviceId,
    nature: Nature,
    payload: Bytes,
}

impl BlockBuilder {
    /// Start building a block.
    pub fn new(trustchain_id: TrustchainId, index: u64, author: DeviceId) -> Self {
        Self {
            trustchain_id,
            index,
            author,
            nature: Nature::DeviceCreation,
            payload: Bytes::new(),
        }
    }

    /// Set the payload from a record, along with its nature.
    pub fn record<R: Record>(mut self, record: &R) -> Self {
        self.nature = R::NATURE;
        self.payload = record.to_bytes().into();
        self
    }

    /// Set a raw payload and nature.
    pub fn raw(mut self, nature: Nature, payload: impl Into<Bytes>) -> Self {
        self.nature = nature;
        self.payload = payload.into();
        self
    }

    /// The hash the finished block will have.
    pub fn hash(&self) -> Blake3Hash {
        compute_hash(self.nature, &self.author, &self.payload)
    }

    /// Build and sign the block over its hash.
    pub fn sign(self, keypair: &Keypair) -> Block {
        let signature = keypair.sign(self.hash().as_bytes());
        self.finish(signature)
    }

    /// Build without a signature (the trustchain creation block).
    pub fn unsigned(self) -> Block {
        self.finish(Ed25519Signature::ZERO)
    }

    fn finish(self, signature: Ed25519Signature) -> Block {
        Block {
            index: self.index,
            trustchain_id: self.trustchain_id,
            nature: self.nature,
            payload: self.payload,
            author: self.author,
            signature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519PublicKey;
    use crate::entry::{DeviceCreationRecord, TrustchainCreationRecord};

    fn root_block() -> Block {
        BlockBuilder::new(TrustchainId::ZERO, 1, DeviceId::ZERO)
            .record(&TrustchainCreationRecord {
                public_signature_key: Ed25519PublicKey([0x11; 32]),
            })
            .unsigned()
    }

    #[test]
    fn test_block_wire_layout() {
        let block = root_block();
        let bytes = block.to_bytes();
        // version, index, trustchain id, nature, payload len
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[1], 1);
        assert_eq!(bytes[34], 1);
        assert_eq!(bytes[35], 32);
        assert_eq!(bytes.len(), 36 + 32 + 32 + 64);
        assert_eq!(Block::from_bytes(&bytes), Ok(block));
    }

    #[test]
    fn test_hash_covers_nature_author_payload() {
        let block = root_block();
        let mut other = block.clone();
        other.index = 99;
        other.signature = Ed25519Signature([1; 64]);
        assert_eq!(block.hash(), other.hash());

        other.author = DeviceId([1; 32]);
        assert_ne!(block.hash(), other.hash());
    }

    #[test]
    fn test_signature_over_hash() {
        let keypair = Keypair::generate();
        let block = BlockBuilder::new(TrustchainId([3; 32]), 2, DeviceId([3; 32]))
            .raw(Nature::DeviceCreation, vec![0u8; 10])
            .sign(&keypair);
        keypair
            .public_key()
            .verify(block.hash().as_bytes(), &block.signature)
            .unwrap();
    }

    #[test]
    fn test_rejects_bad_version_and_nature() {
        let mut bytes = root_block().to_bytes();
        bytes[0] = 2;
        assert_eq!(
            Block::from_bytes(&bytes),
            Err(CoreError::UnsupportedBlockVersion(2))
        );

        let mut bytes = root_block().to_bytes();
        bytes[34] = 2;
        assert_eq!(Block::from_bytes(&bytes), Err(CoreError::UnknownNature(2)));
    }

    #[test]
    fn test_rejects_truncation_and_trailing() {
        let bytes = root_block().to_bytes();
        assert_eq!(
            Block::from_bytes(&bytes[..bytes.len() - 1]),
            Err(CoreError::Truncated { field: "signature" })
        );

        let mut longer = bytes.clone();
        longer.push(0);
        assert!(matches!(
            Block::from_bytes(&longer),
            Err(CoreError::TrailingBytes { count: 1, .. })
        ));
    }

    #[test]
    fn test_typed_entry_checks_nature() {
        let block = root_block();
        let entry = block.to_typed_entry::<TrustchainCreationRecord>().unwrap();
        assert_eq!(entry.hash, block.hash());
        assert!(matches!(
            block.to_typed_entry::<DeviceCreationRecord>(),
            Err(CoreError::UnexpectedNature { .. })
        ));
    }

    #[test]
    fn test_malformed_payload_rejected_at_decode() {
        let block = BlockBuilder::new(TrustchainId::ZERO, 5, DeviceId([1; 32]))
            .raw(Nature::DeviceCreation, vec![0u8; 100])
            .unsigned();
        assert!(matches!(
            block.to_entry(),
            Err(CoreError::Truncated { field: "delegation_signature" })
        ));
    }
}
