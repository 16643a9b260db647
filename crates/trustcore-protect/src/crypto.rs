//! Cryptographic utilities for the protect crate.
//!
//! Provides XChaCha20-Poly1305 authenticated encryption, X25519 key agreement
//! and sealed boxes for sending a private key to a recipient public key.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce, XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use std::fmt;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use trustcore_core::crypto::sizes::SEAL_OVERHEAD;
use trustcore_core::X25519PublicKey;

use crate::error::{ProtectError, Result};

/// Symmetric key size.
pub const KEY_SIZE: usize = 32;
/// XChaCha20 nonce size.
pub const IV_SIZE: usize = 24;
/// Poly1305 tag size.
pub const MAC_SIZE: usize = 16;

/// A 256-bit symmetric encryption key. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

impl AsRef<[u8]> for EncryptionKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for EncryptionKey {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> std::result::Result<Self, Self::Error> {
        Ok(Self(slice.try_into()?))
    }
}

/// Generate a random XChaCha20 nonce.
pub fn random_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

/// Encrypt with XChaCha20-Poly1305. Returns `ciphertext ‖ mac`.
pub fn encrypt_aead(
    key: &EncryptionKey,
    iv: &[u8; IV_SIZE],
    clear: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .encrypt(XNonce::from_slice(iv), Payload { msg: clear, aad })
        .map_err(|e| ProtectError::EncryptionFailed(e.to_string()))
}

/// Decrypt `ciphertext ‖ mac` with XChaCha20-Poly1305.
pub fn decrypt_aead(
    key: &EncryptionKey,
    iv: &[u8; IV_SIZE],
    encrypted: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    if encrypted.len() < MAC_SIZE {
        return Err(ProtectError::DecryptionFailed(format!(
            "cipher text too short: {} bytes",
            encrypted.len()
        )));
    }
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(XNonce::from_slice(iv), Payload { msg: encrypted, aad })
        .map_err(|_| ProtectError::DecryptionFailed("authentication failed".into()))
}

/// An X25519 static secret key.
#[derive(Clone)]
pub struct X25519StaticSecret(StaticSecret);

impl X25519StaticSecret {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(StaticSecret::from(bytes))
    }

    /// Create from seed bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Get the raw secret bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Derive the public key.
    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(PublicKey::from(&self.0))
    }

    /// Perform key agreement with a peer's public key.
    pub fn diffie_hellman(&self, peer_public: &X25519PublicKey) -> SharedKey {
        let shared = self.0.diffie_hellman(&peer_public.to_dalek());
        SharedKey(*shared.as_bytes())
    }
}

impl fmt::Debug for X25519StaticSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X25519StaticSecret({:?})", self.public_key())
    }
}

/// A shared secret derived from X25519 key agreement.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive a symmetric key bound to both public keys of the exchange.
    pub fn derive_seal_key(
        &self,
        ephemeral: &X25519PublicKey,
        recipient: &X25519PublicKey,
    ) -> EncryptionKey {
        let mut hasher = blake3::Hasher::new_derive_key("trustcore seal v1");
        hasher.update(ephemeral.as_bytes());
        hasher.update(recipient.as_bytes());
        hasher.update(&self.0);
        EncryptionKey(*hasher.finalize().as_bytes())
    }
}

/// Ephemeral key pair for one-time key agreement.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: X25519PublicKey,
}

impl EphemeralKeyPair {
    /// Generate a new ephemeral key pair.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(rand::thread_rng());
        let public = X25519PublicKey::from(PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Get the public key.
    pub fn public_key(&self) -> X25519PublicKey {
        self.public
    }

    /// Perform key agreement with a peer's public key.
    ///
    /// Consumes the ephemeral secret (can only be used once).
    pub fn diffie_hellman(self, peer_public: &X25519PublicKey) -> SharedKey {
        let shared = self.secret.diffie_hellman(&peer_public.to_dalek());
        SharedKey(*shared.as_bytes())
    }
}

/// Anonymously encrypt `clear` for the holder of `recipient`.
///
/// Output: `ephemeral_public[32] ‖ ciphertext ‖ mac[16]`. The key is used
/// once, so the nonce is fixed.
pub fn seal(clear: &[u8], recipient: &X25519PublicKey) -> Result<Vec<u8>> {
    let ephemeral = EphemeralKeyPair::generate();
    let ephemeral_public = ephemeral.public_key();
    let key = ephemeral
        .diffie_hellman(recipient)
        .derive_seal_key(&ephemeral_public, recipient);

    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&[0u8; 12]), clear)
        .map_err(|e| ProtectError::EncryptionFailed(e.to_string()))?;

    let mut out = Vec::with_capacity(SEAL_OVERHEAD + clear.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a sealed box with the recipient's secret key.
pub fn seal_open(sealed: &[u8], recipient: &X25519StaticSecret) -> Result<Vec<u8>> {
    if sealed.len() < SEAL_OVERHEAD {
        return Err(ProtectError::DecryptionFailed(format!(
            "sealed box too short: {} bytes",
            sealed.len()
        )));
    }
    let (ephemeral, ciphertext) = sealed.split_at(32);
    let mut ephemeral_bytes = [0u8; 32];
    ephemeral_bytes.copy_from_slice(ephemeral);
    let ephemeral_public = X25519PublicKey(ephemeral_bytes);

    let key = recipient
        .diffie_hellman(&ephemeral_public)
        .derive_seal_key(&ephemeral_public, &recipient.public_key());

    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(&[0u8; 12]), ciphertext)
        .map_err(|_| ProtectError::DecryptionFailed("sealed box authentication failed".into()))
}
