//! Entry validation: signature verification and authorization rules.
//!
//! These functions are stateless. The caller resolves the author and the
//! target user as of the entry's index and passes them in.

use std::collections::HashSet;

use crate::crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature};
use crate::entry::{
    DeviceCreationEntry, DeviceRevocationEntry, ProvisionalIdentityClaimEntry,
    TrustchainCreationEntry,
};
use crate::error::ValidationError;
use crate::types::{DeviceId, TrustchainId};
use crate::user::{Device, User};

/// Who signed a device creation.
#[derive(Debug, Clone, Copy)]
pub enum Author<'a> {
    /// The trust chain root, identified by its public signature key.
    Trustchain(&'a Ed25519PublicKey),
    /// A previously verified device.
    Device(&'a Device),
}

fn check_signature(
    key: &Ed25519PublicKey,
    hash: &Blake3Hash,
    signature: &Ed25519Signature,
    what: &'static str,
) -> Result<(), ValidationError> {
    key.verify(hash.as_bytes(), signature)
        .map_err(|_| ValidationError::InvalidSignature(what))
}

fn check_author_valid(author: &Device, index: u64) -> Result<(), ValidationError> {
    match author.revoked_at {
        Some(revoked_at) if revoked_at <= index => {
            Err(ValidationError::RevokedAuthor { revoked_at, index })
        }
        _ => Ok(()),
    }
}

/// Validate the root entry of a trust chain.
pub fn verify_trustchain_creation(
    entry: &TrustchainCreationEntry,
    trustchain_id: &TrustchainId,
) -> Result<(), ValidationError> {
    if entry.index != 1 {
        return Err(ValidationError::InvalidTrustchainCreation("index must be 1"));
    }
    if entry.author != DeviceId::ZERO {
        return Err(ValidationError::InvalidTrustchainCreation(
            "author must be zero",
        ));
    }
    if !entry.signature.is_zero() {
        return Err(ValidationError::InvalidTrustchainCreation(
            "signature must be zero",
        ));
    }
    if entry.hash.0 != trustchain_id.0 {
        return Err(ValidationError::InvalidTrustchainCreation(
            "hash does not match trustchain id",
        ));
    }
    Ok(())
}

/// Validate a device creation against its author and the target user state.
///
/// `user` is the state of the target user just before `entry.index`, or
/// `None` if the user does not exist yet.
pub fn verify_device_creation(
    entry: &DeviceCreationEntry,
    author: Author<'_>,
    user: Option<&User>,
) -> Result<(), ValidationError> {
    let record = &entry.payload;

    check_signature(
        &record.ephemeral_public_signature_key,
        &entry.hash,
        &entry.signature,
        "block",
    )?;

    match author {
        Author::Trustchain(root_key) => {
            root_key
                .verify(&record.delegation_message(), &record.delegation_signature)
                .map_err(|_| ValidationError::InvalidDelegationSignature)?;
            if user.is_some() {
                return Err(ValidationError::UserAlreadyExists);
            }
        }
        Author::Device(author) => {
            check_author_valid(author, entry.index)?;
            let user = user.ok_or(ValidationError::UserIdMismatch)?;
            if author.user_id != record.user_id || user.device(&author.device_id).is_none() {
                return Err(ValidationError::UserIdMismatch);
            }
            author
                .public_signature_key
                .verify(&record.delegation_message(), &record.delegation_signature)
                .map_err(|_| ValidationError::InvalidDelegationSignature)?;
            if user.current_public_key() != Some(&record.user_key_pair.public_encryption_key) {
                return Err(ValidationError::InvalidUserKey);
            }
            if user.device(&entry.device_id()).is_some() {
                return Err(ValidationError::DeviceAlreadyExists);
            }
        }
    }

    Ok(())
}

/// Validate a device revocation. `user` owns both the author and the target.
pub fn verify_device_revocation(
    entry: &DeviceRevocationEntry,
    author: &Device,
    user: &User,
) -> Result<(), ValidationError> {
    let record = &entry.payload;

    check_author_valid(author, entry.index)?;
    if author.user_id != user.user_id {
        return Err(ValidationError::UserIdMismatch);
    }
    check_signature(
        &author.public_signature_key,
        &entry.hash,
        &entry.signature,
        "block",
    )?;

    let target = user
        .device(&record.device_id)
        .ok_or(ValidationError::UnknownTargetDevice)?;
    if target.is_revoked() {
        return Err(ValidationError::TargetAlreadyRevoked);
    }

    if user.current_public_key() != Some(&record.previous_public_encryption_key) {
        return Err(ValidationError::InvalidUserKey);
    }

    let expected: HashSet<DeviceId> = user
        .active_devices()
        .map(|d| d.device_id)
        .filter(|id| *id != record.device_id)
        .collect();
    if record.sealed_keys_for_devices.len() != expected.len() {
        return Err(ValidationError::InvalidRecipients(format!(
            "expected {} recipients, got {}",
            expected.len(),
            record.sealed_keys_for_devices.len()
        )));
    }
    let mut seen = HashSet::with_capacity(expected.len());
    for key in &record.sealed_keys_for_devices {
        if !expected.contains(&key.recipient) {
            return Err(ValidationError::InvalidRecipients(format!(
                "{} is not an active device",
                key.recipient
            )));
        }
        if !seen.insert(key.recipient) {
            return Err(ValidationError::InvalidRecipients(format!(
                "{} listed twice",
                key.recipient
            )));
        }
    }

    Ok(())
}

/// Validate a provisional identity claim made by `author` for `user`.
pub fn verify_provisional_identity_claim(
    entry: &ProvisionalIdentityClaimEntry,
    author: &Device,
    user: &User,
) -> Result<(), ValidationError> {
    let record = &entry.payload;

    check_author_valid(author, entry.index)?;
    check_signature(
        &author.public_signature_key,
        &entry.hash,
        &entry.signature,
        "block",
    )?;
    if author.user_id != record.user_id || user.user_id != record.user_id {
        return Err(ValidationError::UserIdMismatch);
    }

    let message = record.multi_signed_message(&entry.author);
    record
        .app_signature_public_key
        .verify(&message, &record.author_signature_by_app_key)
        .map_err(|_| ValidationError::InvalidSignature("app"))?;
    record
        .tanker_signature_public_key
        .verify(&message, &record.author_signature_by_tanker_key)
        .map_err(|_| ValidationError::InvalidSignature("tanker"))?;

    if user.current_public_key() != Some(&record.recipient_user_public_key) {
        return Err(ValidationError::InvalidUserKey);
    }

    Ok(())
}
