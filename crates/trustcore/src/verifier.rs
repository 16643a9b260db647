//! The trust chain verifier.
//!
//! Entries arrive from the server unverified and in any order relative to
//! other users. The verifier resolves each entry's author and target user as
//! of the entry's index, checks it against the validation rules, and folds
//! it into the user store. All work runs through one [`TaskQueue`], each
//! task on its own tokio task: a caller that stops waiting does not cut a
//! verification short.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use trustcore_core::{
    validation, Author, Blake3Hash, Device, DeviceCreationEntry, DeviceId,
    ProvisionalIdentityClaimEntry, TrustchainCreationEntry, TrustchainId, User, UserEntry,
    UserId, ValidationError,
};
use trustcore_store::{TrustchainStore, UnverifiedStore, UserStore};

use crate::error::{Result, TrustchainError};
use crate::queue::TaskQueue;

/// Configuration for the verifier.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Drop entries rejected while folding pending entries and carry on.
    ///
    /// When false, the first rejected entry fails the whole task and stays
    /// pending.
    pub drop_invalid_entries: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            drop_invalid_entries: true,
        }
    }
}

/// Storage the verifier needs: pending entries, verified users, root key.
pub trait VerifierStore: UnverifiedStore + UserStore + TrustchainStore {}

impl<S: UnverifiedStore + UserStore + TrustchainStore + ?Sized> VerifierStore for S {}

/// Verifies trust chain entries and maintains the verified user view.
pub struct TrustchainVerifier<S> {
    inner: Arc<VerifierInner<S>>,
}

struct VerifierInner<S> {
    trustchain_id: TrustchainId,
    store: Arc<S>,
    queue: TaskQueue,
    config: VerifierConfig,
}

impl<S: VerifierStore + 'static> TrustchainVerifier<S> {
    pub fn new(trustchain_id: TrustchainId, store: Arc<S>, config: VerifierConfig) -> Self {
        Self {
            inner: Arc::new(VerifierInner {
                trustchain_id,
                store,
                queue: TaskQueue::new(),
                config,
            }),
        }
    }

    pub fn trustchain_id(&self) -> &TrustchainId {
        &self.inner.trustchain_id
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Verify the root entry and record the trust chain public key.
    ///
    /// Rejection is returned to the caller.
    pub async fn verify_trustchain_creation(&self, entry: &TrustchainCreationEntry) -> Result<()> {
        let inner = self.inner.clone();
        let entry = entry.clone();
        detach(async move { inner.verify_trustchain_creation(&entry).await }).await
    }

    /// Verify one device creation against its user as of the entry's index.
    ///
    /// Returns `None` if the entry was rejected; the rejection is logged.
    pub async fn verify_device_creation(
        &self,
        entry: DeviceCreationEntry,
    ) -> Result<Option<DeviceCreationEntry>> {
        let inner = self.inner.clone();
        detach(async move { inner.verify_device_creation(entry).await }).await
    }

    /// Verify every pending entry of `user_ids`.
    ///
    /// Entries are processed in rounds, one entry per user per round, each
    /// user's entries in index order. Safe to call again: an up-to-date user
    /// has nothing pending.
    pub async fn update_user_store(&self, user_ids: &[UserId]) -> Result<()> {
        let inner = self.inner.clone();
        let user_ids = user_ids.to_vec();
        detach(async move { inner.update_user_store(&user_ids).await }).await
    }

    /// Keep the claims whose author and signatures verify.
    pub async fn verify_provisional_identity_claims(
        &self,
        entries: Vec<ProvisionalIdentityClaimEntry>,
    ) -> Result<Vec<ProvisionalIdentityClaimEntry>> {
        let inner = self.inner.clone();
        detach(async move { inner.verify_provisional_identity_claims(entries).await }).await
    }
}

/// Run `task` to completion on its own tokio task.
///
/// Dropping the returned future detaches the task instead of cancelling it,
/// so a queued verification never stops between two store writes.
async fn detach<T, F>(task: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(task).await?
}

impl<S: VerifierStore> VerifierInner<S> {
    async fn verify_trustchain_creation(&self, entry: &TrustchainCreationEntry) -> Result<()> {
        self.queue
            .enqueue(async {
                validation::verify_trustchain_creation(entry, &self.trustchain_id)?;
                self.store
                    .set_trustchain_public_key(&entry.payload.public_signature_key)
                    .await?;
                debug!(trustchain_id = %self.trustchain_id, "trust chain creation verified");
                Ok::<_, TrustchainError>(())
            })
            .await
    }

    async fn verify_device_creation(
        &self,
        entry: DeviceCreationEntry,
    ) -> Result<Option<DeviceCreationEntry>> {
        let result = self
            .queue
            .enqueue(async {
                let mut pass = VerificationPass::new(self);
                let user_id = entry.payload.user_id;
                let user = pass.resolve_user(user_id, Some(entry.index)).await?;
                pass.verify_and_apply(user, UserEntry::DeviceCreation(entry.clone()))
                    .await
            })
            .await;

        match result {
            Ok(_) => Ok(Some(entry)),
            Err(TrustchainError::InvalidBlock(e)) => {
                warn!(code = e.code(), index = entry.index, error = %e, "invalid device creation");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn update_user_store(&self, user_ids: &[UserId]) -> Result<()> {
        self.queue
            .enqueue(async {
                let mut next = self
                    .store
                    .find_unverified_user_entries(user_ids, None)
                    .await?;
                next.sort_by(|a, b| {
                    a.user_id()
                        .cmp(&b.user_id())
                        .then(a.index().cmp(&b.index()))
                });

                let mut round = 0usize;
                while !next.is_empty() {
                    let (current, remaining) = take_one_entry_per_user(next);
                    next = remaining;
                    round += 1;

                    let mut verified = Vec::with_capacity(current.len());
                    let mut rejected = Vec::new();
                    for entry in current {
                        let user = self.store.find_user(&entry.user_id()).await?;
                        match self.verify_user_entry(user.as_ref(), &entry).await {
                            Ok(()) => verified.push(entry),
                            Err(TrustchainError::InvalidBlock(e)) if self.config.drop_invalid_entries => {
                                warn!(
                                    code = e.code(),
                                    index = entry.index(),
                                    user_id = %entry.user_id(),
                                    error = %e,
                                    "dropping invalid user entry"
                                );
                                rejected.push(entry);
                            }
                            Err(e) => return Err(e),
                        }
                    }

                    self.store.apply_entries(&verified).await?;
                    self.store.remove_verified_user_entries(&verified).await?;
                    self.store.remove_verified_user_entries(&rejected).await?;
                    debug!(
                        round,
                        verified = verified.len(),
                        rejected = rejected.len(),
                        "user store round applied"
                    );
                }
                Ok::<_, TrustchainError>(())
            })
            .await
    }

    async fn verify_provisional_identity_claims(
        &self,
        entries: Vec<ProvisionalIdentityClaimEntry>,
    ) -> Result<Vec<ProvisionalIdentityClaimEntry>> {
        self.queue
            .enqueue(async {
                let mut pass = VerificationPass::new(self);
                let refs: Vec<EntryRef> = entries.iter().map(EntryRef::from_claim).collect();
                let authors = pass.get_verified_authors_by_hash(&refs).await?;

                let mut verified = Vec::with_capacity(entries.len());
                for entry in entries {
                    let Some(author) = authors.get(&entry.hash) else {
                        warn!(index = entry.index, "claim author unknown or revoked");
                        continue;
                    };
                    let user = pass
                        .resolve_user(entry.payload.user_id, Some(entry.index))
                        .await?;
                    let Some(user) = user else {
                        warn!(index = entry.index, "claim for unknown user");
                        continue;
                    };
                    match validation::verify_provisional_identity_claim(&entry, author, &user) {
                        Ok(()) => verified.push(entry),
                        Err(e) => {
                            warn!(code = e.code(), index = entry.index, error = %e, "invalid claim");
                        }
                    }
                }
                Ok::<_, TrustchainError>(verified)
            })
            .await
    }

    /// Check one user entry against the state of its user just before it.
    async fn verify_user_entry(&self, user: Option<&User>, entry: &UserEntry) -> Result<()> {
        match entry {
            UserEntry::DeviceCreation(creation) => {
                if creation.author.is_trustchain(&self.trustchain_id) {
                    let key = self.store.trustchain_public_key().await?.ok_or_else(|| {
                        TrustchainError::Internal("trust chain public key is not set".into())
                    })?;
                    validation::verify_device_creation(creation, Author::Trustchain(&key), user)?;
                } else {
                    let user = user.ok_or(ValidationError::UnknownAuthor)?;
                    let author = user
                        .device(&creation.author)
                        .ok_or(ValidationError::UnknownAuthor)?;
                    validation::verify_device_creation(creation, Author::Device(author), Some(user))?;
                }
            }
            UserEntry::DeviceRevocation { user_id, entry } => {
                let user = user.ok_or_else(|| {
                    TrustchainError::Internal(format!(
                        "cannot revoke a device of unknown user {}",
                        user_id
                    ))
                })?;
                let author = user
                    .device(&entry.author)
                    .ok_or(ValidationError::UnknownAuthor)?;
                validation::verify_device_revocation(entry, author, user)?;
            }
        }
        Ok(())
    }
}

/// The fields author resolution needs from any entry.
#[derive(Debug, Clone, Copy)]
struct EntryRef {
    hash: Blake3Hash,
    author: DeviceId,
    index: u64,
}

impl EntryRef {
    fn from_claim(entry: &ProvisionalIdentityClaimEntry) -> Self {
        Self {
            hash: entry.hash,
            author: entry.author,
            index: entry.index,
        }
    }
}

/// Split off the earliest pending entry of every user.
///
/// `entries` must be sorted by user then index.
fn take_one_entry_per_user(entries: Vec<UserEntry>) -> (Vec<UserEntry>, Vec<UserEntry>) {
    let mut first = Vec::new();
    let mut remaining = Vec::new();
    let mut previous: Option<UserId> = None;
    for entry in entries {
        let user_id = entry.user_id();
        if previous == Some(user_id) {
            remaining.push(entry);
        } else {
            previous = Some(user_id);
            first.push(entry);
        }
    }
    (first, remaining)
}

/// State of one queued task: resolved users, memoized by
/// `(user_id, before_index)` until an entry of that user is applied.
struct VerificationPass<'a, S> {
    verifier: &'a VerifierInner<S>,
    resolved: HashMap<(UserId, Option<u64>), Option<User>>,
}

impl<'a, S: VerifierStore> VerificationPass<'a, S> {
    fn new(verifier: &'a VerifierInner<S>) -> Self {
        Self {
            verifier,
            resolved: HashMap::new(),
        }
    }

    fn store(&self) -> &'a S {
        &self.verifier.store
    }

    fn invalidate(&mut self, user_id: &UserId) {
        self.resolved.retain(|(id, _), _| id != user_id);
    }

    /// The user as of `before_index`: stored state with every pending entry
    /// below that index verified and applied.
    async fn resolve_user(
        &mut self,
        user_id: UserId,
        before_index: Option<u64>,
    ) -> Result<Option<User>> {
        if let Some(user) = self.resolved.get(&(user_id, before_index)) {
            return Ok(user.clone());
        }
        let stored = self.store().find_user(&user_id).await?;
        let user = self.process_user(user_id, stored, before_index).await?;
        self.resolved.insert((user_id, before_index), user.clone());
        Ok(user)
    }

    /// Fold the pending entries of `user_id` below `before_index` into
    /// `maybe_user`, verifying each one first.
    async fn process_user(
        &mut self,
        user_id: UserId,
        maybe_user: Option<User>,
        before_index: Option<u64>,
    ) -> Result<Option<User>> {
        let mut user = maybe_user;
        let pending = self
            .store()
            .find_unverified_user_entries(&[user_id], before_index)
            .await?;

        for entry in pending {
            match self.verifier.verify_user_entry(user.as_ref(), &entry).await {
                Ok(()) => {
                    user = Some(self.store().apply_entry(&entry).await?);
                    debug!(index = entry.index(), %user_id, "pending user entry applied");
                }
                Err(TrustchainError::InvalidBlock(e)) if self.verifier.config.drop_invalid_entries => {
                    warn!(
                        code = e.code(),
                        index = entry.index(),
                        %user_id,
                        error = %e,
                        "dropping invalid pending entry"
                    );
                }
                Err(e) => return Err(e),
            }
            self.store()
                .remove_verified_user_entries(std::slice::from_ref(&entry))
                .await?;
            self.invalidate(&user_id);
        }
        Ok(user)
    }

    /// Verify `entry` against `user`, apply it, and drop it from the pending set.
    async fn verify_and_apply(&mut self, user: Option<User>, entry: UserEntry) -> Result<User> {
        let result = self.verifier.verify_user_entry(user.as_ref(), &entry).await;
        if let Err(TrustchainError::InvalidBlock(_)) = &result {
            if self.verifier.config.drop_invalid_entries {
                self.store()
                    .remove_verified_user_entries(std::slice::from_ref(&entry))
                    .await?;
            }
        }
        result?;

        let user = self.store().apply_entry(&entry).await?;
        self.store()
            .remove_verified_user_entries(std::slice::from_ref(&entry))
            .await?;
        self.invalidate(&entry.user_id());
        Ok(user)
    }

    /// Map each entry's hash to its author device, when the author exists
    /// and was not revoked at the entry's index.
    ///
    /// Pending creations of the referenced authors are verified first.
    async fn get_verified_authors_by_hash(
        &mut self,
        entries: &[EntryRef],
    ) -> Result<HashMap<Blake3Hash, Device>> {
        let author_ids: Vec<DeviceId> = entries.iter().map(|e| e.author).collect();
        let mut pending = self
            .store()
            .find_unverified_devices_by_hash(&author_ids)
            .await?;
        pending.sort_by_key(|creation| creation.index);

        for creation in pending {
            let user_id = creation.payload.user_id;
            let index = creation.index;
            let user = self.resolve_user(user_id, Some(index)).await?;
            match self
                .verify_and_apply(user, UserEntry::DeviceCreation(creation))
                .await
            {
                Ok(_) => {}
                Err(TrustchainError::InvalidBlock(e)) => {
                    warn!(code = e.code(), index, error = %e, "invalid author device creation");
                }
                Err(e) => return Err(e),
            }
        }

        let found = self.store().find_devices(&author_ids).await?;
        Ok(entries
            .iter()
            .filter_map(|entry| {
                found
                    .get(&entry.author)
                    .filter(|author| author.is_valid_at(entry.index))
                    .map(|author| (entry.hash, author.clone()))
            })
            .collect())
    }
}
