//! Test fixtures and helpers.
//!
//! [`TrustchainFixture`] plays the server side of a trust chain: it owns the
//! root key, hands out global indexes, and produces correctly signed entries
//! for users, devices, revocations and claims.

use trustcore_core::crypto::sizes::{SEALED_KEY_PAIR_SIZE, SEALED_KEY_SIZE};
use trustcore_core::entry::{claim_message, delegation_message};
use trustcore_core::{
    Block, BlockBuilder, DeviceCreationRecord, DeviceId, DeviceRevocationRecord, Keypair,
    ProvisionalIdentityClaimEntry, ProvisionalIdentityClaimRecord, Record, SealedKeyForDevice,
    TrustchainCreationEntry, TrustchainCreationRecord, TrustchainId, UserEntry, UserId,
    UserKeyPair, X25519PublicKey,
};
use trustcore_protect::{seal, X25519StaticSecret};

/// A device as known to its owner: id and private keys.
pub struct TestDevice {
    pub device_id: DeviceId,
    pub signature_keypair: Keypair,
    pub encryption_key: X25519StaticSecret,
    pub revoked_at: Option<u64>,
}

/// A user as known to its owner.
pub struct TestUser {
    pub user_id: UserId,
    /// Current user key.
    pub user_key: X25519StaticSecret,
    pub devices: Vec<TestDevice>,
}

impl TestUser {
    pub fn device(&self, device_id: &DeviceId) -> &TestDevice {
        self.devices
            .iter()
            .find(|d| d.device_id == *device_id)
            .expect("device belongs to the user")
    }

    /// Id of the device at `position` in creation order.
    pub fn device_id(&self, position: usize) -> DeviceId {
        self.devices[position].device_id
    }

    pub fn user_public_key(&self) -> X25519PublicKey {
        self.user_key.public_key()
    }
}

/// A trust chain under construction.
pub struct TrustchainFixture {
    pub trustchain_id: TrustchainId,
    pub root_keypair: Keypair,
    root: Block,
    log: Vec<Block>,
    next_index: u64,
}

impl TrustchainFixture {
    /// Create a trust chain with a random root key.
    pub fn new() -> Self {
        Self::with_root_keypair(Keypair::generate())
    }

    /// Create a trust chain with a deterministic root key.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self::with_root_keypair(Keypair::from_seed(&seed))
    }

    fn with_root_keypair(root_keypair: Keypair) -> Self {
        let record = TrustchainCreationRecord {
            public_signature_key: root_keypair.public_key(),
        };
        let hash = BlockBuilder::new(TrustchainId::ZERO, 1, DeviceId::ZERO)
            .record(&record)
            .hash();
        let trustchain_id = TrustchainId(hash.0);
        let root = BlockBuilder::new(trustchain_id, 1, DeviceId::ZERO)
            .record(&record)
            .unsigned();

        Self {
            trustchain_id,
            root_keypair,
            log: vec![root.clone()],
            root,
            next_index: 2,
        }
    }

    /// The trust chain creation block.
    pub fn root_block(&self) -> &Block {
        &self.root
    }

    pub fn root_entry(&self) -> TrustchainCreationEntry {
        self.root
            .to_typed_entry()
            .expect("root block decodes")
    }

    /// Every block produced so far, in index order.
    pub fn log(&self) -> &[Block] {
        &self.log
    }

    /// Reserve the next global index.
    pub fn next_index(&mut self) -> u64 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    /// Create a user with one device, signed by the trust chain root.
    pub fn create_user(&mut self) -> (TestUser, UserEntry) {
        let user_id = UserId(rand::random());
        let user_key = X25519StaticSecret::generate();
        let author = DeviceId::from(self.trustchain_id);
        let root_keypair = self.root_keypair.clone();
        let (device, block) = self.device_creation(user_id, &user_key, author, &root_keypair);

        let entry = creation_entry(&block);
        self.log.push(block);
        let user = TestUser {
            user_id,
            user_key,
            devices: vec![device],
        };
        (user, entry)
    }

    /// Add a device to `user`, delegated by its device `author`.
    pub fn add_device(&mut self, user: &mut TestUser, author: &DeviceId) -> UserEntry {
        let delegating = user.device(author).signature_keypair.clone();
        let (device, block) = self.device_creation(user.user_id, &user.user_key, *author, &delegating);

        let entry = creation_entry(&block);
        self.log.push(block);
        user.devices.push(device);
        entry
    }

    /// Revoke `target`, authored by `author`. Rotates the user key and seals
    /// it for every remaining active device.
    pub fn revoke_device(
        &mut self,
        user: &mut TestUser,
        author: &DeviceId,
        target: &DeviceId,
    ) -> UserEntry {
        let index = self.next_index();
        let new_user_key = X25519StaticSecret::generate();

        let sealed_keys_for_devices = user
            .devices
            .iter()
            .filter(|d| d.revoked_at.is_none() && d.device_id != *target)
            .map(|d| SealedKeyForDevice {
                recipient: d.device_id,
                sealed_private_key: seal_fixed(
                    &new_user_key.to_bytes(),
                    &d.encryption_key.public_key(),
                ),
            })
            .collect();

        let record = DeviceRevocationRecord {
            device_id: *target,
            public_encryption_key: new_user_key.public_key(),
            previous_public_encryption_key: user.user_key.public_key(),
            sealed_previous_private_key: seal_fixed(
                &user.user_key.to_bytes(),
                &new_user_key.public_key(),
            ),
            sealed_keys_for_devices,
        };
        let block = BlockBuilder::new(self.trustchain_id, index, *author)
            .record(&record)
            .sign(&user.device(author).signature_keypair);

        let entry = UserEntry::DeviceRevocation {
            user_id: user.user_id,
            entry: block.to_typed_entry().expect("revocation block decodes"),
        };
        self.log.push(block);

        if let Some(device) = user.devices.iter_mut().find(|d| d.device_id == *target) {
            device.revoked_at = Some(index);
        }
        user.user_key = new_user_key;
        entry
    }

    /// A provisional identity claim by `author` for its own user.
    pub fn claim(&mut self, user: &TestUser, author: &DeviceId) -> ProvisionalIdentityClaimEntry {
        let index = self.next_index();
        let app = Keypair::generate();
        let tanker = Keypair::generate();
        let message = claim_message(author, &app.public_key(), &tanker.public_key());

        let mut private_keys = [0u8; 64];
        private_keys[..32].copy_from_slice(&X25519StaticSecret::generate().to_bytes());
        private_keys[32..].copy_from_slice(&X25519StaticSecret::generate().to_bytes());
        let sealed = seal(&private_keys, &user.user_public_key()).expect("seal succeeds");

        let record = ProvisionalIdentityClaimRecord {
            user_id: user.user_id,
            app_signature_public_key: app.public_key(),
            tanker_signature_public_key: tanker.public_key(),
            author_signature_by_app_key: app.sign(&message),
            author_signature_by_tanker_key: tanker.sign(&message),
            recipient_user_public_key: user.user_public_key(),
            sealed_private_keys: <[u8; SEALED_KEY_PAIR_SIZE]>::try_from(sealed.as_slice())
                .expect("sealed key pair size"),
        };
        let block = BlockBuilder::new(self.trustchain_id, index, *author)
            .record(&record)
            .sign(&user.device(author).signature_keypair);

        let entry = block.to_typed_entry().expect("claim block decodes");
        self.log.push(block);
        entry
    }

    /// Sign an arbitrary record as `author` at the next index.
    pub fn sign_record<R: Record>(&mut self, author: DeviceId, keypair: &Keypair, record: &R) -> Block {
        let index = self.next_index();
        let block = BlockBuilder::new(self.trustchain_id, index, author)
            .record(record)
            .sign(keypair);
        self.log.push(block.clone());
        block
    }

    fn device_creation(
        &mut self,
        user_id: UserId,
        user_key: &X25519StaticSecret,
        author: DeviceId,
        delegating: &Keypair,
    ) -> (TestDevice, Block) {
        let index = self.next_index();
        let ephemeral = Keypair::generate();
        let signature_keypair = Keypair::generate();
        let encryption_key = X25519StaticSecret::generate();

        let record = DeviceCreationRecord {
            ephemeral_public_signature_key: ephemeral.public_key(),
            user_id,
            delegation_signature: delegating
                .sign(&delegation_message(&ephemeral.public_key(), &user_id)),
            public_signature_key: signature_keypair.public_key(),
            public_encryption_key: encryption_key.public_key(),
            user_key_pair: UserKeyPair {
                public_encryption_key: user_key.public_key(),
                sealed_private_encryption_key: seal_fixed(
                    &user_key.to_bytes(),
                    &encryption_key.public_key(),
                ),
            },
            is_ghost_device: false,
        };
        let block = BlockBuilder::new(self.trustchain_id, index, author)
            .record(&record)
            .sign(&ephemeral);

        let device = TestDevice {
            device_id: DeviceId(block.hash().0),
            signature_keypair,
            encryption_key,
            revoked_at: None,
        };
        (device, block)
    }
}

impl Default for TrustchainFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a device creation block as a user entry.
pub fn creation_entry(block: &Block) -> UserEntry {
    UserEntry::DeviceCreation(block.to_typed_entry().expect("device creation block decodes"))
}

fn seal_fixed(private_key: &[u8; 32], recipient: &X25519PublicKey) -> [u8; SEALED_KEY_SIZE] {
    let sealed = seal(private_key, recipient).expect("seal succeeds");
    <[u8; SEALED_KEY_SIZE]>::try_from(sealed.as_slice()).expect("sealed key size")
}
