//! SQLite store for the data that must survive restarts: the trust chain
//! root key and encrypted resource keys.
//!
//! Uses rusqlite with bundled SQLite, wrapped in async via
//! `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use trustcore_core::Ed25519PublicKey;
use trustcore_protect::ResourceId;

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{ResourceKeyBackend, TrustchainStore};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations run on the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&conn)
        })
        .await?
    }
}

#[async_trait]
impl TrustchainStore for SqliteStore {
    async fn trustchain_public_key(&self) -> Result<Option<Ed25519PublicKey>> {
        self.with_conn(|conn| {
            let bytes: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT public_signature_key FROM trustchain WHERE id = 0",
                    [],
                    |row| row.get(0),
                )
                .optional()?;

            bytes
                .map(|bytes| {
                    <[u8; 32]>::try_from(bytes.as_slice())
                        .map(Ed25519PublicKey)
                        .map_err(|_| {
                            StoreError::InvalidData(format!(
                                "trustchain key has {} bytes",
                                bytes.len()
                            ))
                        })
                })
                .transpose()
        })
        .await
    }

    async fn set_trustchain_public_key(&self, key: &Ed25519PublicKey) -> Result<()> {
        let key = *key;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO trustchain (id, public_signature_key) VALUES (0, ?1)
                 ON CONFLICT(id) DO UPDATE SET public_signature_key = excluded.public_signature_key",
                params![key.as_bytes().as_slice()],
            )?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ResourceKeyBackend for SqliteStore {
    async fn get_encrypted_key(&self, resource_id: &ResourceId) -> Result<Option<Vec<u8>>> {
        let resource_id = *resource_id;
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT encrypted_key FROM resource_keys WHERE resource_id = ?1",
                    params![resource_id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    async fn put_encrypted_key_if_absent(
        &self,
        resource_id: &ResourceId,
        encrypted_key: Vec<u8>,
    ) -> Result<bool> {
        let resource_id = *resource_id;
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO resource_keys (resource_id, encrypted_key) VALUES (?1, ?2)",
                params![resource_id.as_bytes().as_slice(), encrypted_key],
            )?;
            Ok(inserted == 1)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trustchain_key_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        assert!(store.trustchain_public_key().await.unwrap().is_none());

        let key = Ed25519PublicKey([9; 32]);
        store.set_trustchain_public_key(&key).await.unwrap();
        store.set_trustchain_public_key(&key).await.unwrap();
        assert_eq!(store.trustchain_public_key().await.unwrap(), Some(key));
    }

    #[tokio::test]
    async fn test_resource_key_insert_or_ignore() {
        let store = SqliteStore::open_memory().unwrap();
        let id = ResourceId([3; 16]);

        assert!(store.get_encrypted_key(&id).await.unwrap().is_none());
        assert!(store
            .put_encrypted_key_if_absent(&id, vec![1, 2, 3])
            .await
            .unwrap());
        assert!(!store
            .put_encrypted_key_if_absent(&id, vec![4, 5, 6])
            .await
            .unwrap());
        assert_eq!(
            store.get_encrypted_key(&id).await.unwrap(),
            Some(vec![1, 2, 3])
        );
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trustcore.db");
        let id = ResourceId([5; 16]);

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .put_encrypted_key_if_absent(&id, vec![7; 8])
                .await
                .unwrap();
            store
                .set_trustchain_public_key(&Ed25519PublicKey([1; 32]))
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get_encrypted_key(&id).await.unwrap(), Some(vec![7; 8]));
        assert_eq!(
            store.trustchain_public_key().await.unwrap(),
            Some(Ed25519PublicKey([1; 32]))
        );
    }
}
