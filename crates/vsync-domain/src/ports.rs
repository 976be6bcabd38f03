//! Trait boundaries between the use-case layer and concrete transports.
//! Application code depends only on these traits; `vsync-providers`
//! supplies the HTTP-backed implementations.

use async_trait::async_trait;

use crate::error::Error;

/// KV-v2 style metadata for a single secret path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretMeta {
    /// The store's current version number for this path.
    pub current_version: i64,
    /// RFC-3339-nano update time of the current version.
    pub updated_time: String,
    /// Non-empty when the current version has been soft-deleted.
    pub deletion_time: String,
    /// True when the current version has been permanently destroyed.
    pub destroyed: bool,
}

/// Result of listing a namespace path: leaf secret names and subfolder
/// names (each ending in `/`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub paths: Vec<String>,
    pub folders: Vec<String>,
}

/// Capability bits used by permission pre-checks, composed the same way
/// at call sites: `Checks::READ | Checks::LIST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checks(u8);

impl Checks {
    pub const READ: Checks = Checks(1 << 0);
    pub const WRITE: Checks = Checks(1 << 1);
    pub const LIST: Checks = Checks(1 << 2);
    pub const DELETE: Checks = Checks(1 << 3);
    pub const STD: Checks = Checks(Self::READ.0 | Self::WRITE.0 | Self::LIST.0 | Self::DELETE.0);

    pub fn contains(self, other: Checks) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Checks {
    type Output = Checks;
    fn bitor(self, rhs: Checks) -> Checks {
        Checks(self.0 | rhs.0)
    }
}

/// A versioned secret store: origin reads from it, destination reads and
/// writes to it. Modeled on a KV-v2 style secret engine.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch raw secret data at `data_path`.
    async fn read(&self, data_path: &str) -> Result<serde_json::Value, Error>;

    /// Write raw secret data at `data_path`.
    async fn write(&self, data_path: &str, data: &serde_json::Value) -> Result<(), Error>;

    /// Permanently delete the secret at `data_path`.
    async fn delete(&self, data_path: &str) -> Result<(), Error>;

    /// Fetch KV-v2 metadata at `meta_path`.
    async fn read_meta(&self, meta_path: &str) -> Result<SecretMeta, Error>;

    /// List the immediate children of `meta_path`.
    async fn list(&self, meta_path: &str) -> Result<Listing, Error>;

    /// True if `mount` is a KV-v2 secrets engine.
    async fn is_kv_v2(&self, mount: &str) -> Result<bool, Error>;

    /// Verify the current token has the requested capabilities at
    /// `data_path`, probing with a throwaway write/list/read/delete cycle.
    async fn check_permissions(&self, data_path: &str, checks: Checks) -> Result<(), Error>;

    /// Remaining TTL, in seconds, of the current token.
    async fn token_ttl(&self) -> Result<i64, Error>;

    /// Renew the current token for `ttl` seconds, returning the new token.
    async fn renew_token(&self, ttl: i64) -> Result<String, Error>;

    /// Swap the token used for subsequent requests.
    fn set_token(&self, token: String);
}

/// A coordination store used to publish and observe sync info between
/// origin and destination. Modeled on a Consul-style key/value store with
/// blocking reads.
#[async_trait]
pub trait CoordStore: Send + Sync {
    /// Fetch the raw value at `key`, if present, along with its modify
    /// index for use with [`CoordStore::watch`].
    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, u64)>, Error>;

    /// Store `value` at `key`.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), Error>;

    /// Remove `key`.
    async fn delete(&self, key: &str) -> Result<(), Error>;

    /// List the keys under `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, Error>;

    /// Block until `key`'s modify index changes from `since_index`, then
    /// return the new index. A return without an intervening change (long
    /// poll timeout) is signaled by returning the same index unchanged.
    async fn watch(&self, key: &str, since_index: u64) -> Result<u64, Error>;

    /// Verify connectivity and required capabilities at `path`, probing
    /// with a throwaway write/list/get/delete cycle.
    async fn check_permissions(&self, path: &str, checks: Checks) -> Result<(), Error>;

    /// True if `path` has at least one key underneath it already.
    async fn is_initialized(&self, path: &str) -> Result<bool, Error>;
}

/// In-memory port doubles for use-case tests. Not built into release
/// binaries.
#[cfg(feature = "test-utils")]
pub mod test_support {
    use std::sync::Arc;

    use tokio::sync::Mutex;

    use super::*;

    /// An in-memory [`CoordStore`] double backed by a sorted map.
    #[derive(Default)]
    pub struct MemoryCoordStore {
        data: Mutex<std::collections::BTreeMap<String, (Vec<u8>, u64)>>,
        next_index: std::sync::atomic::AtomicU64,
    }

    impl MemoryCoordStore {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }
    }

    #[async_trait]
    impl CoordStore for MemoryCoordStore {
        async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, u64)>, Error> {
            Ok(self.data.lock().await.get(key).cloned())
        }

        async fn put(&self, key: &str, value: &[u8]) -> Result<(), Error> {
            let index = self
                .next_index
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
                + 1;
            self.data
                .lock()
                .await
                .insert(key.to_owned(), (value.to_vec(), index));
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<(), Error> {
            self.data.lock().await.remove(key);
            Ok(())
        }

        async fn list(&self, prefix: &str) -> Result<Vec<String>, Error> {
            Ok(self
                .data
                .lock()
                .await
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }

        async fn watch(&self, key: &str, since_index: u64) -> Result<u64, Error> {
            let current = self
                .data
                .lock()
                .await
                .get(key)
                .map(|(_, idx)| *idx)
                .unwrap_or(since_index);
            Ok(current)
        }

        async fn check_permissions(&self, _path: &str, _checks: Checks) -> Result<(), Error> {
            Ok(())
        }

        async fn is_initialized(&self, path: &str) -> Result<bool, Error> {
            Ok(!self.list(path).await?.is_empty())
        }
    }

    #[tokio::test]
    async fn memory_coord_store_round_trips() {
        let store = MemoryCoordStore::new();
        store.put("vsync/origin/index", b"abc").await.unwrap();
        let (value, index) = store.get("vsync/origin/index").await.unwrap().unwrap();
        assert_eq!(value, b"abc");
        assert!(index > 0);
    }
}
