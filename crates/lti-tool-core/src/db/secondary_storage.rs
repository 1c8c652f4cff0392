// Secondary storage trait: an abstract key-value store with TTL used for
// pending login states, nonce tombstones, cached launches, and short-lived
// service access tokens.

use async_trait::async_trait;

/// A secondary key-value storage backend.
///
/// Implementations must support TTL-based expiration, and `take` must be
/// atomic with respect to concurrent callers: exactly one of two racing
/// `take` calls for the same key observes the value. Single-use state and
/// nonce consumption depend on that guarantee.
#[async_trait]
pub trait SecondaryStorage: Send + Sync + std::fmt::Debug {
    /// Get a value by key. Returns `None` if the key doesn't exist or has
    /// expired.
    async fn get(&self, key: &str) -> Result<Option<String>, SecondaryStorageError>;

    /// Set a key-value pair with an optional TTL in seconds.
    /// If `ttl` is `None`, the entry never expires.
    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<u64>,
    ) -> Result<(), SecondaryStorageError>;

    /// Atomically get and delete a value. Returns `None` when the key is
    /// absent, expired, or already consumed by a concurrent `take`.
    async fn take(&self, key: &str) -> Result<Option<String>, SecondaryStorageError>;

    /// Delete a key.
    async fn delete(&self, key: &str) -> Result<(), SecondaryStorageError>;
}

/// Errors from secondary storage operations.
#[derive(Debug, thiserror::Error)]
pub enum SecondaryStorageError {
    #[error("Secondary storage operation failed: {0}")]
    OperationFailed(String),
}

impl From<SecondaryStorageError> for crate::error::LtiToolError {
    fn from(err: SecondaryStorageError) -> Self {
        Self::Database(err.to_string())
    }
}

/// An in-memory secondary storage backed by a HashMap with TTL.
///
/// Suitable for development, testing, and single-server deployments. The
/// single mutex makes `take` trivially atomic; multi-server setups need a
/// shared backend with an equivalent compare-and-delete primitive.
#[derive(Debug, Default)]
pub struct MemorySecondaryStorage {
    store: std::sync::Mutex<std::collections::HashMap<String, MemoryEntry>>,
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<std::time::Instant>,
}

impl MemoryEntry {
    fn expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| std::time::Instant::now() >= at)
    }
}

impl MemorySecondaryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecondaryStorage for MemorySecondaryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, SecondaryStorageError> {
        let mut store = self.store.lock().unwrap();
        match store.get(key) {
            Some(entry) if entry.expired() => {
                store.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<u64>,
    ) -> Result<(), SecondaryStorageError> {
        let mut store = self.store.lock().unwrap();
        let expires_at =
            ttl.map(|secs| std::time::Instant::now() + std::time::Duration::from_secs(secs));
        store.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, SecondaryStorageError> {
        let mut store = self.store.lock().unwrap();
        match store.remove(key) {
            Some(entry) if entry.expired() => Ok(None),
            Some(entry) => Ok(Some(entry.value)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), SecondaryStorageError> {
        let mut store = self.store.lock().unwrap();
        store.remove(key);
        Ok(())
    }
}
