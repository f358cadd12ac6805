//! The key-value contract every backend implements.

use peerweave_types::error::PeerweaveResult;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Closure run by [`SnapshotStore::update`]. It receives the current value
/// and returns the value to write, or `None` to leave the key untouched.
pub type ApplyFn<'a> =
    Box<dyn FnOnce(Option<Vec<u8>>) -> PeerweaveResult<Option<Vec<u8>>> + 'a>;

/// Byte-oriented key-value storage.
///
/// [`SnapshotStore::update`] is atomic with respect to every other handle on
/// the same storage, including handles in other processes. A poisoned
/// internal lock is recovered rather than reported.
pub trait SnapshotStore: Send + Sync {
    /// Write `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &[u8]) -> PeerweaveResult<()>;

    /// Read the value under `key`, or `None` if absent.
    fn get(&self, key: &str) -> PeerweaveResult<Option<Vec<u8>>>;

    /// Remove `key`. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> PeerweaveResult<()>;

    /// All keys starting with `prefix`, sorted.
    fn keys(&self, prefix: &str) -> PeerweaveResult<Vec<String>>;

    /// Read `key`, run `apply`, and write its result as one atomic step.
    /// Nothing is written if `apply` fails.
    fn update(&self, key: &str, apply: ApplyFn<'_>) -> PeerweaveResult<()>;
}

/// Process-local store backed by a sorted map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn put(&self, key: &str, value: &[u8]) -> PeerweaveResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> PeerweaveResult<Option<Vec<u8>>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn delete(&self, key: &str) -> PeerweaveResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> PeerweaveResult<Vec<String>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn update(&self, key: &str, apply: ApplyFn<'_>) -> PeerweaveResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(next) = apply(entries.get(key).cloned())? {
            entries.insert(key.to_string(), next);
        }
        Ok(())
    }
}
