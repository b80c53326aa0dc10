//! Remote object store boundary
//!
//! The shipper only needs two capabilities from the remote side: an existence
//! probe and a whole-object upload. Transport, authentication and retries
//! live behind the [`RemoteStore`] trait; implementations may block on
//! network I/O.
//!
//! Object paths are namespaced as `<blockID>/<filename>`, with forward
//! slashes regardless of the local platform. The block manifest lives at
//! `<blockID>/manifest.json` and doubles as the block's remote presence
//! marker: the shipper uploads it last, so a manifest that exists implies a
//! complete block.

use crate::error::{Result, ShipperError};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Minimal capability set the shipper requires of a remote object store
pub trait RemoteStore: Send + Sync {
    /// Check whether an object exists at `path`
    fn exists(&self, path: &str) -> Result<bool>;

    /// Upload `content` as the object at `path`, replacing any previous one
    fn upload(&self, path: &str, content: &[u8]) -> Result<()>;
}

/// In-memory [`RemoteStore`] implementation
///
/// Backs the test suite and serves as a reference implementation. Besides
/// the object map it keeps an append-only log of upload paths, which lets
/// tests assert the manifest-last ordering invariant.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    upload_log: RwLock<Vec<String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed an object without going through the upload path
    ///
    /// Useful for simulating objects uploaded by an earlier process.
    pub fn insert(&self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.objects.write().insert(path.into(), content.into());
    }

    /// Fetch an object's content, if present
    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.read().get(path).cloned()
    }

    /// Remove an object, returning whether it existed
    pub fn remove(&self, path: &str) -> bool {
        self.objects.write().remove(path).is_some()
    }

    /// Number of objects currently stored
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Whether the store holds no objects
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// All object paths in sorted order
    pub fn paths(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    /// Every upload ever performed, in call order (including replacements)
    pub fn uploads(&self) -> Vec<String> {
        self.upload_log.read().clone()
    }
}

impl RemoteStore for MemoryStore {
    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.objects.read().contains_key(path))
    }

    fn upload(&self, path: &str, content: &[u8]) -> Result<()> {
        if path.is_empty() {
            return Err(ShipperError::remote("empty object path"));
        }
        self.objects
            .write()
            .insert(path.to_string(), content.to_vec());
        self.upload_log.write().push(path.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_upload_and_exists() {
        let store = MemoryStore::new();
        assert!(!store.exists("b1/manifest.json").unwrap());

        store.upload("b1/manifest.json", b"{}").unwrap();
        assert!(store.exists("b1/manifest.json").unwrap());
        assert_eq!(store.object("b1/manifest.json").unwrap(), b"{}");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_memory_store_logs_upload_order() {
        let store = MemoryStore::new();
        store.upload("b1/segments/000001", b"a").unwrap();
        store.upload("b1/index", b"b").unwrap();
        store.upload("b1/manifest.json", b"c").unwrap();

        assert_eq!(
            store.uploads(),
            vec!["b1/segments/000001", "b1/index", "b1/manifest.json"]
        );
    }

    #[test]
    fn test_memory_store_rejects_empty_path() {
        let store = MemoryStore::new();
        assert!(store.upload("", b"x").is_err());
    }
}
