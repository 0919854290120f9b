//! In-memory blob store for testing.
//!
//! This provides a simple in-memory implementation of [`BlobStore`] for use
//! in unit tests and development.

use std::collections::HashMap;
use std::io::{Error, ErrorKind, Result};
use std::sync::{Arc, RwLock};

use super::{BlobStore, BoxFuture};

/// In-memory blob store for testing.
///
/// Stores all blobs in a `HashMap` behind an `RwLock`. Cloning shares the
/// same underlying storage. Data is lost when the last clone is dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    /// Keys the store will refuse to write, for failure-path tests.
    poisoned: Arc<RwLock<Vec<String>>>,
}

impl MemoryBlobStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to `key` fail with `PermissionDenied`.
    pub fn poison_key(&self, key: &str) {
        self.poisoned.write().unwrap().push(key.to_string());
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().unwrap().len()
    }

    /// Whether the store holds no blobs.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().unwrap().is_empty()
    }

    /// Overwrite a blob directly, bypassing the async API (test setup).
    pub fn put_raw(&self, key: &str, bytes: Vec<u8>) {
        self.blobs.write().unwrap().insert(key.to_string(), bytes);
    }
}

impl BlobStore for MemoryBlobStore {
    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move { self.blobs.read().unwrap().contains_key(key) })
    }

    fn read<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            self.blobs
                .read()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("no blob at '{}'", key)))
        })
    }

    fn write<'a>(&'a self, key: &'a str, bytes: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.poisoned.read().unwrap().iter().any(|k| k == key) {
                return Err(Error::new(
                    ErrorKind::PermissionDenied,
                    format!("write to '{}' is poisoned", key),
                ));
            }
            self.blobs
                .write()
                .unwrap()
                .insert(key.to_string(), bytes.to_vec());
            Ok(())
        })
    }

    fn mkdir<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<()>> {
        // Flat keyspace: hierarchy levels need no preparation.
        Box::pin(async move { Ok(()) })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match self.blobs.write().unwrap().remove(key) {
                Some(_) => Ok(()),
                None => Err(Error::new(
                    ErrorKind::NotFound,
                    format!("no blob at '{}'", key),
                )),
            }
        })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let mut matches: Vec<String> = self
                .blobs
                .read()
                .unwrap()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect();
            matches.sort();
            Ok(matches)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::block_on_test;

    #[test]
    fn test_write_read_remove() {
        let store = MemoryBlobStore::new();
        block_on_test(async {
            assert!(!store.exists("a.json").await);
            store.write("a.json", b"one").await.unwrap();
            assert!(store.exists("a.json").await);
            assert_eq!(store.read("a.json").await.unwrap(), b"one");
            store.remove("a.json").await.unwrap();
            assert!(!store.exists("a.json").await);
            assert!(store.read("a.json").await.is_err());
        });
    }

    #[test]
    fn test_list_filters_by_prefix() {
        let store = MemoryBlobStore::new();
        block_on_test(async {
            store.write("commits/a.json", b"1").await.unwrap();
            store.write("commits/b.json", b"2").await.unwrap();
            store.write("generations/x.json", b"3").await.unwrap();

            let commits = store.list("commits/").await.unwrap();
            assert_eq!(commits, vec!["commits/a.json", "commits/b.json"]);
        });
    }

    #[test]
    fn test_poisoned_key_fails_writes() {
        let store = MemoryBlobStore::new();
        store.poison_key("bad.json");
        block_on_test(async {
            assert!(store.write("bad.json", b"x").await.is_err());
            store.write("good.json", b"x").await.unwrap();
        });
    }

    #[test]
    fn test_clones_share_storage() {
        let store = MemoryBlobStore::new();
        let clone = store.clone();
        block_on_test(async {
            store.write("shared.json", b"x").await.unwrap();
            assert!(clone.exists("shared.json").await);
        });
    }
}
