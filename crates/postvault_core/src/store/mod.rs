//! Storage port for backup blobs.
//!
//! The engine never touches the filesystem directly: everything goes through
//! the [`BlobStore`] trait, keyed by flat string keys. Key construction is
//! confined to the [`keys`] submodule so the engine proper carries no path
//! logic.
//!
//! ## Object safety
//!
//! `BlobStore` is designed to be object-safe so it can be used behind
//! `dyn BlobStore` (the managers hold `Arc<dyn BlobStore>`). To enable this,
//! all methods return boxed futures.

mod memory;
mod native;

pub use memory::MemoryBlobStore;
pub use native::DirBlobStore;

use std::future::Future;
use std::io::Result;
use std::pin::Pin;

#[cfg(test)]
pub(crate) fn block_on_test<F: Future>(f: F) -> F::Output {
    futures_lite::future::block_on(f)
}

/// A boxed future for object-safe async methods.
///
/// Futures are `Send` for compatibility with multi-threaded runtimes.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Async abstraction over a key/blob store.
///
/// Implementations map keys to whatever medium they persist to: a directory
/// tree, memory, or a host-provided vault. Keys use `/` as the hierarchy
/// separator; [`BlobStore::mkdir`] prepares a hierarchy level and is
/// idempotent.
pub trait BlobStore: Send + Sync {
    /// Check whether a blob exists at `key`.
    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, bool>;

    /// Read the blob at `key`.
    fn read<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>>>;

    /// Write (create or overwrite) the blob at `key`.
    fn write<'a>(&'a self, key: &'a str, bytes: &'a [u8]) -> BoxFuture<'a, Result<()>>;

    /// Prepare the hierarchy level named by `key`. Idempotent.
    fn mkdir<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Remove the blob at `key`.
    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>>;

    /// List the keys of blobs stored under `prefix`.
    fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;
}

/// Write a blob, retrying transient failures.
///
/// Each failed attempt is logged; the last error is returned once `attempts`
/// is exhausted.
pub async fn write_with_retry(
    store: &dyn BlobStore,
    key: &str,
    bytes: &[u8],
    attempts: u32,
) -> Result<()> {
    let mut last_err = None;
    for attempt in 1..=attempts.max(1) {
        match store.write(key, bytes).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                log::warn!(
                    "write of '{}' failed (attempt {}/{}): {}",
                    key,
                    attempt,
                    attempts.max(1),
                    e
                );
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::Other, "write failed with no attempts")
    }))
}

/// Key construction for everything the engine persists.
///
/// This is the only place keys are assembled; adapters translate them to
/// their medium (e.g. [`DirBlobStore`] maps them onto a directory tree).
pub mod keys {
    /// The backup index/manifest blob.
    pub const INDEX: &str = "backup-index.json";

    /// The commit chain HEAD pointer (a bare commit id).
    pub const HEAD: &str = "HEAD";

    /// Hierarchy level for generation snapshots.
    pub const GENERATION_DIR: &str = "generations";

    /// Hierarchy level for incremental snapshots.
    pub const INCREMENTAL_DIR: &str = "incrementals";

    /// Hierarchy level for commit blobs.
    pub const COMMIT_DIR: &str = "commits";

    /// Key of a generation snapshot: one blob per `(sub_kind, period)`.
    pub fn generation(sub_kind: &str, period: &str) -> String {
        format!("{}/{}-{}.json", GENERATION_DIR, sub_kind, period)
    }

    /// Key of an incremental snapshot.
    pub fn incremental(id: &str) -> String {
        format!("{}/{}.json", INCREMENTAL_DIR, id)
    }

    /// Key of a commit blob.
    pub fn commit(id: &str) -> String {
        format!("{}/{}.json", COMMIT_DIR, id)
    }

    /// Recover a commit id from its storage key, if the key names one.
    pub fn commit_id_from_key(key: &str) -> Option<&str> {
        key.strip_prefix(COMMIT_DIR)
            .and_then(|rest| rest.strip_prefix('/'))
            .and_then(|name| name.strip_suffix(".json"))
    }
}
