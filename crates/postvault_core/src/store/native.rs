//! Directory-backed blob store.

use std::fs;
use std::io::Result;
use std::path::{Path, PathBuf};

use super::{BlobStore, BoxFuture};

/// Blob store that maps keys onto files under a root directory.
///
/// A key like `generations/daily-2026-03-01.json` becomes
/// `<root>/generations/daily-2026-03-01.json`. Writes create missing parent
/// directories. I/O is plain `std::fs`; the async surface exists to satisfy
/// the [`BlobStore`] port, matching stores whose medium is inherently async.
#[derive(Debug, Clone)]
pub struct DirBlobStore {
    root: PathBuf,
}

impl DirBlobStore {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory this store writes under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in key.split('/').filter(|p| !p.is_empty() && *p != "..") {
            path.push(part);
        }
        path
    }
}

impl BlobStore for DirBlobStore {
    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move { self.path_for(key).exists() })
    }

    fn read<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move { fs::read(self.path_for(key)) })
    }

    fn write<'a>(&'a self, key: &'a str, bytes: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let path = self.path_for(key);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, bytes)
        })
    }

    fn mkdir<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { fs::create_dir_all(self.path_for(key)) })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { fs::remove_file(self.path_for(key)) })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let dir = self.path_for(prefix);
            let mut keys = Vec::new();
            if dir.is_dir() {
                for entry in fs::read_dir(&dir)? {
                    let entry = entry?;
                    if entry.path().is_file() {
                        let name = entry.file_name().to_string_lossy().into_owned();
                        let prefix = prefix.trim_end_matches('/');
                        if prefix.is_empty() {
                            keys.push(name);
                        } else {
                            keys.push(format!("{}/{}", prefix, name));
                        }
                    }
                }
            }
            keys.sort();
            Ok(keys)
        })
    }
}
