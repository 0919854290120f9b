//! Diff-only snapshots ("incrementals") anchored to a base backup.

use std::sync::Arc;

use uuid::Uuid;

use super::record::{BackupBlob, BackupDetail, BackupRecord, MetadataChangeSummary};
use crate::checksum::sha256_hex;
use crate::clock::Clock;
use crate::diff::{calculate_diffs, PostDiff};
use crate::post::Archive;
use crate::store::{keys, BlobStore};

/// Writes and reads diff-only snapshot blobs.
pub struct IncrementalManager {
    store: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
}

impl IncrementalManager {
    /// Create a manager over the given store and clock.
    pub fn new(store: Arc<dyn BlobStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Capture the diff between `previous` and `current`, anchored to
    /// `base_backup_id`.
    ///
    /// Returns `None` when there is nothing to back up: no post diffs and
    /// no tracked metadata change (profile, governance map, scheduled
    /// count). A skipped save is not an error and is not logged as one.
    /// Write failures also yield `None`, logged.
    pub async fn create(
        &self,
        current: &Archive,
        previous: &Archive,
        base_backup_id: &str,
    ) -> Option<BackupRecord> {
        let now = self.clock.now();
        let diffs = calculate_diffs(&previous.posts, &current.posts, now);
        let metadata = MetadataChangeSummary::between(previous, current);

        if diffs.is_empty() && !metadata.any() {
            return None;
        }

        let diff_byte_size = match serde_json::to_vec(&diffs) {
            Ok(bytes) => bytes.len() as u64,
            Err(e) => {
                log::warn!("failed to encode diff set: {}", e);
                return None;
            }
        };

        let changed_count = diffs.len();
        let id = Uuid::new_v4().to_string();
        let storage_key = keys::incremental(&id);
        let blob = BackupBlob::Incremental {
            timestamp: now,
            base_backup_id: base_backup_id.to_string(),
            diffs,
            metadata_change_summary: metadata,
        };
        let bytes = match serde_json::to_vec(&blob) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("failed to encode incremental snapshot: {}", e);
                return None;
            }
        };

        if let Err(e) = self.store.mkdir(keys::INCREMENTAL_DIR).await {
            log::warn!("failed to prepare incremental storage: {}", e);
            return None;
        }
        if let Err(e) = self.store.write(&storage_key, &bytes).await {
            log::warn!("failed to write incremental snapshot '{}': {}", storage_key, e);
            return None;
        }

        log::debug!(
            "captured incremental '{}' on base '{}' ({} change(s))",
            id,
            base_backup_id,
            changed_count
        );

        Some(BackupRecord {
            id,
            storage_key,
            created_at: now,
            byte_size: bytes.len() as u64,
            checksum: sha256_hex(&bytes),
            detail: BackupDetail::Incremental {
                base_backup_id: base_backup_id.to_string(),
                changed_count,
                diff_byte_size,
            },
        })
    }

    /// Load the diff set of an incremental record.
    ///
    /// Returns `None` on any structural or I/O failure.
    pub async fn load(&self, record: &BackupRecord) -> Option<Vec<PostDiff>> {
        let bytes = match self.store.read(&record.storage_key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("cannot read incremental blob '{}': {}", record.storage_key, e);
                return None;
            }
        };

        match serde_json::from_slice::<BackupBlob>(&bytes) {
            Ok(BackupBlob::Incremental { diffs, .. }) => Some(diffs),
            Ok(BackupBlob::Generation { .. }) => {
                log::warn!(
                    "blob '{}' is a generation, expected an incremental",
                    record.storage_key
                );
                None
            }
            Err(e) => {
                log::warn!("cannot parse incremental blob '{}': {}", record.storage_key, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_clock::FixedClock;
    use crate::post::Post;
    use crate::store::{block_on_test, MemoryBlobStore};
    use chrono::{DateTime, Utc};

    fn now() -> DateTime<Utc> {
        "2026-03-05T10:00:00Z".parse().unwrap()
    }

    fn manager(store: &MemoryBlobStore) -> IncrementalManager {
        IncrementalManager::new(Arc::new(store.clone()), Arc::new(FixedClock::at(now())))
    }

    fn archive_with(ids: &[&str]) -> Archive {
        let mut archive = Archive::new();
        for id in ids {
            archive.posts.push(Post::new(*id, *id, now()));
        }
        archive
    }

    #[test]
    fn test_no_change_is_a_skip() {
        let store = MemoryBlobStore::new();
        let manager = manager(&store);
        let archive = archive_with(&["a"]);

        block_on_test(async {
            let record = manager.create(&archive, &archive.clone(), "base").await;
            assert!(record.is_none());
            assert!(store.is_empty());
        });
    }

    #[test]
    fn test_metadata_only_change_is_captured() {
        let store = MemoryBlobStore::new();
        let manager = manager(&store);
        let previous = archive_with(&["a"]);
        let mut current = previous.clone();
        current.profile.verified = true;

        block_on_test(async {
            let record = manager.create(&current, &previous, "base").await.unwrap();
            assert_eq!(record.base_backup_id(), Some("base"));
            match record.detail {
                BackupDetail::Incremental { changed_count, .. } => assert_eq!(changed_count, 0),
                _ => panic!("expected incremental detail"),
            }
            // Diff set is empty but the blob records the metadata change.
            let diffs = manager.load(&record).await.unwrap();
            assert!(diffs.is_empty());
        });
    }

    #[test]
    fn test_create_then_load_returns_diffs() {
        let store = MemoryBlobStore::new();
        let manager = manager(&store);
        let previous = archive_with(&["a", "b"]);
        let mut current = archive_with(&["a", "b", "c"]);
        current.posts[0].like_count = 3;

        block_on_test(async {
            let record = manager.create(&current, &previous, "base").await.unwrap();
            match &record.detail {
                BackupDetail::Incremental {
                    changed_count,
                    diff_byte_size,
                    ..
                } => {
                    assert_eq!(*changed_count, 2);
                    assert!(*diff_byte_size > 0);
                    assert!(*diff_byte_size < record.byte_size);
                }
                _ => panic!("expected incremental detail"),
            }

            let diffs = manager.load(&record).await.unwrap();
            assert_eq!(diffs.len(), 2);
            let rebuilt = crate::diff::apply_diffs(&previous.posts, &diffs);
            assert_eq!(rebuilt.len(), current.posts.len());
        });
    }

    #[test]
    fn test_load_fails_soft() {
        let store = MemoryBlobStore::new();
        let manager = manager(&store);
        let previous = archive_with(&["a"]);
        let current = archive_with(&["a", "b"]);

        block_on_test(async {
            let record = manager.create(&current, &previous, "base").await.unwrap();
            store.put_raw(&record.storage_key, b"][".to_vec());
            assert!(manager.load(&record).await.is_none());
        });
    }
}
