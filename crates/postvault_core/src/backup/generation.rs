//! Full periodic snapshots ("generations").

use std::sync::Arc;

use uuid::Uuid;

use super::record::{BackupBlob, BackupDetail, BackupRecord};
use super::{BackupConfig, PeriodKind};
use crate::checksum::sha256_hex;
use crate::clock::Clock;
use crate::post::Archive;
use crate::store::{keys, write_with_retry, BlobStore};

/// Writes, reads, and prunes full snapshot blobs.
///
/// One blob exists per `(period_kind, period)`; creating another for the
/// same key overwrites it.
pub struct GenerationManager {
    store: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
}

impl GenerationManager {
    /// Create a manager over the given store and clock.
    pub fn new(store: Arc<dyn BlobStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Capture a full snapshot of `archive` for the current period of
    /// `kind`.
    ///
    /// Returns `None` on write failure; the failure is logged, never
    /// raised, so a backup problem cannot break the caller's save.
    pub async fn create(
        &self,
        archive: &Archive,
        kind: PeriodKind,
        previous_backup_id: Option<String>,
        config: &BackupConfig,
    ) -> Option<BackupRecord> {
        let now = self.clock.now();
        let period = kind.period_string(now);
        let storage_key = keys::generation(kind.as_str(), &period);

        let blob = BackupBlob::Generation {
            sub_kind: kind,
            timestamp: now,
            period: period.clone(),
            payload: archive.clone(),
        };
        let bytes = match serde_json::to_vec(&blob) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("failed to encode {} generation snapshot: {}", kind, e);
                return None;
            }
        };

        if let Err(e) = self.store.mkdir(keys::GENERATION_DIR).await {
            log::warn!("failed to prepare generation storage: {}", e);
            return None;
        }
        if let Err(e) =
            write_with_retry(self.store.as_ref(), &storage_key, &bytes, config.write_attempts)
                .await
        {
            log::warn!("failed to write generation snapshot '{}': {}", storage_key, e);
            return None;
        }

        log::debug!(
            "captured {} generation for period {} ({} posts, {} bytes)",
            kind,
            period,
            archive.posts.len(),
            bytes.len()
        );

        Some(BackupRecord {
            id: Uuid::new_v4().to_string(),
            storage_key,
            created_at: now,
            byte_size: bytes.len() as u64,
            checksum: sha256_hex(&bytes),
            detail: BackupDetail::Generation {
                period_kind: kind,
                period,
                previous_backup_id,
            },
        })
    }

    /// Read back the archive embedded in a generation snapshot.
    ///
    /// Fails soft: unreadable, unparseable, or wrong-kind blobs yield
    /// `None`.
    pub async fn restore(&self, record: &BackupRecord) -> Option<Archive> {
        let bytes = match self.store.read(&record.storage_key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("cannot read generation blob '{}': {}", record.storage_key, e);
                return None;
            }
        };

        match serde_json::from_slice::<BackupBlob>(&bytes) {
            Ok(BackupBlob::Generation { payload, .. }) => {
                let mut archive = payload;
                archive.normalize();
                Some(archive)
            }
            Ok(BackupBlob::Incremental { .. }) => {
                log::warn!(
                    "blob '{}' is an incremental, expected a generation",
                    record.storage_key
                );
                None
            }
            Err(e) => {
                log::warn!("cannot parse generation blob '{}': {}", record.storage_key, e);
                None
            }
        }
    }

    /// Delete blobs of generation records of `kind` that are past
    /// retention.
    ///
    /// A record directly referenced by any incremental's `base_backup_id`
    /// is skipped regardless of age. Only direct dependents are checked,
    /// not chains through other incrementals.
    ///
    /// Returns the ids whose blobs were deleted. Index bookkeeping is the
    /// caller's job.
    pub async fn cleanup(
        &self,
        generations: &[BackupRecord],
        incrementals: &[BackupRecord],
        config: &BackupConfig,
        kind: PeriodKind,
    ) -> Vec<String> {
        let cutoff = config.retention_cutoff(kind, self.clock.now());
        let mut deleted = Vec::new();

        for record in generations {
            let of_kind = matches!(record.period_info(), Some((k, _)) if k == kind);
            if !of_kind || record.created_at >= cutoff {
                continue;
            }

            let referenced = incrementals
                .iter()
                .any(|inc| inc.base_backup_id() == Some(record.id.as_str()));
            if referenced {
                log::debug!(
                    "keeping expired {} generation '{}': referenced as a base",
                    kind,
                    record.id
                );
                continue;
            }

            match self.store.remove(&record.storage_key).await {
                Ok(()) => deleted.push(record.id.clone()),
                Err(e) => {
                    log::warn!("failed to delete generation blob '{}': {}", record.storage_key, e);
                }
            }
        }

        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_clock::FixedClock;
    use crate::post::Post;
    use crate::store::{block_on_test, MemoryBlobStore};
    use chrono::{DateTime, Duration, Utc};

    fn now() -> DateTime<Utc> {
        "2026-03-05T10:00:00Z".parse().unwrap()
    }

    fn manager(store: &MemoryBlobStore) -> GenerationManager {
        GenerationManager::new(Arc::new(store.clone()), Arc::new(FixedClock::at(now())))
    }

    fn archive_with(ids: &[&str]) -> Archive {
        let mut archive = Archive::new();
        for id in ids {
            archive.posts.push(Post::new(*id, *id, now()));
        }
        archive
    }

    #[test]
    fn test_create_and_restore_roundtrip() {
        let store = MemoryBlobStore::new();
        let manager = manager(&store);
        let archive = archive_with(&["a", "b"]);

        block_on_test(async {
            let record = manager
                .create(&archive, PeriodKind::Daily, None, &BackupConfig::default())
                .await
                .unwrap();

            assert_eq!(record.storage_key, "generations/daily-2026-03-05.json");
            assert_eq!(record.period_info(), Some((PeriodKind::Daily, "2026-03-05")));
            assert!(record.byte_size > 0);
            assert_eq!(record.checksum.len(), 64);

            let restored = manager.restore(&record).await.unwrap();
            assert_eq!(restored, archive);
        });
    }

    #[test]
    fn test_same_period_overwrites_blob() {
        let store = MemoryBlobStore::new();
        let manager = manager(&store);

        block_on_test(async {
            let first = manager
                .create(&archive_with(&["a"]), PeriodKind::Daily, None, &BackupConfig::default())
                .await
                .unwrap();
            let second = manager
                .create(&archive_with(&["a", "b"]), PeriodKind::Daily, None, &BackupConfig::default())
                .await
                .unwrap();

            assert_eq!(first.storage_key, second.storage_key);
            let restored = manager.restore(&second).await.unwrap();
            assert_eq!(restored.posts.len(), 2);
        });
    }

    #[test]
    fn test_create_fails_soft_on_write_error() {
        let store = MemoryBlobStore::new();
        store.poison_key("generations/daily-2026-03-05.json");
        let manager = manager(&store);

        block_on_test(async {
            let record = manager
                .create(&archive_with(&["a"]), PeriodKind::Daily, None, &BackupConfig::default())
                .await;
            assert!(record.is_none());
        });
    }

    #[test]
    fn test_restore_fails_soft_on_garbage() {
        let store = MemoryBlobStore::new();
        let manager = manager(&store);

        block_on_test(async {
            let mut record = manager
                .create(&archive_with(&["a"]), PeriodKind::Daily, None, &BackupConfig::default())
                .await
                .unwrap();

            store.put_raw(&record.storage_key, b"{broken".to_vec());
            assert!(manager.restore(&record).await.is_none());

            record.storage_key = "generations/missing.json".to_string();
            assert!(manager.restore(&record).await.is_none());
        });
    }

    #[test]
    fn test_cleanup_protects_referenced_bases() {
        let store = MemoryBlobStore::new();
        let manager = manager(&store);
        let config = BackupConfig::default();

        block_on_test(async {
            let mut old_gen = manager
                .create(&archive_with(&["a"]), PeriodKind::Daily, None, &config)
                .await
                .unwrap();
            // Age it far past daily retention.
            old_gen.created_at = now() - Duration::days(30);

            let incremental = BackupRecord {
                id: "i1".to_string(),
                storage_key: keys::incremental("i1"),
                created_at: now(),
                byte_size: 1,
                checksum: "00".repeat(32),
                detail: BackupDetail::Incremental {
                    base_backup_id: old_gen.id.clone(),
                    changed_count: 1,
                    diff_byte_size: 1,
                },
            };

            // Referenced: survives cleanup regardless of age.
            let deleted = manager
                .cleanup(
                    std::slice::from_ref(&old_gen),
                    std::slice::from_ref(&incremental),
                    &config,
                    PeriodKind::Daily,
                )
                .await;
            assert!(deleted.is_empty());
            assert!(store.exists(&old_gen.storage_key).await);

            // Unreferenced: blob goes away.
            let deleted = manager
                .cleanup(std::slice::from_ref(&old_gen), &[], &config, PeriodKind::Daily)
                .await;
            assert_eq!(deleted, vec![old_gen.id.clone()]);
            assert!(!store.exists(&old_gen.storage_key).await);
        });
    }

    #[test]
    fn test_cleanup_ignores_fresh_records() {
        let store = MemoryBlobStore::new();
        let manager = manager(&store);
        let config = BackupConfig::default();

        block_on_test(async {
            let fresh = manager
                .create(&archive_with(&["a"]), PeriodKind::Daily, None, &config)
                .await
                .unwrap();
            let deleted = manager
                .cleanup(std::slice::from_ref(&fresh), &[], &config, PeriodKind::Daily)
                .await;
            assert!(deleted.is_empty());
            assert!(store.exists(&fresh.storage_key).await);
        });
    }
}
