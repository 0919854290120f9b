//! Backup records, persisted blob shapes, and the index/manifest.
//!
//! The index is the single authoritative listing of backups; statistics in
//! it are derived and recomputed, never hand-maintained.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BackupConfig, PeriodKind};
use crate::diff::PostDiff;
use crate::error::{Result, VaultError};
use crate::post::Archive;
use crate::store::{keys, BlobStore};

/// Current index schema version.
pub const INDEX_VERSION: u32 = 1;

/// Kind-specific metadata of a backup record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackupDetail {
    /// Full periodic snapshot
    Generation {
        /// Calendar period kind this snapshot is tagged to
        period_kind: PeriodKind,
        /// Period string (`YYYY-MM-DD`, `YYYY-W<n>`, or `YYYY-MM`)
        period: String,
        /// Id of the previous generation of the same kind, if any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_backup_id: Option<String>,
    },
    /// Diff-only snapshot anchored to a base backup
    Incremental {
        /// Id of the backup this diff set applies on top of
        base_backup_id: String,
        /// Number of diff entries captured
        changed_count: usize,
        /// Serialized size of the diff set alone
        diff_byte_size: u64,
    },
}

/// One entry in the backup index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Unique record id
    pub id: String,
    /// Key of the persisted blob
    pub storage_key: String,
    /// When the backup was captured
    pub created_at: DateTime<Utc>,
    /// Size of the persisted blob in bytes
    pub byte_size: u64,
    /// SHA-256 of the persisted blob
    pub checksum: String,
    /// Kind-specific metadata
    #[serde(flatten)]
    pub detail: BackupDetail,
}

impl BackupRecord {
    /// Whether this record is a generation snapshot.
    pub fn is_generation(&self) -> bool {
        matches!(self.detail, BackupDetail::Generation { .. })
    }

    /// Period info for generation records.
    pub fn period_info(&self) -> Option<(PeriodKind, &str)> {
        match &self.detail {
            BackupDetail::Generation {
                period_kind,
                period,
                ..
            } => Some((*period_kind, period.as_str())),
            BackupDetail::Incremental { .. } => None,
        }
    }

    /// Base backup id for incremental records.
    pub fn base_backup_id(&self) -> Option<&str> {
        match &self.detail {
            BackupDetail::Incremental { base_backup_id, .. } => Some(base_backup_id.as_str()),
            BackupDetail::Generation { .. } => None,
        }
    }
}

/// Summary of non-post metadata changes captured with an incremental.
///
/// Only the summary is persisted; chain restore reproduces the base
/// snapshot's metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataChangeSummary {
    /// Profile id/name/verified changed
    #[serde(default)]
    pub profile_changed: bool,
    /// Governance map changed
    #[serde(default)]
    pub governance_changed: bool,
    /// Scheduled-item count before the change
    #[serde(default)]
    pub scheduled_before: usize,
    /// Scheduled-item count after the change
    #[serde(default)]
    pub scheduled_after: usize,
}

impl MetadataChangeSummary {
    /// Compare the tracked metadata fields of two archive versions.
    pub fn between(previous: &Archive, current: &Archive) -> Self {
        Self {
            profile_changed: previous.profile != current.profile,
            governance_changed: previous.governance != current.governance,
            scheduled_before: previous.scheduled.len(),
            scheduled_after: current.scheduled.len(),
        }
    }

    /// Whether any tracked metadata changed.
    pub fn any(&self) -> bool {
        self.profile_changed
            || self.governance_changed
            || self.scheduled_before != self.scheduled_after
    }
}

/// Persisted blob payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackupBlob {
    /// Full snapshot of the archive
    Generation {
        /// Calendar period kind
        sub_kind: PeriodKind,
        /// When the snapshot was captured
        timestamp: DateTime<Utc>,
        /// Period string the snapshot is keyed by
        period: String,
        /// The archive itself
        payload: Archive,
    },
    /// Diff set anchored to a base backup
    Incremental {
        /// When the diff set was captured
        timestamp: DateTime<Utc>,
        /// Id of the backup this applies on top of
        base_backup_id: String,
        /// Ordered diff entries
        diffs: Vec<PostDiff>,
        /// Non-post metadata change summary
        metadata_change_summary: MetadataChangeSummary,
    },
}

/// Derived figures over the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupStatistics {
    /// Total number of records
    #[serde(default)]
    pub total_count: usize,
    /// Total bytes across all blobs
    #[serde(default)]
    pub total_bytes: u64,
    /// Timestamp of the newest record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newest: Option<DateTime<Utc>>,
    /// Timestamp of the oldest record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest: Option<DateTime<Utc>>,
    /// Ids the integrity checker flagged
    #[serde(default)]
    pub corrupt_ids: Vec<String>,
}

/// The backup index/manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupIndex {
    /// Schema version
    pub version: u32,
    /// When the index was last written
    pub last_updated: DateTime<Utc>,
    /// Backup policy
    #[serde(default)]
    pub config: BackupConfig,
    /// Generation records
    #[serde(default)]
    pub generations: Vec<BackupRecord>,
    /// Incremental records
    #[serde(default)]
    pub incrementals: Vec<BackupRecord>,
    /// Derived statistics
    #[serde(default)]
    pub statistics: BackupStatistics,
}

impl BackupIndex {
    /// Create an empty index with default policy.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            version: INDEX_VERSION,
            last_updated: now,
            config: BackupConfig::default(),
            generations: Vec::new(),
            incrementals: Vec::new(),
            statistics: BackupStatistics::default(),
        }
    }

    /// Load the index blob, if one exists.
    ///
    /// Returns `Ok(None)` for a store that has never been initialized; a
    /// present-but-malformed blob is an error for the caller to handle.
    pub async fn load(store: &dyn BlobStore) -> Result<Option<BackupIndex>> {
        if !store.exists(keys::INDEX).await {
            return Ok(None);
        }
        let bytes = store
            .read(keys::INDEX)
            .await
            .map_err(|source| VaultError::BlobRead {
                key: keys::INDEX.to_string(),
                source,
            })?;
        let index: BackupIndex = serde_json::from_slice(&bytes)?;
        Ok(Some(index))
    }

    /// Persist the index blob.
    pub async fn save(&self, store: &dyn BlobStore) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        store
            .write(keys::INDEX, &bytes)
            .await
            .map_err(|source| VaultError::BlobWrite {
                key: keys::INDEX.to_string(),
                source,
            })
    }

    /// Find a record by id in either list.
    pub fn find_record(&self, id: &str) -> Option<&BackupRecord> {
        self.generations
            .iter()
            .chain(self.incrementals.iter())
            .find(|r| r.id == id)
    }

    /// Whether a generation record exists for `(kind, period)`.
    pub fn has_generation_for(&self, kind: PeriodKind, period: &str) -> bool {
        self.generations
            .iter()
            .any(|r| r.period_info() == Some((kind, period)))
    }

    /// Most recent generation record of `kind`, by creation time.
    pub fn latest_generation_of(&self, kind: PeriodKind) -> Option<&BackupRecord> {
        self.generations
            .iter()
            .filter(|r| matches!(r.period_info(), Some((k, _)) if k == kind))
            .max_by_key(|r| r.created_at)
    }

    /// Most recent generation record of any kind.
    pub fn latest_generation(&self) -> Option<&BackupRecord> {
        self.generations.iter().max_by_key(|r| r.created_at)
    }

    /// Insert a generation record, replacing any existing record for the
    /// same `(kind, period)`.
    ///
    /// Replacement keeps the replaced record's id, so incrementals anchored
    /// to that period never dangle. Returns the id under which the record
    /// was indexed.
    pub fn upsert_generation(&mut self, mut record: BackupRecord) -> String {
        let key = match record.period_info() {
            Some((kind, period)) => (kind, period.to_string()),
            None => {
                log::warn!("upsert_generation called with non-generation record '{}'", record.id);
                let id = record.id.clone();
                self.generations.push(record);
                return id;
            }
        };

        if let Some(existing) = self
            .generations
            .iter_mut()
            .find(|r| r.period_info() == Some((key.0, key.1.as_str())))
        {
            record.id = existing.id.clone();
            let id = record.id.clone();
            *existing = record;
            return id;
        }

        let id = record.id.clone();
        self.generations.push(record);
        id
    }

    /// Recompute derived statistics from the record lists.
    ///
    /// Corrupt ids are retained only for records that still exist.
    pub fn recompute_statistics(&mut self) {
        let records = || self.generations.iter().chain(self.incrementals.iter());
        let total_count = records().count();
        let total_bytes = records().map(|r| r.byte_size).sum();
        let newest = records().map(|r| r.created_at).max();
        let oldest = records().map(|r| r.created_at).min();

        let corrupt_ids = std::mem::take(&mut self.statistics.corrupt_ids)
            .into_iter()
            .filter(|id| self.find_record(id).is_some())
            .collect();

        self.statistics = BackupStatistics {
            total_count,
            total_bytes,
            newest,
            oldest,
            corrupt_ids,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{block_on_test, MemoryBlobStore};

    fn now() -> DateTime<Utc> {
        "2026-03-01T12:00:00Z".parse().unwrap()
    }

    fn generation_record(id: &str, period: &str) -> BackupRecord {
        BackupRecord {
            id: id.to_string(),
            storage_key: keys::generation("daily", period),
            created_at: now(),
            byte_size: 10,
            checksum: "00".repeat(32),
            detail: BackupDetail::Generation {
                period_kind: PeriodKind::Daily,
                period: period.to_string(),
                previous_backup_id: None,
            },
        }
    }

    #[test]
    fn test_record_json_carries_kind_tag() {
        let record = generation_record("g1", "2026-03-01");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "generation");
        assert_eq!(json["period"], "2026-03-01");

        let parsed: BackupRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_upsert_replaces_same_period_keeping_id() {
        let mut index = BackupIndex::new(now());
        index.upsert_generation(generation_record("g1", "2026-03-01"));

        let mut replacement = generation_record("g2", "2026-03-01");
        replacement.byte_size = 99;
        let final_id = index.upsert_generation(replacement);

        assert_eq!(index.generations.len(), 1);
        assert_eq!(final_id, "g1");
        assert_eq!(index.generations[0].id, "g1");
        assert_eq!(index.generations[0].byte_size, 99);
    }

    #[test]
    fn test_upsert_keeps_distinct_periods() {
        let mut index = BackupIndex::new(now());
        index.upsert_generation(generation_record("g1", "2026-03-01"));
        index.upsert_generation(generation_record("g2", "2026-03-02"));
        assert_eq!(index.generations.len(), 2);
    }

    #[test]
    fn test_metadata_summary_detects_changes() {
        let mut a = Archive::new();
        let mut b = a.clone();
        assert!(!MetadataChangeSummary::between(&a, &b).any());

        b.profile.user_name = "alice".to_string();
        assert!(MetadataChangeSummary::between(&a, &b).profile_changed);

        a.profile = b.profile.clone();
        a.governance.insert("k".to_string(), "v".to_string());
        let summary = MetadataChangeSummary::between(&a, &b);
        assert!(summary.governance_changed);
        assert!(summary.any());
    }

    #[test]
    fn test_recompute_statistics() {
        let mut index = BackupIndex::new(now());
        index.upsert_generation(generation_record("g1", "2026-03-01"));
        let mut later = generation_record("g2", "2026-03-02");
        later.created_at = now() + chrono::Duration::days(1);
        later.byte_size = 20;
        index.upsert_generation(later);
        index.statistics.corrupt_ids = vec!["g1".to_string(), "ghost".to_string()];

        index.recompute_statistics();

        assert_eq!(index.statistics.total_count, 2);
        assert_eq!(index.statistics.total_bytes, 30);
        assert_eq!(index.statistics.oldest, Some(now()));
        assert_eq!(
            index.statistics.newest,
            Some(now() + chrono::Duration::days(1))
        );
        assert_eq!(index.statistics.corrupt_ids, vec!["g1".to_string()]);
    }

    #[test]
    fn test_index_load_save_roundtrip() {
        let store = MemoryBlobStore::new();
        block_on_test(async {
            assert!(BackupIndex::load(&store).await.unwrap().is_none());

            let mut index = BackupIndex::new(now());
            index.upsert_generation(generation_record("g1", "2026-03-01"));
            index.save(&store).await.unwrap();

            let loaded = BackupIndex::load(&store).await.unwrap().unwrap();
            assert_eq!(loaded.generations, index.generations);
            assert_eq!(loaded.version, INDEX_VERSION);
        });
    }

    #[test]
    fn test_index_load_malformed_is_error() {
        let store = MemoryBlobStore::new();
        store.put_raw(keys::INDEX, b"not json".to_vec());
        block_on_test(async {
            assert!(BackupIndex::load(&store).await.is_err());
        });
    }
}
