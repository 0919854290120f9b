//! Backup subsystem: periodic full snapshots, diff-only incrementals, and
//! chain-based restore.
//!
//! # Architecture
//!
//! ```text
//! caller ──► BackupEngine::record_save ──► GenerationManager (full snapshots)
//!                    │                     IncrementalManager (diff snapshots)
//!                    ▼
//!              BackupIndex (manifest) ──► BlobStore
//! ```
//!
//! The engine is advisory relative to the caller's primary save: every
//! failure inside [`BackupEngine::record_save`] is caught, logged, and
//! swallowed. Restore resolves a record, rebuilds its base generation, and
//! replays the incremental diff chain oldest-first.
//!
//! This subsystem is independent of the commit chain in [`crate::history`],
//! which keeps its own linked history with full-replay semantics.

mod config;
mod generation;
mod incremental;
mod manager;
mod record;

pub use config::BackupConfig;
pub use generation::GenerationManager;
pub use incremental::IncrementalManager;
pub use manager::{BackupEngine, BackupListing};
pub use record::{
    BackupBlob, BackupDetail, BackupIndex, BackupRecord, BackupStatistics, MetadataChangeSummary,
};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::post::Archive;

/// Calendar period a generation snapshot is tagged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    /// One snapshot per calendar day
    Daily,
    /// One snapshot per ISO week
    Weekly,
    /// One snapshot per calendar month
    Monthly,
}

impl PeriodKind {
    /// All period kinds, in snapshot-creation order.
    pub const ALL: [PeriodKind; 3] = [PeriodKind::Daily, PeriodKind::Weekly, PeriodKind::Monthly];

    /// Stable lowercase label, used in storage keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodKind::Daily => "daily",
            PeriodKind::Weekly => "weekly",
            PeriodKind::Monthly => "monthly",
        }
    }

    /// Period string for the given instant: `YYYY-MM-DD`, `YYYY-W<n>`, or
    /// `YYYY-MM`.
    pub fn period_string(&self, at: DateTime<Utc>) -> String {
        match self {
            PeriodKind::Daily => at.format("%Y-%m-%d").to_string(),
            PeriodKind::Weekly => {
                let week = at.iso_week();
                format!("{}-W{}", week.year(), week.week())
            }
            PeriodKind::Monthly => at.format("%Y-%m").to_string(),
        }
    }
}

impl std::fmt::Display for PeriodKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened during one [`BackupEngine::record_save`] cycle.
///
/// The cycle never fails; anything that went wrong is in `errors`.
#[derive(Debug, Default)]
pub struct SaveReport {
    /// Id of the incremental created this cycle, if any
    pub incremental_id: Option<String>,
    /// Ids of generation snapshots created this cycle
    pub generation_ids: Vec<String>,
    /// Non-fatal problems encountered and swallowed
    pub errors: Vec<String>,
}

/// Result of a manual snapshot request.
#[derive(Debug)]
pub struct BackupOutcome {
    /// Whether the snapshot was written and indexed
    pub success: bool,
    /// Id of the created record
    pub record_id: Option<String>,
    /// Error message if the operation failed
    pub error: Option<String>,
}

impl BackupOutcome {
    pub(crate) fn success(record_id: String) -> Self {
        Self {
            success: true,
            record_id: Some(record_id),
            error: None,
        }
    }

    pub(crate) fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            record_id: None,
            error: Some(error.into()),
        }
    }
}

/// Result of a restore request.
#[derive(Debug)]
pub struct RestoreOutcome {
    /// Whether the archive was reconstructed
    pub success: bool,
    /// Id of the backup that was restored
    pub backup_id: String,
    /// The reconstructed archive on success
    pub archive: Option<Archive>,
    /// Error message if the operation failed
    pub error: Option<String>,
}

impl RestoreOutcome {
    pub(crate) fn success(backup_id: impl Into<String>, archive: Archive) -> Self {
        Self {
            success: true,
            backup_id: backup_id.into(),
            archive: Some(archive),
            error: None,
        }
    }

    pub(crate) fn failure(backup_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            backup_id: backup_id.into(),
            archive: None,
            error: Some(error.into()),
        }
    }
}

/// Dry-run summary of what a restore would change.
#[derive(Debug)]
pub struct RestorePreview {
    /// Whether the scratch restore succeeded
    pub success: bool,
    /// Posts that would be added
    pub added: usize,
    /// Posts that would be removed
    pub removed: usize,
    /// Posts that would be modified
    pub modified: usize,
    /// A few affected post ids, for display
    pub samples: Vec<String>,
    /// Error message if the scratch restore failed
    pub error: Option<String>,
}

/// Per-record integrity verdict.
#[derive(Debug)]
pub struct IntegrityReport {
    /// Record id
    pub id: String,
    /// Whether the stored blob matched the record
    pub ok: bool,
    /// What went wrong, when `ok` is false
    pub error: Option<String>,
}

/// What a cleanup pass removed.
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Ids of generation records whose blobs were deleted
    pub deleted_generations: Vec<String>,
    /// Ids of incremental records whose blobs were deleted
    pub deleted_incrementals: Vec<String>,
    /// Ids dropped from the index because their blob disappeared
    pub dropped_index_entries: Vec<String>,
}
