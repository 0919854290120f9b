//! Backup orchestration: index ownership, save policy, chain restore.

use std::sync::Arc;

use super::record::{BackupIndex, BackupRecord, MetadataChangeSummary};
use super::{
    BackupOutcome, CleanupReport, GenerationManager, IncrementalManager, IntegrityReport,
    PeriodKind, RestoreOutcome, RestorePreview, SaveReport,
};
use crate::checksum::sha256_hex;
use crate::clock::Clock;
use crate::diff::{apply_diffs, calculate_diffs};
use crate::post::Archive;
use crate::store::BlobStore;

/// How many affected post ids a restore preview carries.
const PREVIEW_SAMPLE_LIMIT: usize = 5;

/// Read-only listing of indexed backups.
#[derive(Debug, Clone)]
pub struct BackupListing {
    /// Generation records, as indexed
    pub generations: Vec<BackupRecord>,
    /// Incremental records, as indexed
    pub incrementals: Vec<BackupRecord>,
}

/// The backup orchestrator.
///
/// Owns the persisted index, the save policy, and the held previous
/// snapshot. All operations are advisory relative to the caller's primary
/// save: [`BackupEngine::record_save`] catches, logs, and swallows every
/// failure.
///
/// The engine assumes a single logical writer; concurrent engines racing on
/// the same storage location are not coordinated.
pub struct BackupEngine {
    store: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    generations: GenerationManager,
    incrementals: IncrementalManager,
    /// Lazily loaded index; `None` until first use.
    index: Option<BackupIndex>,
    /// Snapshot of the archive as of the last completed save cycle.
    last_saved: Option<Archive>,
}

impl BackupEngine {
    /// Create an engine over the given store and clock.
    pub fn new(store: Arc<dyn BlobStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            generations: GenerationManager::new(Arc::clone(&store), Arc::clone(&clock)),
            incrementals: IncrementalManager::new(Arc::clone(&store), Arc::clone(&clock)),
            store,
            clock,
            index: None,
            last_saved: None,
        }
    }

    /// Seed the held previous snapshot, e.g. with the archive as loaded at
    /// startup. Without priming, the first [`record_save`] only captures
    /// generations.
    ///
    /// [`record_save`]: BackupEngine::record_save
    pub fn prime(&mut self, archive: &Archive) {
        self.last_saved = Some(archive.clone());
    }

    /// The held previous snapshot, if any.
    pub fn last_saved(&self) -> Option<&Archive> {
        self.last_saved.as_ref()
    }

    async fn ensure_index(&mut self) {
        if self.index.is_some() {
            return;
        }
        let now = self.clock.now();
        let loaded = match BackupIndex::load(self.store.as_ref()).await {
            Ok(Some(index)) => index,
            Ok(None) => BackupIndex::new(now),
            Err(e) => {
                log::warn!("backup index unreadable, starting fresh: {}", e);
                BackupIndex::new(now)
            }
        };
        self.index = Some(loaded);
    }

    async fn save_index(&mut self) -> Option<String> {
        let now = self.clock.now();
        let index = self.index.get_or_insert_with(|| BackupIndex::new(now));
        index.last_updated = now;
        index.recompute_statistics();
        match index.save(self.store.as_ref()).await {
            Ok(()) => None,
            Err(e) => {
                log::warn!("failed to persist backup index: {}", e);
                Some(e.to_string())
            }
        }
    }

    /// Run one backup cycle for a primary save of `current`.
    ///
    /// 1. With incrementals enabled and a previous snapshot held, capture a
    ///    diff-only snapshot anchored to the most recent backup,
    ///    bootstrapping a base generation when none exists yet.
    /// 2. Independently, capture a generation for each period kind whose
    ///    current period has none.
    /// 3. Replace the held previous snapshot with a copy of `current`.
    ///
    /// Never fails: problems are logged and reported in
    /// [`SaveReport::errors`]. The held snapshot is not advanced past a
    /// failed incremental write, so the missed diff is carried into the
    /// next cycle.
    pub async fn record_save(&mut self, current: &Archive, reason: Option<&str>) -> SaveReport {
        let mut report = SaveReport::default();
        self.ensure_index().await;
        let now = self.clock.now();
        log::debug!("backup cycle for save ({})", reason.unwrap_or("unspecified"));

        let mut advance_snapshot = true;

        // Step 1: incremental against the held snapshot.
        let incrementals_enabled = {
            let index = self.index.get_or_insert_with(|| BackupIndex::new(now));
            index.config.incrementals_enabled
        };
        if incrementals_enabled {
            if let Some(previous) = self.last_saved.clone() {
                if !self.capture_incremental(&previous, current, &mut report).await {
                    advance_snapshot = false;
                }
            }
        }

        // Step 2: one generation per period kind for the current period.
        for kind in PeriodKind::ALL {
            let period = kind.period_string(now);
            let (exists, previous_id) = {
                let index = self.index.get_or_insert_with(|| BackupIndex::new(now));
                (
                    index.has_generation_for(kind, &period),
                    index.latest_generation_of(kind).map(|r| r.id.clone()),
                )
            };
            if exists {
                continue;
            }
            let config = {
                let index = self.index.get_or_insert_with(|| BackupIndex::new(now));
                index.config.clone()
            };
            match self.generations.create(current, kind, previous_id, &config).await {
                Some(record) => {
                    let index = self.index.get_or_insert_with(|| BackupIndex::new(now));
                    let id = index.upsert_generation(record);
                    report.generation_ids.push(id);
                }
                None => {
                    report
                        .errors
                        .push(format!("{} generation snapshot was not persisted", kind));
                }
            }
        }

        if let Some(e) = self.save_index().await {
            report.errors.push(e);
        }

        // Step 3: advance the held snapshot only once the cycle's writes are
        // done, so cache and disk cannot diverge on partial failure.
        if advance_snapshot {
            self.last_saved = Some(current.clone());
        }

        report
    }

    /// Incremental leg of a save cycle. Returns whether the snapshot cache
    /// may advance; a persist failure holds it back.
    async fn capture_incremental(
        &mut self,
        previous: &Archive,
        current: &Archive,
        report: &mut SaveReport,
    ) -> bool {
        let now = self.clock.now();

        // Anchor to the most recent backup of either kind; bootstrap a base
        // generation from the held snapshot when the index has none.
        let base_id = {
            let index = self.index.get_or_insert_with(|| BackupIndex::new(now));
            let newest_incremental = index.incrementals.iter().max_by_key(|r| r.created_at);
            let newest_generation = index.latest_generation();
            match (newest_incremental, newest_generation) {
                (Some(i), Some(g)) => Some(if i.created_at >= g.created_at {
                    i.id.clone()
                } else {
                    g.id.clone()
                }),
                (Some(i), None) => Some(i.id.clone()),
                (None, Some(g)) => Some(g.id.clone()),
                (None, None) => None,
            }
        };

        let base_id = match base_id {
            Some(id) => id,
            None => {
                let config = {
                    let index = self.index.get_or_insert_with(|| BackupIndex::new(now));
                    index.config.clone()
                };
                match self
                    .generations
                    .create(previous, PeriodKind::Daily, None, &config)
                    .await
                {
                    Some(record) => {
                        let index = self.index.get_or_insert_with(|| BackupIndex::new(now));
                        let id = index.upsert_generation(record);
                        report.generation_ids.push(id.clone());
                        id
                    }
                    None => {
                        report
                            .errors
                            .push("could not bootstrap a base generation".to_string());
                        return false;
                    }
                }
            }
        };

        match self.incrementals.create(current, previous, &base_id).await {
            Some(record) => {
                report.incremental_id = Some(record.id.clone());
                let index = self.index.get_or_insert_with(|| BackupIndex::new(now));
                index.incrementals.push(record);
                self.enforce_incremental_cap().await;
                true
            }
            None => {
                // Either a genuine no-op or a logged write failure; only a
                // no-op may advance the snapshot cache.
                let noop = calculate_diffs(&previous.posts, &current.posts, now).is_empty()
                    && !MetadataChangeSummary::between(previous, current).any();
                if !noop {
                    report
                        .errors
                        .push("incremental snapshot was not persisted".to_string());
                }
                noop
            }
        }
    }

    /// Drop the oldest incremental records beyond the configured cap,
    /// deleting their blobs.
    async fn enforce_incremental_cap(&mut self) {
        let now = self.clock.now();
        loop {
            let victim = {
                let index = self.index.get_or_insert_with(|| BackupIndex::new(now));
                if index.incrementals.len() <= index.config.max_incrementals {
                    break;
                }
                let pos = index
                    .incrementals
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, r)| r.created_at)
                    .map(|(i, _)| i);
                match pos {
                    Some(pos) => index.incrementals.remove(pos),
                    None => break,
                }
            };
            log::debug!("pruning incremental '{}' beyond retention cap", victim.id);
            if let Err(e) = self.store.remove(&victim.storage_key).await {
                log::warn!("failed to delete incremental blob '{}': {}", victim.storage_key, e);
            }
        }
    }

    /// Capture an unconditional full snapshot, bypassing the diff-skip
    /// policy.
    pub async fn create_manual(&mut self, archive: &Archive, kind: PeriodKind) -> BackupOutcome {
        self.ensure_index().await;
        let now = self.clock.now();
        let (previous_id, config) = {
            let index = self.index.get_or_insert_with(|| BackupIndex::new(now));
            (
                index.latest_generation_of(kind).map(|r| r.id.clone()),
                index.config.clone(),
            )
        };

        match self.generations.create(archive, kind, previous_id, &config).await {
            Some(record) => {
                let index = self.index.get_or_insert_with(|| BackupIndex::new(now));
                let id = index.upsert_generation(record);
                match self.save_index().await {
                    None => BackupOutcome::success(id),
                    Some(e) => BackupOutcome::failure(format!("snapshot indexed but not saved: {}", e)),
                }
            }
            None => BackupOutcome::failure("snapshot write failed"),
        }
    }

    /// Reconstruct the archive a backup captured.
    ///
    /// Generations restore directly. Incrementals restore by a bounded
    /// chain walk: resolve base links back to the anchoring generation,
    /// restore it fully, then apply each link's diff set oldest-first. Any
    /// break in the chain is a structured failure, never a panic.
    ///
    /// Only post diffs are replayed; profile/governance metadata comes from
    /// the anchoring generation's payload.
    pub async fn restore_from_backup(&mut self, id: &str) -> RestoreOutcome {
        self.ensure_index().await;
        let now = self.clock.now();

        let (record, chain, base) = {
            let index = self.index.get_or_insert_with(|| BackupIndex::new(now));
            let Some(record) = index.find_record(id).cloned() else {
                return RestoreOutcome::failure(id, format!("unknown backup id '{}'", id));
            };

            if record.is_generation() {
                (record, Vec::new(), None)
            } else {
                // Walk base links until the anchoring generation.
                let mut chain: Vec<BackupRecord> = Vec::new();
                let mut cursor = record.clone();
                let base = loop {
                    if chain.len() > index.incrementals.len() {
                        return RestoreOutcome::failure(
                            id,
                            format!("diff chain from '{}' does not terminate", id),
                        );
                    }
                    let Some(base_id) = cursor.base_backup_id().map(str::to_string) else {
                        return RestoreOutcome::failure(
                            id,
                            format!("record '{}' has no base reference", cursor.id),
                        );
                    };
                    chain.push(cursor);
                    match index.find_record(&base_id) {
                        None => {
                            return RestoreOutcome::failure(
                                id,
                                format!("base backup '{}' does not resolve", base_id),
                            );
                        }
                        Some(found) if found.is_generation() => break found.clone(),
                        Some(found) => cursor = found.clone(),
                    }
                };
                (record, chain, Some(base))
            }
        };

        if record.is_generation() {
            return match self.generations.restore(&record).await {
                Some(archive) => RestoreOutcome::success(id, archive),
                None => RestoreOutcome::failure(
                    id,
                    format!("generation blob '{}' is unreadable", record.storage_key),
                ),
            };
        }

        let base = match base {
            Some(base) => base,
            None => return RestoreOutcome::failure(id, "incremental chain has no base"),
        };
        let mut archive = match self.generations.restore(&base).await {
            Some(archive) => archive,
            None => {
                return RestoreOutcome::failure(
                    id,
                    format!("base generation '{}' is unreadable", base.id),
                );
            }
        };

        // Oldest-first replay; the walk collected newest-first.
        let mut chain = chain;
        chain.reverse();
        for link in &chain {
            match self.incrementals.load(link).await {
                Some(diffs) => archive.posts = apply_diffs(&archive.posts, &diffs),
                None => {
                    return RestoreOutcome::failure(
                        id,
                        format!("diff set of '{}' in the chain is unreadable", link.id),
                    );
                }
            }
        }

        RestoreOutcome::success(id, archive)
    }

    /// Verify every indexed backup against its stored blob.
    ///
    /// The default check compares the blob's byte length with the recorded
    /// size; `deep` additionally recomputes the SHA-256 checksum. One bad
    /// record never aborts the rest of the batch. Flagged ids are written
    /// to the index statistics.
    pub async fn check_all_backups_integrity(&mut self, deep: bool) -> Vec<IntegrityReport> {
        self.ensure_index().await;
        let now = self.clock.now();
        let records: Vec<BackupRecord> = {
            let index = self.index.get_or_insert_with(|| BackupIndex::new(now));
            index
                .generations
                .iter()
                .chain(index.incrementals.iter())
                .cloned()
                .collect()
        };

        let mut reports = Vec::with_capacity(records.len());
        for record in &records {
            let verdict = self.check_record(record, deep).await;
            reports.push(verdict);
        }

        let corrupt: Vec<String> = reports
            .iter()
            .filter(|r| !r.ok)
            .map(|r| r.id.clone())
            .collect();
        {
            let index = self.index.get_or_insert_with(|| BackupIndex::new(now));
            index.statistics.corrupt_ids = corrupt;
        }
        self.save_index().await;

        reports
    }

    async fn check_record(&self, record: &BackupRecord, deep: bool) -> IntegrityReport {
        if !self.store.exists(&record.storage_key).await {
            return IntegrityReport {
                id: record.id.clone(),
                ok: false,
                error: Some(format!("blob '{}' is missing", record.storage_key)),
            };
        }
        let bytes = match self.store.read(&record.storage_key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return IntegrityReport {
                    id: record.id.clone(),
                    ok: false,
                    error: Some(format!("blob '{}' is unreadable: {}", record.storage_key, e)),
                };
            }
        };
        if bytes.len() as u64 != record.byte_size {
            return IntegrityReport {
                id: record.id.clone(),
                ok: false,
                error: Some(format!(
                    "size mismatch: recorded {} bytes, found {}",
                    record.byte_size,
                    bytes.len()
                )),
            };
        }
        if deep {
            let actual = sha256_hex(&bytes);
            if actual != record.checksum {
                return IntegrityReport {
                    id: record.id.clone(),
                    ok: false,
                    error: Some("checksum mismatch".to_string()),
                };
            }
        }
        IntegrityReport {
            id: record.id.clone(),
            ok: true,
            error: None,
        }
    }

    /// Read-only listing of everything in the index.
    pub async fn available_backups(&mut self) -> BackupListing {
        self.ensure_index().await;
        let now = self.clock.now();
        let index = self.index.get_or_insert_with(|| BackupIndex::new(now));
        BackupListing {
            generations: index.generations.clone(),
            incrementals: index.incrementals.clone(),
        }
    }

    /// Dry-run a restore and summarize how the result differs from
    /// `current`. Caller state is never mutated.
    pub async fn preview_restore(&mut self, id: &str, current: &Archive) -> RestorePreview {
        let outcome = self.restore_from_backup(id).await;
        let restored = match outcome.archive {
            Some(archive) => archive,
            None => {
                return RestorePreview {
                    success: false,
                    added: 0,
                    removed: 0,
                    modified: 0,
                    samples: Vec::new(),
                    error: outcome.error,
                };
            }
        };

        let now = self.clock.now();
        let diffs = calculate_diffs(&current.posts, &restored.posts, now);
        let mut added = 0;
        let mut removed = 0;
        let mut modified = 0;
        for diff in &diffs {
            match diff {
                crate::diff::PostDiff::Added { .. } => added += 1,
                crate::diff::PostDiff::Removed { .. } => removed += 1,
                crate::diff::PostDiff::Modified { .. } => modified += 1,
            }
        }
        let samples = diffs
            .iter()
            .take(PREVIEW_SAMPLE_LIMIT)
            .map(|d| d.post_id().to_string())
            .collect();

        RestorePreview {
            success: true,
            added,
            removed,
            modified,
            samples,
            error: None,
        }
    }

    /// Retention pass: delete expired generation blobs (kind by kind), then
    /// drop index entries whose backing blob no longer exists.
    pub async fn cleanup(&mut self) -> CleanupReport {
        self.ensure_index().await;
        let now = self.clock.now();
        let mut report = CleanupReport::default();

        for kind in PeriodKind::ALL {
            let (generations, incrementals, config) = {
                let index = self.index.get_or_insert_with(|| BackupIndex::new(now));
                (
                    index.generations.clone(),
                    index.incrementals.clone(),
                    index.config.clone(),
                )
            };
            let deleted = self
                .generations
                .cleanup(&generations, &incrementals, &config, kind)
                .await;
            report.deleted_generations.extend(deleted);
        }

        // Sweep entries whose blob disappeared (including the ones deleted
        // above).
        let records: Vec<(String, String, bool)> = {
            let index = self.index.get_or_insert_with(|| BackupIndex::new(now));
            index
                .generations
                .iter()
                .map(|r| (r.id.clone(), r.storage_key.clone(), true))
                .chain(
                    index
                        .incrementals
                        .iter()
                        .map(|r| (r.id.clone(), r.storage_key.clone(), false)),
                )
                .collect()
        };
        let mut missing: Vec<String> = Vec::new();
        for (id, key, is_generation) in records {
            if !self.store.exists(&key).await {
                if !is_generation && !report.deleted_generations.contains(&id) {
                    report.deleted_incrementals.push(id.clone());
                }
                missing.push(id);
            }
        }
        {
            let index = self.index.get_or_insert_with(|| BackupIndex::new(now));
            index.generations.retain(|r| !missing.contains(&r.id));
            index.incrementals.retain(|r| !missing.contains(&r.id));
        }
        report.dropped_index_entries = missing;

        self.save_index().await;
        report
    }
}
