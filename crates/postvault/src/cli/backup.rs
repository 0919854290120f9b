//! Backup command handlers.

use std::path::Path;

use postvault_core::backup::{BackupEngine, BackupRecord, PeriodKind};

use crate::cli::block_on;
use crate::cli::util::{load_archive, save_archive};

/// `save`: run one backup cycle, as a primary save of the archive would.
///
/// The previous snapshot is rebuilt from the most recent backup so that
/// consecutive invocations capture incrementals against each other.
pub fn handle_save(engine: &mut BackupEngine, archive_path: &Path, reason: Option<&str>) -> bool {
    let Some(archive) = load_archive(archive_path) else {
        return false;
    };

    block_on(async {
        if let Some(previous) = latest_backup_state(engine).await {
            engine.prime(&previous);
        }

        let report = engine.record_save(&archive, reason).await;
        match &report.incremental_id {
            Some(id) => println!("Captured incremental {}", id),
            None => println!("No incremental captured (nothing changed or first run)"),
        }
        for id in &report.generation_ids {
            println!("Captured generation {}", id);
        }
        for error in &report.errors {
            eprintln!("Warning: {}", error);
        }
        report.errors.is_empty()
    })
}

/// Rebuild the archive state of the most recent backup, if any.
async fn latest_backup_state(engine: &mut BackupEngine) -> Option<postvault_core::post::Archive> {
    let listing = engine.available_backups().await;
    let newest = listing
        .generations
        .iter()
        .chain(listing.incrementals.iter())
        .max_by_key(|r| r.created_at)?
        .id
        .clone();
    engine.restore_from_backup(&newest).await.archive
}

/// `backup`: unconditional full snapshot.
pub fn handle_backup(engine: &mut BackupEngine, archive_path: &Path, kind: PeriodKind) -> bool {
    let Some(archive) = load_archive(archive_path) else {
        return false;
    };

    block_on(async {
        let outcome = engine.create_manual(&archive, kind).await;
        match (&outcome.record_id, &outcome.error) {
            (Some(id), _) => {
                println!("Captured {} snapshot {}", kind, id);
                outcome.success
            }
            (None, Some(error)) => {
                eprintln!("Snapshot failed: {}", error);
                false
            }
            (None, None) => false,
        }
    })
}

fn print_record(record: &BackupRecord) {
    let detail = match (record.period_info(), record.base_backup_id()) {
        (Some((kind, period)), _) => format!("{} {}", kind, period),
        (_, Some(base)) => format!("base {}", base),
        _ => String::new(),
    };
    println!(
        "  {}  {}  {} bytes  {}",
        record.id,
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
        record.byte_size,
        detail
    );
}

/// `list`: print the index.
pub fn handle_list(engine: &mut BackupEngine) -> bool {
    block_on(async {
        let listing = engine.available_backups().await;
        println!("Generations ({}):", listing.generations.len());
        for record in &listing.generations {
            print_record(record);
        }
        println!("Incrementals ({}):", listing.incrementals.len());
        for record in &listing.incrementals {
            print_record(record);
        }
        let total: u64 = listing
            .generations
            .iter()
            .chain(listing.incrementals.iter())
            .map(|r| r.byte_size)
            .sum();
        println!(
            "{} backup(s), {} bytes",
            listing.generations.len() + listing.incrementals.len(),
            total
        );
        true
    })
}

/// `restore`: reconstruct a backup into an archive file.
pub fn handle_restore(engine: &mut BackupEngine, id: &str, output: &Path) -> bool {
    block_on(async {
        let outcome = engine.restore_from_backup(id).await;
        match outcome.archive {
            Some(archive) => {
                if !save_archive(output, &archive) {
                    return false;
                }
                println!(
                    "Restored {} ({} posts) to {}",
                    id,
                    archive.posts.len(),
                    output.display()
                );
                true
            }
            None => {
                eprintln!(
                    "Restore failed: {}",
                    outcome.error.unwrap_or_else(|| "unknown error".to_string())
                );
                false
            }
        }
    })
}

/// `preview`: dry-run a restore against the current archive.
pub fn handle_preview(engine: &mut BackupEngine, id: &str, archive_path: &Path) -> bool {
    let Some(archive) = load_archive(archive_path) else {
        return false;
    };

    block_on(async {
        let preview = engine.preview_restore(id, &archive).await;
        if !preview.success {
            eprintln!(
                "Preview failed: {}",
                preview.error.unwrap_or_else(|| "unknown error".to_string())
            );
            return false;
        }
        println!(
            "Restoring {} would add {}, remove {}, modify {} post(s)",
            id, preview.added, preview.removed, preview.modified
        );
        if !preview.samples.is_empty() {
            println!("Affected: {}", preview.samples.join(", "));
        }
        true
    })
}

/// `verify`: integrity-check every indexed backup.
pub fn handle_verify(engine: &mut BackupEngine, deep: bool) -> bool {
    block_on(async {
        let reports = engine.check_all_backups_integrity(deep).await;
        let mut all_ok = true;
        for report in &reports {
            if report.ok {
                println!("  ok      {}", report.id);
            } else {
                all_ok = false;
                println!(
                    "  FAILED  {}  {}",
                    report.id,
                    report.error.as_deref().unwrap_or("")
                );
            }
        }
        println!(
            "{} of {} backup(s) verified",
            reports.iter().filter(|r| r.ok).count(),
            reports.len()
        );
        all_ok
    })
}

/// `cleanup`: retention pass.
pub fn handle_cleanup(engine: &mut BackupEngine) -> bool {
    block_on(async {
        let report = engine.cleanup().await;
        println!(
            "Deleted {} generation(s), {} incremental(s); dropped {} index entries",
            report.deleted_generations.len(),
            report.deleted_incrementals.len(),
            report.dropped_index_entries.len()
        );
        true
    })
}
