//! Clap argument definitions.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use postvault_core::backup::PeriodKind;

/// Backup and point-in-time recovery for post archives.
#[derive(Parser)]
#[command(name = "postvault", version, about)]
pub struct Cli {
    /// Directory holding the backup store
    #[arg(long, global = true, default_value = ".postvault")]
    pub store: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Period kind as a CLI value.
#[derive(Clone, Copy, ValueEnum)]
pub enum PeriodArg {
    /// One snapshot per calendar day
    Daily,
    /// One snapshot per ISO week
    Weekly,
    /// One snapshot per calendar month
    Monthly,
}

impl From<PeriodArg> for PeriodKind {
    fn from(value: PeriodArg) -> Self {
        match value {
            PeriodArg::Daily => PeriodKind::Daily,
            PeriodArg::Weekly => PeriodKind::Weekly,
            PeriodArg::Monthly => PeriodKind::Monthly,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a backup cycle for the archive, as a primary save would
    Save {
        /// Path to the archive JSON file
        #[arg(long)]
        archive: PathBuf,
        /// Reason recorded in the log
        #[arg(long)]
        reason: Option<String>,
    },

    /// Capture an unconditional full snapshot
    Backup {
        /// Path to the archive JSON file
        #[arg(long)]
        archive: PathBuf,
        /// Period kind to tag the snapshot with
        #[arg(long, value_enum, default_value = "daily")]
        kind: PeriodArg,
    },

    /// List indexed backups
    List,

    /// Restore a backup into an archive JSON file
    Restore {
        /// Backup id to restore
        id: String,
        /// Where to write the reconstructed archive
        #[arg(long)]
        output: PathBuf,
    },

    /// Show what restoring a backup would change
    Preview {
        /// Backup id to preview
        id: String,
        /// Path to the current archive JSON file
        #[arg(long)]
        archive: PathBuf,
    },

    /// Verify stored blobs against the index
    Verify {
        /// Also recompute and compare content checksums
        #[arg(long)]
        deep: bool,
    },

    /// Delete expired snapshots and drop dangling index entries
    Cleanup,

    /// Record the archive's current state as a commit
    Commit {
        /// Path to the archive JSON file
        #[arg(long)]
        archive: PathBuf,
        /// Commit message
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Show the commit chain, newest first
    History {
        /// Maximum entries to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Roll the archive back to a commit
    Rollback {
        /// Commit id to restore
        id: String,
        /// Path to the archive JSON file (read for the checkpoint, then
        /// overwritten with the restored state)
        #[arg(long)]
        archive: PathBuf,
        /// Skip the safety checkpoint commit
        #[arg(long)]
        no_checkpoint: bool,
    },
}
