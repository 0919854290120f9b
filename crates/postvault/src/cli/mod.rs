//! Command-line interface for postvault.

/// Clap argument definitions
mod args;

/// Backup command handlers
mod backup;

/// Commit chain command handlers
mod chain;

/// Shared CLI utilities
mod util;

use std::sync::Arc;

use clap::Parser;

use postvault_core::backup::BackupEngine;
use postvault_core::clock::SystemClock;
use postvault_core::store::DirBlobStore;

pub use args::Cli;
use args::Commands;

/// Helper to run async operations in sync context
fn block_on<F: std::future::Future>(f: F) -> F::Output {
    futures_lite::future::block_on(f)
}

/// Main entry point for the CLI
pub fn run_cli() {
    let cli = Cli::parse();

    let store = Arc::new(DirBlobStore::new(&cli.store));
    let clock = Arc::new(SystemClock);
    let mut engine = BackupEngine::new(store.clone(), clock.clone());

    let success = match cli.command {
        Commands::Save { archive, reason } => {
            backup::handle_save(&mut engine, &archive, reason.as_deref())
        }

        Commands::Backup { archive, kind } => {
            backup::handle_backup(&mut engine, &archive, kind.into())
        }

        Commands::List => backup::handle_list(&mut engine),

        Commands::Restore { id, output } => backup::handle_restore(&mut engine, &id, &output),

        Commands::Preview { id, archive } => backup::handle_preview(&mut engine, &id, &archive),

        Commands::Verify { deep } => backup::handle_verify(&mut engine, deep),

        Commands::Cleanup => backup::handle_cleanup(&mut engine),

        Commands::Commit { archive, message } => {
            chain::handle_commit(store, clock, &archive, message.as_deref())
        }

        Commands::History { limit } => chain::handle_history(store, clock, limit),

        Commands::Rollback {
            id,
            archive,
            no_checkpoint,
        } => chain::handle_rollback(store, clock, &id, &archive, no_checkpoint),
    };

    if !success {
        std::process::exit(1);
    }
}
