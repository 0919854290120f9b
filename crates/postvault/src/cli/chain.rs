//! Commit chain command handlers.

use std::path::Path;
use std::sync::Arc;

use postvault_core::clock::Clock;
use postvault_core::history::{ChainConfig, CommitChain, RestoreOptions};
use postvault_core::post::Post;
use postvault_core::store::BlobStore;

use crate::cli::block_on;
use crate::cli::util::{load_archive, save_archive};

async fn open_chain(store: Arc<dyn BlobStore>, clock: Arc<dyn Clock>) -> CommitChain {
    CommitChain::open(store, clock, ChainConfig::default()).await
}

/// State at HEAD, or empty for a fresh chain.
async fn head_state(chain: &mut CommitChain) -> Result<Vec<Post>, String> {
    match chain.head().map(str::to_string) {
        Some(head) => chain
            .restore(RestoreOptions {
                target_id: &head,
                ..Default::default()
            })
            .await
            .map_err(|e| e.to_string()),
        None => Ok(Vec::new()),
    }
}

/// `commit`: record the archive's current posts as a commit.
pub fn handle_commit(
    store: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    archive_path: &Path,
    message: Option<&str>,
) -> bool {
    let Some(archive) = load_archive(archive_path) else {
        return false;
    };

    block_on(async {
        let mut chain = open_chain(store, clock).await;
        let old = match head_state(&mut chain).await {
            Ok(old) => old,
            Err(e) => {
                eprintln!("Cannot rebuild HEAD state: {}", e);
                return false;
            }
        };

        match chain.commit(&old, &archive.posts, message).await {
            Ok(Some(id)) => {
                println!("Committed {}", id);
                true
            }
            Ok(None) => {
                println!("Nothing to commit");
                true
            }
            Err(e) => {
                eprintln!("Commit failed: {}", e);
                false
            }
        }
    })
}

/// `history`: print the chain, newest first.
pub fn handle_history(store: Arc<dyn BlobStore>, clock: Arc<dyn Clock>, limit: usize) -> bool {
    block_on(async {
        let chain = open_chain(store, clock).await;
        let entries = chain.history(limit).await;
        if entries.is_empty() {
            println!("No commits");
            return true;
        }
        for entry in &entries {
            println!(
                "{}  {}  {} change(s)  {}",
                &entry.id[..12.min(entry.id.len())],
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.change_count,
                entry.message.as_deref().unwrap_or("")
            );
        }
        true
    })
}

/// `rollback`: restore the archive's posts to a commit.
pub fn handle_rollback(
    store: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    id: &str,
    archive_path: &Path,
    no_checkpoint: bool,
) -> bool {
    let Some(mut archive) = load_archive(archive_path) else {
        return false;
    };

    block_on(async {
        let mut chain = open_chain(store, clock).await;
        let current = archive.posts.clone();
        let options = RestoreOptions {
            target_id: id,
            checkpoint: if no_checkpoint { None } else { Some(&current) },
            checkpoint_message: Some("checkpoint before rollback"),
        };

        match chain.restore(options).await {
            Ok(posts) => {
                archive.posts = posts;
                if !save_archive(archive_path, &archive) {
                    return false;
                }
                println!(
                    "Rolled back to {} ({} posts)",
                    id,
                    archive.posts.len()
                );
                true
            }
            Err(e) => {
                eprintln!("Rollback failed: {}", e);
                false
            }
        }
    })
}
