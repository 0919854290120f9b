//! Git-like commit chain over post diffs.
//!
//! Commits form a singly linked history: each commit carries a diff set and
//! a `parent_id` pointing at its predecessor, terminating at `None`. `HEAD`
//! is a single stored id, kept separately from the commit blobs.
//!
//! This subsystem is independent of [`crate::backup`]. Its restore
//! semantics differ deliberately: a commit-chain restore replays the
//! *entire* reachable history from an initially empty collection, while the
//! backup engine does a bounded base-snapshot-plus-incrementals walk. The
//! two must not be conflated.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checksum::sha256_hex;
use crate::clock::Clock;
use crate::diff::{apply_diffs, calculate_diffs, summarize_diffs, PostDiff};
use crate::error::{Result, VaultError};
use crate::post::{Archive, Post};
use crate::store::{keys, BlobStore};

/// Policy knobs for the commit chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Maximum number of stored commits before pruning
    #[serde(default = "default_max_commits")]
    pub max_commits: usize,

    /// Author recorded on new commits
    #[serde(default = "default_author")]
    pub author: String,
}

fn default_max_commits() -> usize {
    100
}

fn default_author() -> String {
    "postvault".to_string()
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_commits: default_max_commits(),
            author: default_author(),
        }
    }
}

/// One node in the commit chain.
///
/// A commit's id is a pure function of `{timestamp, diffs, parent_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    /// Content-derived id
    pub id: String,
    /// Optional commit message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the commit was made
    pub timestamp: DateTime<Utc>,
    /// Id of the parent commit, `None` for the chain root
    pub parent_id: Option<String>,
    /// Diff set this commit records
    pub diffs: Vec<PostDiff>,
    /// Who made the commit
    pub author: String,
    /// Optional full archive snapshot carried with the commit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_snapshot: Option<Archive>,
}

/// Display-oriented view of a commit, without payloads.
#[derive(Debug, Clone)]
pub struct CommitSummary {
    /// Commit id
    pub id: String,
    /// Commit message, if any
    pub message: Option<String>,
    /// When the commit was made
    pub timestamp: DateTime<Utc>,
    /// Parent id, `None` for the root
    pub parent_id: Option<String>,
    /// Number of diff entries in the commit
    pub change_count: usize,
    /// Commit author
    pub author: String,
}

/// Options for [`CommitChain::restore`].
#[derive(Debug, Default)]
pub struct RestoreOptions<'a> {
    /// Id of the commit to restore to
    pub target_id: &'a str,
    /// Current posts to commit first as a safety checkpoint, if any
    pub checkpoint: Option<&'a [Post]>,
    /// Message for the checkpoint commit
    pub checkpoint_message: Option<&'a str>,
}

/// The commit chain.
///
/// The in-memory `HEAD` is only advanced after the persisted HEAD write
/// succeeds, so cache and disk cannot diverge on partial failure.
pub struct CommitChain {
    store: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    config: ChainConfig,
    head: Option<String>,
    commits_made: u64,
}

impl CommitChain {
    /// Open the chain at whatever HEAD the store holds.
    pub async fn open(store: Arc<dyn BlobStore>, clock: Arc<dyn Clock>, config: ChainConfig) -> Self {
        let head = if store.exists(keys::HEAD).await {
            match store.read(keys::HEAD).await {
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes).trim().to_string();
                    if text.is_empty() { None } else { Some(text) }
                }
                Err(e) => {
                    log::warn!("HEAD is unreadable, starting detached: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            store,
            clock,
            config,
            head,
            commits_made: 0,
        }
    }

    /// Current HEAD commit id, if any.
    pub fn head(&self) -> Option<&str> {
        self.head.as_deref()
    }

    /// Commits made through this instance.
    pub fn commits_made(&self) -> u64 {
        self.commits_made
    }

    /// Record the diff between two post collections as a new commit.
    ///
    /// An empty diff makes no commit and returns `Ok(None)`.
    pub async fn commit(
        &mut self,
        old_posts: &[Post],
        new_posts: &[Post],
        message: Option<&str>,
    ) -> Result<Option<String>> {
        self.commit_with_snapshot(old_posts, new_posts, message, None).await
    }

    /// Like [`commit`], optionally carrying a full archive snapshot.
    ///
    /// [`commit`]: CommitChain::commit
    pub async fn commit_with_snapshot(
        &mut self,
        old_posts: &[Post],
        new_posts: &[Post],
        message: Option<&str>,
        snapshot: Option<&Archive>,
    ) -> Result<Option<String>> {
        let now = self.clock.now();
        let diffs = calculate_diffs(old_posts, new_posts, now);
        if diffs.is_empty() {
            return Ok(None);
        }

        let parent_id = self.head.clone();
        let id = commit_id(now, &diffs, parent_id.as_deref())?;
        let commit = Commit {
            id: id.clone(),
            message: message.map(str::to_string),
            timestamp: now,
            parent_id,
            diffs,
            author: self.config.author.clone(),
            archive_snapshot: snapshot.cloned(),
        };

        let key = keys::commit(&id);
        let bytes = serde_json::to_vec(&commit)?;
        self.store.mkdir(keys::COMMIT_DIR).await?;
        self.store
            .write(&key, &bytes)
            .await
            .map_err(|source| VaultError::BlobWrite { key, source })?;

        self.store
            .write(keys::HEAD, id.as_bytes())
            .await
            .map_err(|source| VaultError::BlobWrite {
                key: keys::HEAD.to_string(),
                source,
            })?;
        // HEAD on disk is updated; only now move the in-memory pointer.
        self.head = Some(id.clone());
        self.commits_made += 1;
        log::debug!("commit {}: {}", id, summarize_diffs(&commit.diffs));

        if let Err(e) = self.prune().await {
            log::warn!("commit pruning failed: {}", e);
        }

        Ok(Some(id))
    }

    /// Walk the chain from HEAD, newest first.
    ///
    /// Stops at `limit` entries or at the first broken link.
    pub async fn history(&self, limit: usize) -> Vec<CommitSummary> {
        let mut entries = Vec::new();
        let mut cursor = self.head.clone();
        let mut seen: HashSet<String> = HashSet::new();

        while let Some(id) = cursor {
            if entries.len() >= limit || !seen.insert(id.clone()) {
                break;
            }
            match self.load_commit(&id).await {
                Ok(commit) => {
                    cursor = commit.parent_id.clone();
                    entries.push(CommitSummary {
                        id: commit.id,
                        message: commit.message,
                        timestamp: commit.timestamp,
                        parent_id: commit.parent_id,
                        change_count: commit.diffs.len(),
                        author: commit.author,
                    });
                }
                Err(e) => {
                    log::debug!("history walk stopped at '{}': {}", id, e);
                    break;
                }
            }
        }

        entries
    }

    /// Reconstruct the post collection at a commit.
    ///
    /// Optionally commits `options.checkpoint` first as a safety point.
    /// Reconstruction replays the entire chain: every commit from the
    /// oldest reachable one up to the target, oldest-first, applied to an
    /// initially empty collection. This is a full-history replay, not the
    /// backup engine's base-plus-chain walk.
    pub async fn restore(&mut self, options: RestoreOptions<'_>) -> Result<Vec<Post>> {
        if let Some(current) = options.checkpoint {
            let head_state = self.replay_to_head().await?;
            let message = options.checkpoint_message.unwrap_or("checkpoint before restore");
            self.commit(&head_state, current, Some(message)).await?;
        }

        self.replay_to(options.target_id).await
    }

    /// Replay the full chain up to and including `target_id`.
    async fn replay_to(&self, target_id: &str) -> Result<Vec<Post>> {
        let mut chain = Vec::new();
        let mut cursor = Some(target_id.to_string());
        let mut seen: HashSet<String> = HashSet::new();

        while let Some(id) = cursor {
            if !seen.insert(id.clone()) {
                return Err(VaultError::BrokenCommitLink(id));
            }
            let commit = self.load_commit(&id).await?;
            cursor = commit.parent_id.clone();
            chain.push(commit);
        }

        chain.reverse();
        let mut posts: Vec<Post> = Vec::new();
        for commit in &chain {
            posts = apply_diffs(&posts, &commit.diffs);
        }
        Ok(posts)
    }

    async fn replay_to_head(&self) -> Result<Vec<Post>> {
        match &self.head {
            Some(head) => self.replay_to(head).await,
            None => Ok(Vec::new()),
        }
    }

    async fn load_commit(&self, id: &str) -> Result<Commit> {
        let key = keys::commit(id);
        if !self.store.exists(&key).await {
            return Err(VaultError::CommitNotFound(id.to_string()));
        }
        let bytes = self
            .store
            .read(&key)
            .await
            .map_err(|_| VaultError::BrokenCommitLink(id.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| VaultError::MalformedBlob {
            key,
            reason: e.to_string(),
        })
    }

    /// Delete stored commits not reachable from HEAD within `max_commits`.
    async fn prune(&mut self) -> Result<()> {
        let stored = self.store.list(keys::COMMIT_DIR).await?;
        if stored.len() <= self.config.max_commits {
            return Ok(());
        }

        let mut reachable: HashSet<String> = HashSet::new();
        let mut cursor = self.head.clone();
        while let Some(id) = cursor {
            if reachable.len() >= self.config.max_commits || !reachable.insert(id.clone()) {
                break;
            }
            match self.load_commit(&id).await {
                Ok(commit) => cursor = commit.parent_id,
                Err(e) => {
                    log::debug!("reachability walk stopped at '{}': {}", id, e);
                    break;
                }
            }
        }

        for key in stored {
            let Some(id) = keys::commit_id_from_key(&key) else {
                continue;
            };
            if reachable.contains(id) {
                continue;
            }
            log::debug!("pruning unreachable commit '{}'", id);
            if let Err(e) = self.store.remove(&key).await {
                log::warn!("failed to delete commit blob '{}': {}", key, e);
            }
        }

        Ok(())
    }
}

/// Commit id: SHA-256 over the canonical encoding of
/// `{timestamp, diffs, parent_id}`.
fn commit_id(
    timestamp: DateTime<Utc>,
    diffs: &[PostDiff],
    parent_id: Option<&str>,
) -> Result<String> {
    #[derive(Serialize)]
    struct IdInput<'a> {
        timestamp: DateTime<Utc>,
        diffs: &'a [PostDiff],
        parent_id: Option<&'a str>,
    }

    let bytes = serde_json::to_vec(&IdInput {
        timestamp,
        diffs,
        parent_id,
    })?;
    Ok(sha256_hex(&bytes))
}
