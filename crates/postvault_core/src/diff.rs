//! Structural diffs between two versions of a post collection.
//!
//! The diff engine is pure: no I/O, no clock access. Callers stamp diffs
//! with a detection timestamp.
//!
//! Replay is order-dependent. [`apply_diffs`] processes entries strictly in
//! the given order and must only ever be fed a diff set in its recorded
//! order; it tolerates missing targets (skip and continue) but makes no
//! attempt to reorder.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::post::Post;

/// One structural change to the post collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PostDiff {
    /// Post exists only in the new version
    Added {
        /// Id of the added post
        post_id: String,
        /// The post as it appears in the new version
        post: Post,
        /// When the change was detected
        detected_at: DateTime<Utc>,
    },
    /// Post exists only in the old version
    Removed {
        /// Id of the removed post
        post_id: String,
        /// The post as it appeared in the old version
        post: Post,
        /// When the change was detected
        detected_at: DateTime<Utc>,
    },
    /// Post exists in both versions with differing fields
    Modified {
        /// Id of the modified post
        post_id: String,
        /// The post before the change
        before: Post,
        /// The post after the change
        after: Post,
        /// When the change was detected
        detected_at: DateTime<Utc>,
    },
}

impl PostDiff {
    /// Id of the post this diff touches.
    pub fn post_id(&self) -> &str {
        match self {
            PostDiff::Added { post_id, .. }
            | PostDiff::Removed { post_id, .. }
            | PostDiff::Modified { post_id, .. } => post_id,
        }
    }

    /// When the change was detected.
    pub fn detected_at(&self) -> DateTime<Utc> {
        match self {
            PostDiff::Added { detected_at, .. }
            | PostDiff::Removed { detected_at, .. }
            | PostDiff::Modified { detected_at, .. } => *detected_at,
        }
    }
}

/// Compute the structural diff between two versions of the collection.
///
/// Emits, in this fixed order: all `Added` for ids present only in `new`
/// (in `new` order); all `Removed` for ids present only in `old` (in `old`
/// order); all `Modified` for ids present in both whose field set differs
/// (in `new` order). Field comparison is per-field (derived equality), with
/// array fields compared element-wise in order.
pub fn calculate_diffs(old: &[Post], new: &[Post], detected_at: DateTime<Utc>) -> Vec<PostDiff> {
    let old_by_id: HashMap<&str, &Post> = old.iter().map(|p| (p.id.as_str(), p)).collect();
    let new_by_id: HashMap<&str, &Post> = new.iter().map(|p| (p.id.as_str(), p)).collect();

    let mut diffs = Vec::new();

    for post in new {
        if !old_by_id.contains_key(post.id.as_str()) {
            diffs.push(PostDiff::Added {
                post_id: post.id.clone(),
                post: post.clone(),
                detected_at,
            });
        }
    }

    for post in old {
        if !new_by_id.contains_key(post.id.as_str()) {
            diffs.push(PostDiff::Removed {
                post_id: post.id.clone(),
                post: post.clone(),
                detected_at,
            });
        }
    }

    for post in new {
        if let Some(&before) = old_by_id.get(post.id.as_str()) {
            if before != post {
                diffs.push(PostDiff::Modified {
                    post_id: post.id.clone(),
                    before: before.clone(),
                    after: post.clone(),
                    detected_at,
                });
            }
        }
    }

    diffs
}

/// Apply a diff set to a collection, returning the new version.
///
/// Maintains an id→index map over a working copy and processes diffs
/// strictly in the given order. Missing targets (a `Removed`/`Modified` for
/// an id that is not present, or an `Added` for an id that already is) are
/// skipped with a debug log. This function never fails.
pub fn apply_diffs(posts: &[Post], diffs: &[PostDiff]) -> Vec<Post> {
    let mut result: Vec<Post> = posts.to_vec();
    let mut index: HashMap<String, usize> = result
        .iter()
        .enumerate()
        .map(|(i, p)| (p.id.clone(), i))
        .collect();

    for diff in diffs {
        match diff {
            PostDiff::Added { post_id, post, .. } => {
                if index.contains_key(post_id) {
                    log::debug!("apply_diffs: add target '{}' already present, skipping", post_id);
                    continue;
                }
                index.insert(post_id.clone(), result.len());
                result.push(post.clone());
            }
            PostDiff::Removed { post_id, .. } => match index.remove(post_id) {
                Some(at) => {
                    result.remove(at);
                    // Every entry behind the removed slot shifts down one.
                    for slot in index.values_mut() {
                        if *slot > at {
                            *slot -= 1;
                        }
                    }
                }
                None => {
                    log::debug!("apply_diffs: remove target '{}' not present, skipping", post_id);
                }
            },
            PostDiff::Modified { post_id, after, .. } => match index.get(post_id) {
                Some(&at) => result[at] = after.clone(),
                None => {
                    log::debug!("apply_diffs: modify target '{}' not present, skipping", post_id);
                }
            },
        }
    }

    result
}

/// Invert a diff set for undo.
///
/// Swaps `Added`↔`Removed` (keeping their payload), swaps before/after for
/// `Modified`, and reverses the overall list order so the inverted set
/// replays last-change-first.
pub fn reverse_diffs(diffs: &[PostDiff]) -> Vec<PostDiff> {
    diffs
        .iter()
        .rev()
        .map(|diff| match diff {
            PostDiff::Added {
                post_id,
                post,
                detected_at,
            } => PostDiff::Removed {
                post_id: post_id.clone(),
                post: post.clone(),
                detected_at: *detected_at,
            },
            PostDiff::Removed {
                post_id,
                post,
                detected_at,
            } => PostDiff::Added {
                post_id: post_id.clone(),
                post: post.clone(),
                detected_at: *detected_at,
            },
            PostDiff::Modified {
                post_id,
                before,
                after,
                detected_at,
            } => PostDiff::Modified {
                post_id: post_id.clone(),
                before: after.clone(),
                after: before.clone(),
                detected_at: *detected_at,
            },
        })
        .collect()
}

/// Human-readable per-kind counts for a diff set.
pub fn summarize_diffs(diffs: &[PostDiff]) -> String {
    if diffs.is_empty() {
        return "no changes".to_string();
    }

    let mut added = 0usize;
    let mut removed = 0usize;
    let mut modified = 0usize;
    for diff in diffs {
        match diff {
            PostDiff::Added { .. } => added += 1,
            PostDiff::Removed { .. } => removed += 1,
            PostDiff::Modified { .. } => modified += 1,
        }
    }

    format!("{} added, {} removed, {} modified", added, removed, modified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::post::Post;

    fn now() -> DateTime<Utc> {
        "2026-03-01T12:00:00Z".parse().unwrap()
    }

    fn posts(ids: &[&str]) -> Vec<Post> {
        ids.iter().map(|id| Post::new(*id, *id, now())).collect()
    }

    #[test]
    fn test_calculate_orders_adds_removes_modifies() {
        let old = posts(&["a", "b", "c"]);
        let mut new = posts(&["a", "b", "d", "e"]);
        new[1].edit_text("b2", now());

        let diffs = calculate_diffs(&old, &new, now());
        let kinds: Vec<&str> = diffs
            .iter()
            .map(|d| match d {
                PostDiff::Added { .. } => "add",
                PostDiff::Removed { .. } => "remove",
                PostDiff::Modified { .. } => "modify",
            })
            .collect();

        assert_eq!(kinds, vec!["add", "add", "remove", "modify"]);
        assert_eq!(diffs[0].post_id(), "d");
        assert_eq!(diffs[1].post_id(), "e");
        assert_eq!(diffs[2].post_id(), "c");
        assert_eq!(diffs[3].post_id(), "b");
    }

    #[test]
    fn test_round_trip() {
        let old = posts(&["a", "b", "c"]);
        let mut new = posts(&["b", "d"]);
        new[0].like_count = 7;
        new[0].tags.push("pinned".to_string());

        let diffs = calculate_diffs(&old, &new, now());
        let rebuilt = apply_diffs(&old, &diffs);

        // Same id set and per-field equality; order of survivors is the
        // working-copy order, so compare as id-keyed sets.
        assert_eq!(rebuilt.len(), new.len());
        for post in &new {
            let found = rebuilt.iter().find(|p| p.id == post.id).unwrap();
            assert_eq!(found, post);
        }
    }

    #[test]
    fn test_empty_diff_for_equal_collections() {
        let a = posts(&["a", "b"]);
        assert!(calculate_diffs(&a, &a.clone(), now()).is_empty());
    }

    #[test]
    fn test_apply_skips_missing_targets() {
        let base = posts(&["a"]);
        let ghost = Post::new("ghost", "ghost", now());
        let diffs = vec![
            PostDiff::Removed {
                post_id: "ghost".to_string(),
                post: ghost.clone(),
                detected_at: now(),
            },
            PostDiff::Modified {
                post_id: "ghost".to_string(),
                before: ghost.clone(),
                after: ghost,
                detected_at: now(),
            },
            PostDiff::Added {
                post_id: "b".to_string(),
                post: Post::new("b", "b", now()),
                detected_at: now(),
            },
        ];

        let result = apply_diffs(&base, &diffs);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].id, "a");
        assert_eq!(result[1].id, "b");
    }

    #[test]
    fn test_remove_shifts_following_indices() {
        let base = posts(&["a", "b", "c"]);
        let mut after_b = base[1].clone();
        after_b.like_count = 1;
        let diffs = vec![
            PostDiff::Removed {
                post_id: "a".to_string(),
                post: base[0].clone(),
                detected_at: now(),
            },
            // "b" now sits at index 0; the modify must land on it.
            PostDiff::Modified {
                post_id: "b".to_string(),
                before: base[1].clone(),
                after: after_b.clone(),
                detected_at: now(),
            },
        ];

        let result = apply_diffs(&base, &diffs);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0], after_b);
        assert_eq!(result[1].id, "c");
    }

    #[test]
    fn test_reverse_undoes() {
        let old = posts(&["a", "b", "c"]);
        let mut new = posts(&["a", "c", "d"]);
        new[1].edit_text("c2", now());

        let diffs = calculate_diffs(&old, &new, now());
        let applied = apply_diffs(&old, &diffs);
        let undone = apply_diffs(&applied, &reverse_diffs(&diffs));

        assert_eq!(undone.len(), old.len());
        for post in &old {
            let found = undone.iter().find(|p| p.id == post.id).unwrap();
            assert_eq!(found, post);
        }
    }

    #[test]
    fn test_summary() {
        let old = posts(&["a", "b"]);
        let new = posts(&["a", "c"]);
        let diffs = calculate_diffs(&old, &new, now());
        assert_eq!(summarize_diffs(&diffs), "1 added, 1 removed, 0 modified");
        assert_eq!(summarize_diffs(&[]), "no changes");
    }
}
