//! Data model for posts and the archive that owns them.
//!
//! A [`Post`] is a single timestamped record; the [`Archive`] is the ordered
//! collection of posts plus the small profile/governance metadata that gets
//! diffed and snapshotted as one unit.
//!
//! Every field participates in diff detection: equality is derived per-field,
//! with array fields (tags, links, attachments) compared element-wise in
//! order. There is no serialized-text comparison anywhere.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Who can see a post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Visible to everyone
    #[default]
    Public,
    /// Visible to followers only
    Followers,
    /// Visible to the author only
    Private,
}

/// Maturity of a post when used as a note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteQuality {
    /// Quick capture, not yet reviewed
    #[default]
    Fleeting,
    /// Sourced from external material
    Literature,
    /// Reviewed and integrated
    Permanent,
}

/// Task tracking state attached to a post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not a task
    #[default]
    None,
    /// Open task
    Todo,
    /// In progress
    Doing,
    /// Completed
    Done,
}

/// Descriptor for a file attached to a post.
///
/// The content itself lives outside the archive; only the reference is
/// carried here so diffs stay cheap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileAttachment {
    /// File name as shown to the user
    pub name: String,
    /// Kind discriminator (e.g. "image", "audio")
    pub kind: String,
    /// Reference to the stored content (path or key)
    pub content_ref: String,
}

/// A single timestamped post record.
///
/// Posts are owned by the [`Archive`]; no other entity holds them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Unique id within the archive
    pub id: String,

    /// Body text
    pub text: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Like counter
    #[serde(default)]
    pub like_count: u32,

    /// Retweet counter
    #[serde(default)]
    pub retweet_count: u32,

    /// Whether the owner liked this post
    #[serde(default)]
    pub liked: bool,

    /// Whether the owner retweeted this post
    #[serde(default)]
    pub retweeted: bool,

    /// Whether the text was edited after creation
    #[serde(default)]
    pub edited: bool,

    /// Number of replies under this post
    #[serde(default)]
    pub reply_count: u32,

    /// Id of the parent post when this is a reply (thread membership)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Id of the quoted post, if this is a quote
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_id: Option<String>,

    /// Visibility of the post
    #[serde(default)]
    pub visibility: Visibility,

    /// Soft deletion tombstone - if true, post is considered deleted
    #[serde(default)]
    pub deleted: bool,

    /// Bookmark flag
    #[serde(default)]
    pub bookmarked: bool,

    /// Note maturity
    #[serde(default)]
    pub quality: NoteQuality,

    /// Task tracking state
    #[serde(default)]
    pub task_status: TaskStatus,

    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Outgoing links
    #[serde(default)]
    pub links: Vec<String>,

    /// Attached file descriptors
    #[serde(default)]
    pub files: Vec<FileAttachment>,

    /// Author id
    #[serde(default)]
    pub author_id: String,

    /// Author display name
    #[serde(default)]
    pub author_name: String,

    /// Author verified flag
    #[serde(default)]
    pub verified: bool,
}

impl Post {
    /// Create a new post with the given id and text, stamped with `now`.
    pub fn new(id: impl Into<String>, text: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            created_at: now,
            updated_at: now,
            like_count: 0,
            retweet_count: 0,
            liked: false,
            retweeted: false,
            edited: false,
            reply_count: 0,
            parent_id: None,
            quoted_id: None,
            visibility: Visibility::default(),
            deleted: false,
            bookmarked: false,
            quality: NoteQuality::default(),
            task_status: TaskStatus::default(),
            tags: Vec::new(),
            links: Vec::new(),
            files: Vec::new(),
            author_id: String::new(),
            author_name: String::new(),
            verified: false,
        }
    }

    /// Replace the body text, marking the post as edited.
    pub fn edit_text(&mut self, text: impl Into<String>, now: DateTime<Utc>) {
        self.text = text.into();
        self.edited = true;
        self.updated_at = now;
    }

    /// Mark this post as deleted (soft delete).
    pub fn mark_deleted(&mut self, now: DateTime<Utc>) {
        self.deleted = true;
        self.updated_at = now;
    }
}

/// A post scheduled for future publication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduledPost {
    /// Unique id of the scheduled entry
    pub id: String,
    /// Body text to publish
    pub text: String,
    /// When the post should be published
    pub publish_at: Option<DateTime<Utc>>,
}

/// Owner profile scalars carried alongside the posts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Stable user id
    #[serde(default)]
    pub user_id: String,
    /// Display name
    #[serde(default)]
    pub user_name: String,
    /// Verified flag
    #[serde(default)]
    pub verified: bool,
}

/// The archive: ordered posts plus small metadata.
///
/// This is the unit that gets diffed and snapshotted. Post order is
/// significant and preserved through snapshot/restore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Archive {
    /// Ordered list of posts
    #[serde(default)]
    pub posts: Vec<Post>,

    /// Owner profile
    #[serde(default)]
    pub profile: Profile,

    /// Governance map (policy key -> value), order-preserving
    #[serde(default)]
    pub governance: IndexMap<String, String>,

    /// Posts scheduled for future publication
    #[serde(default)]
    pub scheduled: Vec<ScheduledPost>,
}

impl Archive {
    /// Create an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a post by id.
    pub fn find_post(&self, id: &str) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == id)
    }

    /// Drop structurally unusable entries after a restore.
    ///
    /// Restored payloads may predate the current schema; posts without an id
    /// cannot participate in diffing and are removed.
    pub fn normalize(&mut self) {
        let before = self.posts.len();
        self.posts.retain(|p| !p.id.is_empty());
        let dropped = before - self.posts.len();
        if dropped > 0 {
            log::debug!("normalize: dropped {} post(s) without an id", dropped);
        }
        self.scheduled.retain(|s| !s.id.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2026-03-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_post_new_defaults() {
        let post = Post::new("p1", "hello", now());
        assert_eq!(post.id, "p1");
        assert_eq!(post.visibility, Visibility::Public);
        assert_eq!(post.task_status, TaskStatus::None);
        assert!(!post.deleted);
        assert_eq!(post.created_at, post.updated_at);
    }

    #[test]
    fn test_edit_text_marks_edited() {
        let mut post = Post::new("p1", "hello", now());
        let later = now() + chrono::Duration::minutes(5);
        post.edit_text("hello world", later);
        assert!(post.edited);
        assert_eq!(post.updated_at, later);
        assert_eq!(post.created_at, now());
    }

    #[test]
    fn test_field_equality_is_per_field() {
        let a = Post::new("p1", "hello", now());
        let mut b = a.clone();
        assert_eq!(a, b);
        b.tags.push("news".to_string());
        assert_ne!(a, b);
    }

    #[test]
    fn test_normalize_drops_idless_posts() {
        let mut archive = Archive::new();
        archive.posts.push(Post::new("p1", "keep", now()));
        archive.posts.push(Post::new("", "drop", now()));
        archive.normalize();
        assert_eq!(archive.posts.len(), 1);
        assert_eq!(archive.posts[0].id, "p1");
    }

    #[test]
    fn test_archive_roundtrip_json() {
        let mut archive = Archive::new();
        archive.profile.user_name = "alice".to_string();
        archive
            .governance
            .insert("moderation".to_string(), "strict".to_string());
        archive.posts.push(Post::new("p1", "hello", now()));

        let json = serde_json::to_string(&archive).unwrap();
        let parsed: Archive = serde_json::from_str(&json).unwrap();
        assert_eq!(archive, parsed);
    }
}
