//! Core types for Reelcast

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// A schedulable post
///
/// Timestamps are Unix seconds. `last_updated` is set by whoever mutates the
/// record; repositories never bump it on their own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: String,
    pub status: PostStatus,
    pub caption: String,
    pub media: Option<Media>,
    pub scheduled_for: Option<i64>,
    pub published_at: Option<i64>,
    pub remote_post_id: Option<String>,
    pub remote_url: Option<String>,
    pub metrics: Option<Metrics>,
    pub error: Option<String>,
    pub created_at: i64,
    pub last_updated: i64,
}

impl Post {
    /// Create a scheduled post with a fresh id
    pub fn new(caption: String, media: Option<Media>, scheduled_for: Option<i64>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            status: PostStatus::Scheduled,
            caption,
            media,
            scheduled_for,
            published_at: None,
            remote_post_id: None,
            remote_url: None,
            metrics: None,
            error: None,
            created_at: now,
            last_updated: now,
        }
    }

    /// Local video path if this post carries a reel
    pub fn reel_path(&self) -> Option<&str> {
        match &self.media {
            Some(Media {
                kind: MediaKind::Reel,
                path,
            }) if !path.trim().is_empty() => Some(path.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Scheduled,
    /// Claimed by a workflow instance; the outcome is not committed yet
    Publishing,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Scheduled => "scheduled",
            PostStatus::Publishing => "publishing",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }

    /// No automatic transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, PostStatus::Published | PostStatus::Failed)
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(PostStatus::Scheduled),
            "publishing" => Ok(PostStatus::Publishing),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            _ => Err(format!(
                "Invalid post status: '{}'. Valid options: scheduled, publishing, published, failed",
                s
            )),
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Reel,
    Post,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Reel => "reel",
            MediaKind::Post => "post",
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reel" => Ok(MediaKind::Reel),
            "post" => Ok(MediaKind::Post),
            _ => Err(format!("Invalid media kind: '{}'. Valid options: reel, post", s)),
        }
    }
}

/// Media attached to a post
///
/// `path` is a local file path for media that still has to be uploaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Media {
    pub kind: MediaKind,
    pub path: String,
}

impl Media {
    pub fn reel(path: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Reel,
            path: path.into(),
        }
    }
}

/// Engagement counters, zeroed at publish time
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metrics {
    pub likes: u64,
    pub comments: u64,
    pub views: u64,
    pub shares: u64,
    pub saves: u64,
}

impl Metrics {
    pub fn is_zero(&self) -> bool {
        *self == Metrics::default()
    }
}

/// Input for scheduling a new post
#[derive(Debug, Clone)]
pub struct NewPost {
    pub caption: String,
    pub media: Option<Media>,
    pub scheduled_for: Option<i64>,
}

/// Partial set of fields merged into a stored post
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostUpdate {
    pub status: Option<PostStatus>,
    pub scheduled_for: Option<i64>,
    pub published_at: Option<i64>,
    pub remote_post_id: Option<String>,
    pub remote_url: Option<String>,
    pub metrics: Option<Metrics>,
    pub error: Option<String>,
    pub last_updated: Option<i64>,
}

impl PostUpdate {
    /// Take ownership of a scheduled post for one workflow run
    pub fn claimed(now: i64) -> Self {
        Self {
            status: Some(PostStatus::Publishing),
            last_updated: Some(now),
            ..Default::default()
        }
    }

    /// Refresh the claim timestamp of a post still in flight
    pub fn heartbeat(now: i64) -> Self {
        Self {
            last_updated: Some(now),
            ..Default::default()
        }
    }

    pub fn published(now: i64, remote_post_id: String, remote_url: String) -> Self {
        Self {
            status: Some(PostStatus::Published),
            published_at: Some(now),
            remote_post_id: Some(remote_post_id),
            remote_url: Some(remote_url),
            metrics: Some(Metrics::default()),
            last_updated: Some(now),
            ..Default::default()
        }
    }

    pub fn failed(now: i64, error: String) -> Self {
        Self {
            status: Some(PostStatus::Failed),
            error: Some(error),
            last_updated: Some(now),
            ..Default::default()
        }
    }

    pub fn rescheduled(now: i64, scheduled_for: i64) -> Self {
        Self {
            scheduled_for: Some(scheduled_for),
            last_updated: Some(now),
            ..Default::default()
        }
    }

    /// Merge the set fields into `post`
    pub fn apply(&self, post: &mut Post) {
        if let Some(status) = self.status {
            post.status = status;
        }
        if let Some(scheduled_for) = self.scheduled_for {
            post.scheduled_for = Some(scheduled_for);
        }
        if let Some(published_at) = self.published_at {
            post.published_at = Some(published_at);
        }
        if let Some(ref remote_post_id) = self.remote_post_id {
            post.remote_post_id = Some(remote_post_id.clone());
        }
        if let Some(ref remote_url) = self.remote_url {
            post.remote_url = Some(remote_url.clone());
        }
        if let Some(metrics) = self.metrics {
            post.metrics = Some(metrics);
        }
        if let Some(ref error) = self.error {
            post.error = Some(error.clone());
        }
        if let Some(last_updated) = self.last_updated {
            post.last_updated = last_updated;
        }
    }
}
