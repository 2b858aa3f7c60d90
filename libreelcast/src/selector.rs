//! Due-post selection

use crate::types::{Post, PostStatus};

/// A post is due when it is still scheduled and its time has come.
///
/// Posts without a scheduled time are drafts and never due.
pub fn is_due(post: &Post, now: i64) -> bool {
    post.status == PostStatus::Scheduled && matches!(post.scheduled_for, Some(at) if at <= now)
}

/// Posts from `posts` that are due at `now`
///
/// Input order is kept, but callers must not rely on any order.
pub fn select_due(now: i64, posts: &[Post]) -> Vec<Post> {
    posts
        .iter()
        .filter(|post| is_due(post, now))
        .cloned()
        .collect()
}
