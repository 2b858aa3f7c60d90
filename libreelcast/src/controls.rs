//! Manual controls over scheduled posts
//!
//! [`PostQueue`] holds the controls that only touch the repository:
//! scheduling, rescheduling and cancelling need no publishing backend.
//! [`Scheduler`] exposes the same controls plus `publish_now`, which runs the
//! workflow the scheduler loop uses. Reschedule and cancel are conditional on
//! the post still being `scheduled` at write time, so they cannot race a tick
//! that has already claimed the post.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::error::{ReelcastError, Result};
use crate::scheduler::Scheduler;
use crate::store::PostRepository;
use crate::types::{NewPost, Post, PostStatus, PostUpdate};
use crate::workflow::PublishOutcome;

/// Scheduler status plus a view of the upcoming queue
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub running: bool,
    pub check_interval_minutes: f64,
    pub upcoming_posts: usize,
    pub next_scheduled: Option<i64>,
}

/// Repository-only controls
#[derive(Clone)]
pub struct PostQueue {
    repo: Arc<dyn PostRepository>,
}

impl PostQueue {
    pub fn new(repo: Arc<dyn PostRepository>) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &Arc<dyn PostRepository> {
        &self.repo
    }

    /// Store a new scheduled post
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the caption is blank, media is missing or has no
    /// path, or no time is given.
    pub async fn schedule_post(&self, new_post: NewPost) -> Result<Post> {
        if new_post.caption.trim().is_empty() {
            return Err(ReelcastError::InvalidInput(
                "Caption cannot be empty".to_string(),
            ));
        }

        match new_post.media {
            Some(ref media) if !media.path.trim().is_empty() => {}
            _ => {
                return Err(ReelcastError::InvalidInput(
                    "Media with a local video path is required".to_string(),
                ))
            }
        }

        let scheduled_for = new_post.scheduled_for.ok_or_else(|| {
            ReelcastError::InvalidInput("A scheduled time is required".to_string())
        })?;

        let post = Post::new(new_post.caption, new_post.media, Some(scheduled_for));
        self.repo.insert(&post).await?;

        info!(post_id = %post.id, scheduled_for, "Post scheduled");
        Ok(post)
    }

    /// Move a scheduled post to a new time
    ///
    /// Only `scheduled_for` and `last_updated` change.
    pub async fn reschedule_post(&self, post_id: &str, scheduled_for: i64) -> Result<Post> {
        let now = chrono::Utc::now().timestamp();

        match self
            .repo
            .update_if_status(
                post_id,
                PostStatus::Scheduled,
                &PostUpdate::rescheduled(now, scheduled_for),
            )
            .await?
        {
            Some(post) => {
                info!(post_id, scheduled_for, "Post rescheduled");
                Ok(post)
            }
            None => Err(self.rejection(post_id, "rescheduled").await),
        }
    }

    /// Delete a scheduled post
    pub async fn cancel_scheduled_post(&self, post_id: &str) -> Result<()> {
        if self
            .repo
            .delete_if_status(post_id, PostStatus::Scheduled)
            .await?
        {
            info!(post_id, "Scheduled post cancelled");
            return Ok(());
        }

        Err(self.rejection(post_id, "cancelled").await)
    }

    /// Why a conditional write on `post_id` did not apply
    pub(crate) async fn rejection(&self, post_id: &str, action: &'static str) -> ReelcastError {
        match self.repo.get_by_id(post_id).await {
            Ok(Some(post)) => invalid_state(post, action),
            Ok(None) => ReelcastError::NotFound(post_id.to_string()),
            Err(e) => e,
        }
    }
}

impl Scheduler {
    /// Repository-only controls over the scheduler's store
    pub fn queue(&self) -> PostQueue {
        PostQueue::new(self.repository().clone())
    }

    pub async fn schedule_post(&self, new_post: NewPost) -> Result<Post> {
        self.queue().schedule_post(new_post).await
    }

    pub async fn reschedule_post(&self, post_id: &str, scheduled_for: i64) -> Result<Post> {
        self.queue().reschedule_post(post_id, scheduled_for).await
    }

    pub async fn cancel_scheduled_post(&self, post_id: &str) -> Result<()> {
        self.queue().cancel_scheduled_post(post_id).await
    }

    /// Publish a scheduled post immediately, ignoring its due time
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `InvalidState` unless the post is
    /// `scheduled` (including when a tick claims it first). Publication
    /// failures are not errors: they come back in the outcome.
    pub async fn publish_now(&self, post_id: &str) -> Result<PublishOutcome> {
        let post = self
            .repository()
            .get_by_id(post_id)
            .await?
            .ok_or_else(|| ReelcastError::NotFound(post_id.to_string()))?;

        if post.status != PostStatus::Scheduled {
            return Err(invalid_state(post, "published"));
        }

        let claimed = match self.workflow().claim(post_id).await? {
            Some(claimed) => claimed,
            None => return Err(self.queue().rejection(post_id, "published").await),
        };

        info!(post_id, "Publishing post on demand");
        let workflow = self.workflow().clone();
        let task = tokio::spawn(async move { workflow.run(claimed).await });

        match task.await {
            Ok(outcome) => Ok(outcome),
            Err(join_error) => {
                error!(post_id, error = %join_error, "Publication task aborted");
                let reason = join_error.to_string();
                let post = match self.workflow().fail_aborted(post_id, &reason).await {
                    Some(post) => post,
                    None => self
                        .repository()
                        .get_by_id(post_id)
                        .await?
                        .ok_or_else(|| ReelcastError::NotFound(post_id.to_string()))?,
                };

                Ok(PublishOutcome {
                    success: false,
                    post,
                    error: Some(format!("Publication aborted: {}", reason)),
                })
            }
        }
    }

    /// Scheduler status with the number of upcoming posts and the next time
    pub async fn status_report(&self) -> Result<StatusReport> {
        let status = self.status();
        let now = chrono::Utc::now().timestamp();

        let upcoming: Vec<i64> = self
            .repository()
            .get_all()
            .await?
            .into_iter()
            .filter(|p| p.status == PostStatus::Scheduled)
            .filter_map(|p| p.scheduled_for)
            .filter(|at| *at > now)
            .collect();

        Ok(StatusReport {
            running: status.running,
            check_interval_minutes: status.check_interval_minutes,
            upcoming_posts: upcoming.len(),
            next_scheduled: upcoming.into_iter().min(),
        })
    }
}

fn invalid_state(post: Post, action: &'static str) -> ReelcastError {
    ReelcastError::InvalidState {
        id: post.id,
        status: post.status,
        action,
    }
}
