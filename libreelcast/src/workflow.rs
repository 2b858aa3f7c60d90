//! Publication workflow for a single post
//!
//! Drives one claimed post through
//! `Uploading → ContainerCreated → Processing → Published`, or to `Failed`
//! at the first step that errors, and commits the outcome with a single
//! conditional repository update.
//!
//! The scheduler loop and `publish_now` both claim a post (`scheduled →
//! publishing`) before calling [`PublicationWorkflow::run`]; the commit only
//! applies while the post is still `publishing`.
//!
//! While it runs, the workflow refreshes the claim's `last_updated` after
//! every backend call and re-checks the claim right before publishing. A
//! post that stopped being `publishing` in the meantime is abandoned without
//! being published.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::backends::{
    Backends, ContainerStatus, MediaUploader, PublishedMedia, PublishingBackend, TargetAccount,
    MAX_CALL_DURATION,
};
use crate::config::SchedulerConfig;
use crate::error::{PublishError, Result};
use crate::events::{Event, EventBus, Stage};
use crate::store::PostRepository;
use crate::types::{Post, PostStatus, PostUpdate};

/// Delay between two container status checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Status checks before a container is considered stuck
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 30;

/// Bounded polling of the remote processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

impl PollPolicy {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.poll_interval_secs),
            max_attempts: config.max_poll_attempts,
        }
    }
}

/// Result of one publication attempt
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub success: bool,
    /// The post as committed, or as last known if the commit did not apply
    pub post: Post,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct PublicationWorkflow {
    repo: Arc<dyn PostRepository>,
    uploader: Arc<dyn MediaUploader>,
    publisher: Arc<dyn PublishingBackend>,
    account: TargetAccount,
    poll: PollPolicy,
    events: EventBus,
}

impl PublicationWorkflow {
    pub fn new(
        repo: Arc<dyn PostRepository>,
        uploader: Arc<dyn MediaUploader>,
        publisher: Arc<dyn PublishingBackend>,
        account: TargetAccount,
    ) -> Self {
        Self {
            repo,
            uploader,
            publisher,
            account,
            poll: PollPolicy::default(),
            events: EventBus::default(),
        }
    }

    pub fn from_backends(repo: Arc<dyn PostRepository>, backends: Backends) -> Self {
        Self::new(repo, backends.uploader, backends.publisher, backends.account)
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn repository(&self) -> &Arc<dyn PostRepository> {
        &self.repo
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.poll
    }

    /// Longest a running workflow goes without refreshing its claim
    ///
    /// Bounded by one poll interval plus two backend calls: the publish
    /// request and its permalink lookup follow the last refresh.
    pub fn max_claim_silence(&self) -> Duration {
        self.poll
            .interval
            .saturating_add(MAX_CALL_DURATION.saturating_mul(2))
    }

    /// Claim a scheduled post for this workflow
    ///
    /// Returns `None` if the post is missing or no longer `scheduled`.
    pub async fn claim(&self, post_id: &str) -> Result<Option<Post>> {
        let now = chrono::Utc::now().timestamp();
        self.repo
            .update_if_status(post_id, PostStatus::Scheduled, &PostUpdate::claimed(now))
            .await
    }

    /// Publish a claimed post and commit the outcome
    ///
    /// Never fails: every error ends up in the returned outcome and, when the
    /// commit applies, on the stored post.
    pub async fn run(&self, post: Post) -> PublishOutcome {
        info!(post_id = %post.id, "Publishing post");
        self.events.emit(Event::PublishStarted {
            post_id: post.id.clone(),
        });

        match self.execute(&post).await {
            Ok(published) => self.commit_success(post, published).await,
            Err(e) => self.commit_failure(post, e).await,
        }
    }

    async fn execute(&self, post: &Post) -> std::result::Result<PublishedMedia, PublishError> {
        let video_path = check_preconditions(post)?;

        self.stage(post, Stage::Uploading, None);
        let uploaded = self.uploader.upload(video_path).await?;
        debug!(post_id = %post.id, public_url = %uploaded.public_url, "Media uploaded");
        self.refresh_claim(post).await?;

        let container = self
            .publisher
            .create_container(&self.account, &uploaded.public_url, &post.caption, true)
            .await?;
        self.refresh_claim(post).await?;
        self.stage(
            post,
            Stage::ContainerCreated,
            Some(container.creation_id.clone()),
        );

        self.wait_for_processing(post, &container.creation_id).await?;

        // Last check before the irreversible step
        self.refresh_claim(post).await?;
        self.stage(post, Stage::Publishing, None);
        self.publisher
            .publish(&self.account, &container.creation_id)
            .await
    }

    /// Bump the claim's `last_updated`, failing if the claim is gone
    ///
    /// A store error also abandons the run: without a confirmed claim the
    /// outcome could not be recorded.
    async fn refresh_claim(&self, post: &Post) -> std::result::Result<(), PublishError> {
        let now = chrono::Utc::now().timestamp();
        match self
            .repo
            .update_if_status(&post.id, PostStatus::Publishing, &PostUpdate::heartbeat(now))
            .await
        {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(PublishError::ClaimLost(format!(
                "post {} is no longer publishing",
                post.id
            ))),
            Err(e) => Err(PublishError::ClaimLost(format!(
                "could not refresh claim on post {}: {}",
                post.id, e
            ))),
        }
    }

    /// Poll until the container is processed
    ///
    /// Sleeps `interval` after every unfinished check, so exhausting the
    /// budget takes `max_attempts` checks and `max_attempts × interval`.
    async fn wait_for_processing(
        &self,
        post: &Post,
        creation_id: &str,
    ) -> std::result::Result<(), PublishError> {
        for attempt in 1..=self.poll.max_attempts {
            let status = self.publisher.container_status(creation_id).await?;
            self.refresh_claim(post).await?;

            match status {
                ContainerStatus::Finished => {
                    debug!(post_id = %post.id, creation_id, attempt, "Container processed");
                    return Ok(());
                }
                ContainerStatus::Error(detail) => {
                    return Err(PublishError::Processing(detail.unwrap_or_else(|| {
                        format!("container {} failed remote processing", creation_id)
                    })));
                }
                status => {
                    debug!(
                        post_id = %post.id,
                        creation_id,
                        ?status,
                        "Waiting for processing ({}/{})",
                        attempt,
                        self.poll.max_attempts
                    );
                    self.stage(
                        post,
                        Stage::Processing,
                        Some(format!("attempt {}/{}", attempt, self.poll.max_attempts)),
                    );
                    sleep(self.poll.interval).await;
                }
            }
        }

        Err(PublishError::Timeout {
            attempts: self.poll.max_attempts,
        })
    }

    async fn commit_success(&self, post: Post, published: PublishedMedia) -> PublishOutcome {
        let now = chrono::Utc::now().timestamp();
        let update = PostUpdate::published(
            now,
            published.remote_id.clone(),
            published.permalink.clone(),
        );

        match self
            .repo
            .update_if_status(&post.id, PostStatus::Publishing, &update)
            .await
        {
            Ok(Some(committed)) => {
                info!(
                    post_id = %committed.id,
                    remote_post_id = %published.remote_id,
                    remote_url = %published.permalink,
                    "Post published"
                );
                self.events.emit(Event::PublishSucceeded {
                    post_id: committed.id.clone(),
                    remote_post_id: published.remote_id,
                    remote_url: published.permalink,
                });
                remove_local_media(&committed);
                PublishOutcome {
                    success: true,
                    post: committed,
                    error: None,
                }
            }
            Ok(None) => {
                let message = format!(
                    "Published remotely as {} but post {} was no longer publishing; outcome not recorded",
                    published.remote_id, post.id
                );
                error!(post_id = %post.id, "{}", message);
                self.unrecorded(post, message).await
            }
            Err(e) => {
                let message = format!(
                    "Published remotely as {} but recording it failed: {}",
                    published.remote_id, e
                );
                error!(post_id = %post.id, "{}", message);
                self.unrecorded(post, message).await
            }
        }
    }

    async fn commit_failure(&self, mut post: Post, cause: PublishError) -> PublishOutcome {
        let message = cause.to_string();
        warn!(post_id = %post.id, error = %message, "Publication failed");

        let now = chrono::Utc::now().timestamp();
        let update = PostUpdate::failed(now, message.clone());

        let committed = match self
            .repo
            .update_if_status(&post.id, PostStatus::Publishing, &update)
            .await
        {
            Ok(Some(committed)) => committed,
            Ok(None) => {
                warn!(post_id = %post.id, "Post was no longer publishing; failure not recorded");
                match self.repo.get_by_id(&post.id).await {
                    Ok(Some(current)) => current,
                    _ => {
                        update.apply(&mut post);
                        post
                    }
                }
            }
            Err(e) => {
                error!(post_id = %post.id, error = %e, "Failed to record publication failure");
                update.apply(&mut post);
                post
            }
        };

        self.events.emit(Event::PublishFailed {
            post_id: committed.id.clone(),
            error: message.clone(),
        });

        PublishOutcome {
            success: false,
            post: committed,
            error: Some(message),
        }
    }

    /// Fail a post whose workflow task died before committing
    ///
    /// Returns the committed post, or `None` if it was no longer
    /// `publishing`.
    pub(crate) async fn fail_aborted(&self, post_id: &str, reason: &str) -> Option<Post> {
        let now = chrono::Utc::now().timestamp();
        let message = format!("Publication aborted: {}", reason);
        let update = PostUpdate::failed(now, message.clone());

        let committed = match self
            .repo
            .update_if_status(post_id, PostStatus::Publishing, &update)
            .await
        {
            Ok(committed) => committed,
            Err(e) => {
                error!(post_id, error = %e, "Could not mark aborted post as failed");
                None
            }
        };

        self.events.emit(Event::PublishFailed {
            post_id: post_id.to_string(),
            error: message,
        });
        committed
    }

    async fn unrecorded(&self, post: Post, message: String) -> PublishOutcome {
        self.events.emit(Event::PublishFailed {
            post_id: post.id.clone(),
            error: message.clone(),
        });

        let current = match self.repo.get_by_id(&post.id).await {
            Ok(Some(current)) => current,
            _ => post,
        };

        PublishOutcome {
            success: false,
            post: current,
            error: Some(message),
        }
    }

    fn stage(&self, post: &Post, stage: Stage, detail: Option<String>) {
        self.events.emit(Event::PublishStage {
            post_id: post.id.clone(),
            stage,
            detail,
        });
    }
}

/// The local video of a publishable post
///
/// The post needs a non-empty caption and reel media whose path is an
/// existing file.
pub fn check_preconditions(post: &Post) -> std::result::Result<&Path, PublishError> {
    if post.caption.trim().is_empty() {
        return Err(PublishError::Precondition(
            "caption cannot be empty".to_string(),
        ));
    }

    let path = post.reel_path().ok_or_else(|| {
        PublishError::Precondition("post has no reel video to publish".to_string())
    })?;

    let path = Path::new(path);
    if !path.is_file() {
        return Err(PublishError::Precondition(format!(
            "video file not found: {}",
            path.display()
        )));
    }

    Ok(path)
}

fn remove_local_media(post: &Post) {
    let Some(path) = post.reel_path() else {
        return;
    };

    match std::fs::remove_file(path) {
        Ok(()) => debug!(post_id = %post.id, path, "Removed local media"),
        Err(e) => warn!(post_id = %post.id, path, error = %e, "Could not remove local media"),
    }
}
