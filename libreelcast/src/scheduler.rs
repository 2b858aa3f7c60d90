//! Scheduler loop
//!
//! A [`Scheduler`] owns the recurring tick. Each tick loads every post,
//! selects the due ones and publishes them concurrently: one spawned task per
//! post, joined collectively so a failing or panicking workflow never affects
//! its siblings or the loop.
//!
//! ```no_run
//! use libreelcast::{Config, Scheduler};
//!
//! # async fn example() -> libreelcast::Result<()> {
//! let config = Config::load()?;
//! let scheduler = Scheduler::from_config(&config).await?;
//!
//! scheduler.start()?;
//! // ...
//! scheduler.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::backends::create_backends;
use crate::config::Config;
use crate::db::Database;
use crate::error::{ReelcastError, Result};
use crate::events::Event;
use crate::selector::select_due;
use crate::store::PostRepository;
use crate::types::{Post, PostStatus, PostUpdate};
use crate::workflow::{PollPolicy, PublicationWorkflow, PublishOutcome};

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Claims older than this are considered abandoned by a crashed run
pub const DEFAULT_STALE_CLAIM_AFTER: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub check_interval: Duration,
    pub stale_claim_after: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            stale_claim_after: DEFAULT_STALE_CLAIM_AFTER,
        }
    }
}

impl SchedulerOptions {
    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub check_interval_minutes: f64,
}

/// Per-tick counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub due: usize,
    pub published: usize,
    pub failed: usize,
    /// Due posts another run claimed first, or whose claim errored
    pub skipped: usize,
    /// Abandoned claims marked failed
    pub recovered: usize,
}

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    workflow: PublicationWorkflow,
    options: SchedulerOptions,
    running: Mutex<Option<RunningLoop>>,
}

impl Scheduler {
    /// The repository is the one the workflow commits to
    ///
    /// `stale_claim_after` is raised to the workflow's
    /// [`max_claim_silence`](PublicationWorkflow::max_claim_silence) so a
    /// run that is still in flight is never taken for abandoned.
    pub fn new(workflow: PublicationWorkflow, mut options: SchedulerOptions) -> Self {
        let floor = workflow.max_claim_silence();
        if options.stale_claim_after < floor {
            warn!(
                requested_secs = options.stale_claim_after.as_secs(),
                floor_secs = floor.as_secs(),
                "Stale claim window shorter than a workflow may stay silent, raising it"
            );
            options.stale_claim_after = floor;
        }

        Self {
            workflow,
            options,
            running: Mutex::new(None),
        }
    }

    /// Wire the SQLite store and the configured backends
    pub async fn from_config(config: &Config) -> Result<Self> {
        let options =
            SchedulerOptions::default().with_check_interval(config.scheduler.check_interval()?);

        let db = Database::new(&config.database_path()).await?;
        let backends = create_backends(config)?;

        let workflow = PublicationWorkflow::from_backends(Arc::new(db), backends)
            .with_poll_policy(PollPolicy::from_config(&config.scheduler));

        Ok(Self::new(workflow, options))
    }

    pub fn repository(&self) -> &Arc<dyn PostRepository> {
        self.workflow.repository()
    }

    pub fn workflow(&self) -> &PublicationWorkflow {
        &self.workflow
    }

    pub fn options(&self) -> SchedulerOptions {
        self.options
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<RunningLoop>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start the loop on the current tokio runtime
    ///
    /// The first tick runs immediately. Starting a running scheduler is a
    /// no-op.
    pub fn start(&self) -> Result<()> {
        if self.options.check_interval.is_zero() {
            return Err(ReelcastError::InvalidInput(
                "Check interval must be greater than zero".to_string(),
            ));
        }

        let mut running = self.lock_running();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            warn!("Scheduler is already running");
            return Ok(());
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let tick = TickRunner {
            workflow: self.workflow.clone(),
            stale_claim_after: self.options.stale_claim_after,
        };
        let handle = tokio::spawn(run_loop(tick, self.options.check_interval, shutdown_rx));

        info!(
            check_interval_secs = self.options.check_interval.as_secs_f64(),
            "Scheduler started"
        );
        *running = Some(RunningLoop { shutdown, handle });
        Ok(())
    }

    /// Stop scheduling new ticks
    ///
    /// Workflows already in flight keep running to completion. Returns
    /// `false` if the scheduler was not running.
    pub fn stop(&self) -> bool {
        self.stop_loop().is_some()
    }

    /// Stop and wait until the current tick, if any, has settled
    pub async fn shutdown(&self) {
        if let Some(handle) = self.stop_loop() {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler loop ended abnormally");
            }
        }
    }

    fn stop_loop(&self) -> Option<JoinHandle<()>> {
        let running = self.lock_running().take()?;
        // Err means the loop already exited
        let _ = running.shutdown.send(true);
        info!("Scheduler stopped");
        Some(running.handle)
    }

    pub fn status(&self) -> SchedulerStatus {
        let running = self
            .lock_running()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished());

        SchedulerStatus {
            running,
            check_interval_minutes: self.options.check_interval.as_secs_f64() / 60.0,
        }
    }

    /// Run one tick now, independent of the loop
    pub async fn run_tick(&self) -> Result<TickSummary> {
        TickRunner {
            workflow: self.workflow.clone(),
            stale_claim_after: self.options.stale_claim_after,
        }
        .run()
        .await
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(running) = self.lock_running().take() {
            let _ = running.shutdown.send(true);
        }
    }
}

async fn run_loop(tick: TickRunner, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                debug!("Scheduler loop received shutdown");
                break;
            }
            _ = interval.tick() => {
                // A tick is awaited in full, so ticks never overlap
                if let Err(e) = tick.run().await {
                    error!(error = %e, "Scheduler tick failed");
                }
            }
        }
    }
}

#[derive(Clone)]
struct TickRunner {
    workflow: PublicationWorkflow,
    stale_claim_after: Duration,
}

impl TickRunner {
    async fn run(&self) -> Result<TickSummary> {
        let now = chrono::Utc::now().timestamp();
        let posts = self.workflow.repository().get_all().await?;

        let mut summary = TickSummary {
            recovered: self.recover_stale_claims(&posts, now).await,
            ..Default::default()
        };

        let due = select_due(now, &posts);
        if due.is_empty() {
            debug!("No posts due");
            return Ok(summary);
        }

        summary.due = due.len();
        info!(due = summary.due, "Publishing due posts");
        self.workflow.events().emit(Event::TickStarted { due: summary.due });

        let (ids, tasks): (Vec<String>, Vec<JoinHandle<Result<Option<PublishOutcome>>>>) = due
            .into_iter()
            .map(|post| {
                let workflow = self.workflow.clone();
                let id = post.id.clone();
                let task = tokio::spawn(async move {
                    match workflow.claim(&post.id).await {
                        Ok(Some(claimed)) => Ok(Some(workflow.run(claimed).await)),
                        Ok(None) => Ok(None),
                        Err(e) => Err(e),
                    }
                });
                (id, task)
            })
            .unzip();

        let results = join_all(tasks).await;

        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(Ok(Some(outcome))) if outcome.success => summary.published += 1,
                Ok(Ok(Some(_))) => summary.failed += 1,
                Ok(Ok(None)) => {
                    debug!(post_id = %id, "Post already claimed elsewhere, skipping");
                    summary.skipped += 1;
                }
                Ok(Err(e)) => {
                    error!(post_id = %id, error = %e, "Could not claim post");
                    summary.skipped += 1;
                }
                Err(join_error) => {
                    error!(post_id = %id, error = %join_error, "Publication task aborted");
                    self.workflow.fail_aborted(&id, &join_error.to_string()).await;
                    summary.failed += 1;
                }
            }
        }

        info!(
            published = summary.published,
            failed = summary.failed,
            skipped = summary.skipped,
            "Tick completed"
        );
        self.workflow.events().emit(Event::TickCompleted {
            published: summary.published,
            failed: summary.failed,
            skipped: summary.skipped,
        });

        Ok(summary)
    }

    /// Fail claims left behind by a run that never committed
    async fn recover_stale_claims(&self, posts: &[Post], now: i64) -> usize {
        let cutoff = now - self.stale_claim_after.as_secs() as i64;
        let mut recovered = 0;

        for post in posts
            .iter()
            .filter(|p| p.status == PostStatus::Publishing && p.last_updated <= cutoff)
        {
            let update = PostUpdate::failed(
                now,
                "Publication interrupted before its outcome was recorded".to_string(),
            );
            match self
                .workflow
                .repository()
                .update_if_status(&post.id, PostStatus::Publishing, &update)
                .await
            {
                Ok(Some(_)) => {
                    warn!(post_id = %post.id, "Marked abandoned publication as failed");
                    recovered += 1;
                }
                Ok(None) => {}
                Err(e) => error!(post_id = %post.id, error = %e, "Could not recover claim"),
            }
        }

        recovered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::{MockPublishingBackend, MockUploader};
    use crate::backends::TargetAccount;
    use crate::store::MemoryRepository;
    use crate::types::Media;

    fn scheduler(repo: Arc<MemoryRepository>, options: SchedulerOptions) -> Scheduler {
        let workflow = PublicationWorkflow::new(
            repo,
            Arc::new(MockUploader::default()),
            Arc::new(MockPublishingBackend::default()),
            TargetAccount::new("acct"),
        );
        Scheduler::new(workflow, options)
    }

    #[test]
    fn test_default_options() {
        let options = SchedulerOptions::default();
        assert_eq!(options.check_interval, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_status_reports_interval_in_minutes() {
        let s = scheduler(
            Arc::new(MemoryRepository::new()),
            SchedulerOptions::default().with_check_interval(Duration::from_secs(90)),
        );
        assert_eq!(
            s.status(),
            SchedulerStatus {
                running: false,
                check_interval_minutes: 1.5,
            }
        );
    }

    #[tokio::test]
    async fn test_start_stop_toggles_running() {
        let s = scheduler(Arc::new(MemoryRepository::new()), SchedulerOptions::default());

        s.start().unwrap();
        assert!(s.status().running);

        // Second start is a no-op
        s.start().unwrap();
        assert!(s.status().running);

        assert!(s.stop());
        assert!(!s.status().running);
        assert!(!s.stop());
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let s = scheduler(
            Arc::new(MemoryRepository::new()),
            SchedulerOptions::default().with_check_interval(Duration::ZERO),
        );
        assert!(matches!(s.start(), Err(ReelcastError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_stale_window_covers_workflow_silence() {
        let repo = Arc::new(MemoryRepository::new());
        let s = scheduler(
            repo.clone(),
            SchedulerOptions {
                check_interval: DEFAULT_CHECK_INTERVAL,
                stale_claim_after: Duration::from_secs(1),
            },
        );
        assert_eq!(
            s.options().stale_claim_after,
            s.workflow().max_claim_silence()
        );

        // Longer windows are kept as given
        let s = scheduler(repo, SchedulerOptions::default());
        assert_eq!(s.options().stale_claim_after, DEFAULT_STALE_CLAIM_AFTER);
    }

    #[tokio::test]
    async fn test_from_config_rejects_oversized_check_interval() {
        let mut config = Config::default_config();
        config.database.path = "/nonexistent/reelcast/posts.db".to_string();
        config.scheduler.check_interval_minutes = u64::MAX;

        assert!(matches!(
            Scheduler::from_config(&config).await,
            Err(ReelcastError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_tick_does_nothing() {
        let s = scheduler(Arc::new(MemoryRepository::new()), SchedulerOptions::default());
        assert_eq!(s.run_tick().await.unwrap(), TickSummary::default());
    }

    #[tokio::test]
    async fn test_tick_ignores_drafts_and_future_posts() {
        let now = chrono::Utc::now().timestamp();
        let draft = Post::new("draft".to_string(), Some(Media::reel("/tmp/a.mp4")), None);
        let future = Post::new(
            "future".to_string(),
            Some(Media::reel("/tmp/a.mp4")),
            Some(now + 3600),
        );
        let repo = Arc::new(MemoryRepository::with_posts([draft.clone(), future.clone()]));
        let s = scheduler(repo.clone(), SchedulerOptions::default());

        let summary = s.run_tick().await.unwrap();

        assert_eq!(summary.due, 0);
        for id in [&draft.id, &future.id] {
            let stored = repo.get_by_id(id).await.unwrap().unwrap();
            assert_eq!(stored.status, PostStatus::Scheduled);
        }
    }

    #[tokio::test]
    async fn test_stale_claims_are_recovered() {
        let now = chrono::Utc::now().timestamp();

        let mut stale = Post::new("stale".to_string(), None, Some(now - 7200));
        stale.status = PostStatus::Publishing;
        stale.last_updated = now - 3600;

        let mut fresh = Post::new("fresh".to_string(), None, Some(now - 60));
        fresh.status = PostStatus::Publishing;
        fresh.last_updated = now;

        let repo = Arc::new(MemoryRepository::with_posts([stale.clone(), fresh.clone()]));
        let s = scheduler(repo.clone(), SchedulerOptions::default());

        let summary = s.run_tick().await.unwrap();
        assert_eq!(summary.recovered, 1);
        assert_eq!(summary.due, 0);

        let stale = repo.get_by_id(&stale.id).await.unwrap().unwrap();
        assert_eq!(stale.status, PostStatus::Failed);
        assert!(stale.error.unwrap().contains("interrupted"));

        let fresh = repo.get_by_id(&fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh.status, PostStatus::Publishing);
    }
}
