//! Scriptable uploader and publishing backend for tests
//!
//! Both mocks count their calls and can simulate failures and latency, so
//! workflow and scheduler tests run without credentials or network access.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::sleep;

use crate::backends::{
    BackendResult, ContainerHandle, ContainerStatus, MediaUploader, PublishedMedia,
    PublishingBackend, TargetAccount, UploadedMedia,
};
use crate::error::PublishError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock [`MediaUploader`]
///
/// Returns `public_url` for every path except those registered with
/// [`MockUploader::fail_path`].
#[derive(Clone)]
pub struct MockUploader {
    public_url: String,
    delay: Duration,
    failing_paths: Arc<Mutex<HashSet<String>>>,
    error: String,
    upload_calls: Arc<AtomicUsize>,
    uploaded: Arc<Mutex<Vec<String>>>,
}

impl MockUploader {
    pub fn new(public_url: &str) -> Self {
        Self {
            public_url: public_url.to_string(),
            delay: Duration::ZERO,
            failing_paths: Arc::new(Mutex::new(HashSet::new())),
            error: "Mock upload failed".to_string(),
            upload_calls: Arc::new(AtomicUsize::new(0)),
            uploaded: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Simulated latency before each upload completes
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = error.to_string();
        self
    }

    /// Make uploads of `path` fail
    pub fn fail_path(&self, path: &str) {
        lock(&self.failing_paths).insert(path.to_string());
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    /// Paths uploaded successfully, in completion order
    pub fn uploaded_paths(&self) -> Vec<String> {
        lock(&self.uploaded).clone()
    }
}

impl Default for MockUploader {
    fn default() -> Self {
        Self::new("https://cdn.example.com/mock.mp4")
    }
}

#[async_trait]
impl MediaUploader for MockUploader {
    async fn upload(&self, local_path: &Path) -> BackendResult<UploadedMedia> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let path = local_path.to_string_lossy().to_string();
        if lock(&self.failing_paths).contains(&path) {
            return Err(PublishError::Upload(self.error.clone()));
        }

        lock(&self.uploaded).push(path);
        Ok(UploadedMedia {
            public_url: self.public_url.clone(),
        })
    }

    fn name(&self) -> &str {
        "mock-uploader"
    }
}

/// Mock [`PublishingBackend`]
///
/// `container_status` pops from a script of statuses; once the script is
/// exhausted it keeps answering `default_status`.
#[derive(Clone)]
pub struct MockPublishingBackend {
    creation_id: String,
    remote_id: String,
    permalink: String,
    default_status: ContainerStatus,
    status_script: Arc<Mutex<VecDeque<ContainerStatus>>>,
    container_error: Option<String>,
    publish_error: Option<String>,
    delay: Duration,
    container_calls: Arc<AtomicUsize>,
    status_calls: Arc<AtomicUsize>,
    publish_calls: Arc<AtomicUsize>,
    captions: Arc<Mutex<Vec<String>>>,
    media_urls: Arc<Mutex<Vec<String>>>,
}

impl MockPublishingBackend {
    /// Backend that finishes processing on the first poll
    pub fn new(creation_id: &str, remote_id: &str, permalink: &str) -> Self {
        Self {
            creation_id: creation_id.to_string(),
            remote_id: remote_id.to_string(),
            permalink: permalink.to_string(),
            default_status: ContainerStatus::Finished,
            status_script: Arc::new(Mutex::new(VecDeque::new())),
            container_error: None,
            publish_error: None,
            delay: Duration::ZERO,
            container_calls: Arc::new(AtomicUsize::new(0)),
            status_calls: Arc::new(AtomicUsize::new(0)),
            publish_calls: Arc::new(AtomicUsize::new(0)),
            captions: Arc::new(Mutex::new(Vec::new())),
            media_urls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Backend whose containers never leave `IN_PROGRESS`
    pub fn never_finishes() -> Self {
        Self::default().with_default_status(ContainerStatus::InProgress)
    }

    pub fn with_default_status(mut self, status: ContainerStatus) -> Self {
        self.default_status = status;
        self
    }

    /// Statuses returned by the first polls, in order
    pub fn with_status_script(self, statuses: impl IntoIterator<Item = ContainerStatus>) -> Self {
        lock(&self.status_script).extend(statuses);
        self
    }

    pub fn with_container_error(mut self, error: &str) -> Self {
        self.container_error = Some(error.to_string());
        self
    }

    pub fn with_publish_error(mut self, error: &str) -> Self {
        self.publish_error = Some(error.to_string());
        self
    }

    /// Simulated latency on every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn container_calls(&self) -> usize {
        self.container_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }

    /// Captions passed to `create_container`
    pub fn captions(&self) -> Vec<String> {
        lock(&self.captions).clone()
    }

    /// Media URLs passed to `create_container`
    pub fn media_urls(&self) -> Vec<String> {
        lock(&self.media_urls).clone()
    }

    async fn simulate_latency(&self) {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
    }
}

impl Default for MockPublishingBackend {
    fn default() -> Self {
        Self::new("mock-creation", "mock-media", "https://instagram.com/p/mock-media")
    }
}

#[async_trait]
impl PublishingBackend for MockPublishingBackend {
    async fn create_container(
        &self,
        _account: &TargetAccount,
        public_url: &str,
        caption: &str,
        _share_to_feed: bool,
    ) -> BackendResult<ContainerHandle> {
        self.container_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(ref error) = self.container_error {
            return Err(PublishError::Container(error.clone()));
        }

        lock(&self.captions).push(caption.to_string());
        lock(&self.media_urls).push(public_url.to_string());

        Ok(ContainerHandle {
            creation_id: self.creation_id.clone(),
        })
    }

    async fn container_status(&self, _creation_id: &str) -> BackendResult<ContainerStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let scripted = lock(&self.status_script).pop_front();
        Ok(scripted.unwrap_or_else(|| self.default_status.clone()))
    }

    async fn publish(
        &self,
        _account: &TargetAccount,
        _creation_id: &str,
    ) -> BackendResult<PublishedMedia> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(ref error) = self.publish_error {
            return Err(PublishError::Publish(error.clone()));
        }

        Ok(PublishedMedia {
            remote_id: self.remote_id.clone(),
            permalink: self.permalink.clone(),
        })
    }

    fn name(&self) -> &str {
        "mock-publisher"
    }
}
