//! External collaborators of the publication workflow
//!
//! A [`MediaUploader`] turns a local video into a publicly fetchable URL. A
//! [`PublishingBackend`] speaks the two-phase remote protocol: create a
//! media container, poll until the remote side has processed it, publish.
//!
//! # Examples
//!
//! ```no_run
//! use libreelcast::backends::{create_backends, ContainerStatus};
//! use libreelcast::Config;
//! use std::path::Path;
//!
//! # async fn example() -> libreelcast::Result<()> {
//! let config = Config::load()?;
//! let backends = create_backends(&config)?;
//!
//! let uploaded = backends.uploader.upload(Path::new("/videos/reel.mp4")).await?;
//! let container = backends
//!     .publisher
//!     .create_container(&backends.account, &uploaded.public_url, "hello", true)
//!     .await?;
//!
//! if backends.publisher.container_status(&container.creation_id).await? == ContainerStatus::Finished {
//!     let published = backends.publisher.publish(&backends.account, &container.creation_id).await?;
//!     println!("Published: {}", published.permalink);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{PublishError, Result};

pub mod cloudinary;
pub mod instagram;

// Mocks are compiled into every build so integration tests can use them
pub mod mock;

pub type BackendResult<T> = std::result::Result<T, PublishError>;

/// Upper bound on one backend call, HTTP timeouts included
///
/// Uploads are the slowest call. `PublishingBackend::publish` may make two
/// requests and must fit within the same bound.
pub const MAX_CALL_DURATION: Duration = Duration::from_secs(300);

/// Result of a media upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    pub public_url: String,
}

/// Account the backend publishes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAccount {
    pub account_id: String,
}

impl TargetAccount {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
        }
    }
}

/// Handle to a remote container awaiting processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub creation_id: String,
}

/// Remote processing state of a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    InProgress,
    Finished,
    /// Processing failed; carries the backend's detail if any
    Error(Option<String>),
    /// Any other status code; treated like `InProgress`
    Other(String),
}

impl ContainerStatus {
    /// Map a remote status code (`IN_PROGRESS`, `FINISHED`, `ERROR`, ...)
    pub fn from_code(code: &str, detail: Option<String>) -> Self {
        match code {
            "FINISHED" => ContainerStatus::Finished,
            "ERROR" => ContainerStatus::Error(detail),
            "IN_PROGRESS" => ContainerStatus::InProgress,
            other => ContainerStatus::Other(other.to_string()),
        }
    }
}

/// A published remote item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMedia {
    pub remote_id: String,
    pub permalink: String,
}

#[async_trait]
pub trait MediaUploader: Send + Sync {
    /// Upload a local media file and return its public URL
    ///
    /// # Errors
    ///
    /// `PublishError::Upload` when the file cannot be read or the service
    /// rejects it, `PublishError::Network` on transport failures.
    async fn upload(&self, local_path: &Path) -> BackendResult<UploadedMedia>;

    /// Lowercase identifier used in logs
    fn name(&self) -> &str;
}

#[async_trait]
pub trait PublishingBackend: Send + Sync {
    /// Create a media container for a reel hosted at `public_url`
    async fn create_container(
        &self,
        account: &TargetAccount,
        public_url: &str,
        caption: &str,
        share_to_feed: bool,
    ) -> BackendResult<ContainerHandle>;

    /// Query the processing state of a container
    async fn container_status(&self, creation_id: &str) -> BackendResult<ContainerStatus>;

    /// Publish a processed container
    async fn publish(
        &self,
        account: &TargetAccount,
        creation_id: &str,
    ) -> BackendResult<PublishedMedia>;

    fn name(&self) -> &str;
}

/// The configured uploader, publishing backend and target account
#[derive(Clone)]
pub struct Backends {
    pub uploader: Arc<dyn MediaUploader>,
    pub publisher: Arc<dyn PublishingBackend>,
    pub account: TargetAccount,
}

/// Build Cloudinary + Instagram backends from configuration
///
/// # Errors
///
/// `ConfigError::MissingField` when a section or a secret is missing.
pub fn create_backends(config: &Config) -> Result<Backends> {
    let cloudinary_config = config.cloudinary()?;
    let instagram_config = config.instagram()?;

    let uploader = cloudinary::CloudinaryUploader::new(cloudinary_config)?;
    let publisher = instagram::InstagramGraphBackend::new(instagram_config)?;

    tracing::debug!(
        uploader = uploader.name(),
        publisher = publisher.name(),
        account_id = %instagram_config.account_id,
        "Backends configured"
    );

    Ok(Backends {
        uploader: Arc::new(uploader),
        publisher: Arc::new(publisher),
        account: TargetAccount::new(instagram_config.account_id.clone()),
    })
}

/// Map a transport-level reqwest error
pub(crate) fn network_error(context: &str, error: reqwest::Error) -> PublishError {
    PublishError::Network(format!("{}: {}", context, error))
}
