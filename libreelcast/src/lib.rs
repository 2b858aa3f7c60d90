//! Reelcast - scheduled reel publishing
//!
//! This library scans scheduled posts, picks the ones that are due and drives
//! each through the remote publication workflow (upload, container creation,
//! processing poll, publish) while keeping the local post store consistent.

pub mod backends;
pub mod config;
pub mod controls;
pub mod db;
pub mod error;
pub mod events;
pub mod logging;
pub mod scheduler;
pub mod scheduling;
pub mod selector;
pub mod store;
pub mod types;
pub mod workflow;

// Re-export commonly used types
pub use config::Config;
pub use controls::{PostQueue, StatusReport};
pub use db::{Database, QueueStats};
pub use error::{ReelcastError, Result};
pub use scheduler::{Scheduler, SchedulerOptions, SchedulerStatus, TickSummary};
pub use store::{MemoryRepository, PostRepository};
pub use types::{Media, MediaKind, Metrics, NewPost, Post, PostStatus, PostUpdate};
pub use workflow::{PollPolicy, PublicationWorkflow, PublishOutcome};
