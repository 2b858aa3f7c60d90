//! Progress events for ticks and publication runs
//!
//! An in-process bus built on `tokio::sync::broadcast`. The scheduler and
//! the workflow emit events as they go; the daemon and tests may subscribe.
//! With no subscribers, events are dropped. Lagging subscribers miss the
//! oldest events and never block emitters.
//!
//! # Example
//!
//! ```no_run
//! use libreelcast::events::{Event, EventBus};
//!
//! # async fn example() {
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(Event::TickStarted { due: 3 });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub type EventReceiver = broadcast::Receiver<Event>;

/// Broadcast bus for [`Event`]s
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` is the number of events buffered per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Emit to all current subscribers; never blocks
    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Workflow stage reached by a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Uploading,
    ContainerCreated,
    Processing,
    Publishing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A tick found `due` posts
    TickStarted { due: usize },

    /// All workflows of a tick have settled
    TickCompleted {
        published: usize,
        failed: usize,
        skipped: usize,
    },

    PublishStarted { post_id: String },

    PublishStage {
        post_id: String,
        stage: Stage,
        /// Free-form detail, e.g. the poll attempt number
        detail: Option<String>,
    },

    PublishSucceeded {
        post_id: String,
        remote_post_id: String,
        remote_url: String,
    },

    PublishFailed { post_id: String, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_emission_and_subscription() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        event_bus.emit(Event::PublishStarted {
            post_id: "p1".to_string(),
        });

        match receiver.recv().await.unwrap() {
            Event::PublishStarted { post_id } => assert_eq!(post_id, "p1"),
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        let event = Event::PublishStage {
            post_id: "p2".to_string(),
            stage: Stage::Processing,
            detail: Some("attempt 3/30".to_string()),
        };
        event_bus.emit(event.clone());

        assert_eq!(receiver1.recv().await.unwrap(), event);
        assert_eq!(receiver2.recv().await.unwrap(), event);
    }

    #[test]
    fn test_no_subscribers() {
        let event_bus = EventBus::new(10);

        // Must not panic or block
        event_bus.emit(Event::TickStarted { due: 0 });

        assert_eq!(event_bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::PublishFailed {
            post_id: "p3".to_string(),
            error: "Network timeout".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"publish_failed""#));
        assert!(json.contains("Network timeout"));

        let decoded: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_stage_serialization() {
        let json = serde_json::to_string(&Stage::ContainerCreated).unwrap();
        assert_eq!(json, r#""container_created""#);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_does_not_block() {
        let event_bus = EventBus::new(2);
        let mut receiver = event_bus.subscribe();

        for due in 0..5 {
            event_bus.emit(Event::TickStarted { due });
        }

        // The oldest events were dropped
        assert!(matches!(
            receiver.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        assert_eq!(receiver.recv().await.unwrap(), Event::TickStarted { due: 3 });
    }
}
