//! Fan-out notifications.
//!
//! Best effort: a failed or skipped publish is logged and never turns into
//! an error for the caller.

mod handler;
mod nats;

pub use handler::{NotificationHandler, NotificationOutcome};
pub use nats::NatsTopicPublisher;

use anyhow::Result;
use async_trait::async_trait;

/// A publish/subscribe destination that delivers to all current subscribers.
#[async_trait]
pub trait TopicPublisher: Send + Sync {
    /// Publishes `message` verbatim (no envelope) to `topic`.
    async fn publish(&self, topic: &str, message: String) -> Result<()>;
}
