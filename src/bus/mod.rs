//! Event bus: where the mutation router publishes and the rule runner consumes.

mod local;
mod nats;

pub use local::LocalEventBus;
pub use nats::{subject_for, NatsClient, NatsConfig, NatsEventBus};

use crate::event::DispatchEvent;
use anyhow::Result;
use async_trait::async_trait;

/// Publish side of the event bus.
///
/// Delivery is at-least-once and unordered; `publish` returns once the bus
/// has accepted the event, not once it was dispatched.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a prepared event (id already assigned).
    async fn publish(&self, event: &DispatchEvent) -> Result<()>;
}
