use super::EventBus;
use crate::event::DispatchEvent;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

/// In-process event bus on a broadcast channel.
///
/// Used when the API and the rule runner share a process. Events published
/// while no rule is subscribed are dropped, as on the managed bus.
#[derive(Clone)]
pub struct LocalEventBus {
    tx: broadcast::Sender<DispatchEvent>,
}

impl LocalEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to every event published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.tx.subscribe()
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventBus for LocalEventBus {
    async fn publish(&self, event: &DispatchEvent) -> Result<()> {
        match self.tx.send(event.clone()) {
            Ok(receivers) => {
                debug!(event_id = %event.log_id(), receivers, "Published event to local bus");
            }
            Err(_) => {
                debug!(event_id = %event.log_id(), "No rules subscribed, event dropped");
            }
        }
        Ok(())
    }
}
