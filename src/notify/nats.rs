use super::TopicPublisher;
use anyhow::{Context, Result};
use async_trait::async_trait;

/// Fan-out topic on a plain NATS subject.
///
/// Core NATS publish delivers to every current subscriber of the subject;
/// the topic address is the subject name.
#[derive(Clone)]
pub struct NatsTopicPublisher {
    client: async_nats::Client,
}

impl NatsTopicPublisher {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TopicPublisher for NatsTopicPublisher {
    async fn publish(&self, topic: &str, message: String) -> Result<()> {
        self.client
            .publish(topic.to_string(), message.into())
            .await
            .with_context(|| format!("Failed to publish notification to '{}'", topic))?;
        // Surface connection problems instead of leaving the message buffered
        self.client
            .flush()
            .await
            .context("Failed to flush notification")?;
        Ok(())
    }
}
