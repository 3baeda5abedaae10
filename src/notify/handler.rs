use super::TopicPublisher;
use crate::dispatch::Acknowledgment;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What happened to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Published,
    /// No payload was supplied
    NoMessage,
    /// No topic address configured
    NoTopic,
    Failed(String),
}

/// Publishes optional payloads to the configured fan-out topic.
#[derive(Clone)]
pub struct NotificationHandler {
    target: Option<(Arc<dyn TopicPublisher>, String)>,
    publish_timeout: Duration,
}

impl NotificationHandler {
    pub fn new(publisher: Arc<dyn TopicPublisher>, topic: impl Into<String>) -> Self {
        Self {
            target: Some((publisher, topic.into())),
            publish_timeout: Duration::from_secs(2),
        }
    }

    /// Handler without a topic; every payload is skipped.
    pub fn disabled() -> Self {
        Self {
            target: None,
            publish_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn topic(&self) -> Option<&str> {
        self.target.as_ref().map(|(_, topic)| topic.as_str())
    }

    /// Publishes `message` if present and always acknowledges.
    pub async fn handle(&self, message: Option<&Value>) -> Acknowledgment {
        self.deliver(message).await;
        Acknowledgment::success()
    }

    /// Publishes `message` if present, reporting what happened.
    ///
    /// Never returns an error: failures are logged and reported as
    /// `NotificationOutcome::Failed`.
    pub async fn deliver(&self, message: Option<&Value>) -> NotificationOutcome {
        let Some(message) = message else {
            debug!("No notification payload, nothing to publish");
            return NotificationOutcome::NoMessage;
        };

        let Some((publisher, topic)) = &self.target else {
            warn!("No topic address configured, skipping notification");
            return NotificationOutcome::NoTopic;
        };

        let body = match serde_json::to_string(message) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to serialize notification payload");
                return NotificationOutcome::Failed(e.to_string());
            }
        };

        match tokio::time::timeout(self.publish_timeout, publisher.publish(topic, body)).await {
            Ok(Ok(())) => {
                info!(topic = %topic, "Notification published");
                NotificationOutcome::Published
            }
            Ok(Err(e)) => {
                warn!(error = %e, topic = %topic, "Failed to publish notification");
                NotificationOutcome::Failed(e.to_string())
            }
            Err(_) => {
                warn!(
                    topic = %topic,
                    timeout_ms = self.publish_timeout.as_millis() as u64,
                    "Notification publish timed out"
                );
                NotificationOutcome::Failed("publish timed out".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl TopicPublisher for RecordingPublisher {
        async fn publish(&self, topic: &str, message: String) -> Result<()> {
            self.sent.lock().unwrap().push((topic.to_string(), message));
            Ok(())
        }
    }

    struct UnreachablePublisher;

    #[async_trait]
    impl TopicPublisher for UnreachablePublisher {
        async fn publish(&self, _topic: &str, _message: String) -> Result<()> {
            bail!("connection refused")
        }
    }

    struct HangingPublisher;

    #[async_trait]
    impl TopicPublisher for HangingPublisher {
        async fn publish(&self, _topic: &str, _message: String) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publishes_serialized_payload_without_envelope() {
        let publisher = Arc::new(RecordingPublisher::default());
        let handler = NotificationHandler::new(publisher.clone(), "booking.notifications");

        let payload = json!({"status": "booked", "slot": "09:00"});
        let ack = handler.handle(Some(&payload)).await;

        assert_eq!(ack, Acknowledgment::success());
        let sent = publisher.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "booking.notifications");
        assert_eq!(sent[0].1, r#"{"status":"booked","slot":"09:00"}"#);
    }

    #[tokio::test]
    async fn test_absent_payload_publishes_nothing() {
        let publisher = Arc::new(RecordingPublisher::default());
        let handler = NotificationHandler::new(publisher.clone(), "booking.notifications");

        assert_eq!(handler.deliver(None).await, NotificationOutcome::NoMessage);
        assert_eq!(handler.handle(None).await, Acknowledgment::success());
        assert!(publisher.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_topic_still_acknowledges() {
        let handler = NotificationHandler::new(Arc::new(UnreachablePublisher), "booking.notifications");
        let payload = json!({"status": "booked"});

        match handler.deliver(Some(&payload)).await {
            NotificationOutcome::Failed(msg) => assert!(msg.contains("connection refused")),
            other => panic!("Expected Failed, got {:?}", other),
        }
        assert_eq!(handler.handle(Some(&payload)).await, Acknowledgment::success());
    }

    #[tokio::test]
    async fn test_hanging_publish_times_out() {
        let handler = NotificationHandler::new(Arc::new(HangingPublisher), "booking.notifications")
            .with_publish_timeout(Duration::from_millis(20));

        let outcome = handler.deliver(Some(&json!("hello"))).await;
        assert_eq!(outcome, NotificationOutcome::Failed("publish timed out".to_string()));
    }

    #[tokio::test]
    async fn test_disabled_handler_skips() {
        let handler = NotificationHandler::disabled();
        assert!(handler.topic().is_none());
        assert_eq!(
            handler.deliver(Some(&json!({"status": "booked"}))).await,
            NotificationOutcome::NoTopic
        );
    }
}
