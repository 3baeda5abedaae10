use super::EventBus;
use crate::event::DispatchEvent;
use anyhow::{Context, Result};
use async_nats::jetstream::{self, stream};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

/// NATS configuration
#[derive(Clone, Debug, Deserialize)]
pub struct NatsConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_stream_name")]
    pub stream_name: String,
    /// Events are published to `{subject_prefix}.{source}.{detail-type}`
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: i64,
}

fn default_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_stream_name() -> String {
    "BOOKING_EVENTS".to_string()
}

fn default_subject_prefix() -> String {
    "booking.events".to_string()
}

fn default_max_age_days() -> i64 {
    7
}

fn default_max_bytes() -> i64 {
    1024 * 1024 * 1024 // 1GB
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            stream_name: default_stream_name(),
            subject_prefix: default_subject_prefix(),
            max_age_days: default_max_age_days(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl NatsConfig {
    /// Subject filter covering every event on the bus
    pub fn all_subjects(&self) -> String {
        format!("{}.>", self.subject_prefix)
    }
}

/// NATS client with JetStream
pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    config: NatsConfig,
}

impl NatsClient {
    /// Connect to NATS and initialize JetStream
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        info!("Connecting to NATS at {}", config.url);

        let client = async_nats::connect(&config.url)
            .await
            .context("Failed to connect to NATS")?;

        let jetstream = jetstream::new(client.clone());

        let nats_client = Self {
            client,
            jetstream,
            config,
        };

        nats_client.ensure_stream().await?;

        Ok(nats_client)
    }

    /// Ensure JetStream stream exists with proper configuration
    async fn ensure_stream(&self) -> Result<()> {
        if self.jetstream.get_stream(&self.config.stream_name).await.is_ok() {
            info!("Stream '{}' already exists", self.config.stream_name);
            return Ok(());
        }

        info!("Stream '{}' does not exist, creating...", self.config.stream_name);

        let stream_config = stream::Config {
            name: self.config.stream_name.clone(),
            subjects: vec![self.config.all_subjects()],
            max_age: std::time::Duration::from_secs((self.config.max_age_days * 86400) as u64),
            max_bytes: self.config.max_bytes,
            storage: stream::StorageType::File,
            retention: stream::RetentionPolicy::Limits,
            ..Default::default()
        };

        self.jetstream
            .create_stream(stream_config)
            .await
            .context("Failed to create JetStream stream")?;

        info!("Created JetStream stream '{}'", self.config.stream_name);
        Ok(())
    }

    pub fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }

    /// Core client, used for fan-out topic publishes
    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }

    pub fn config(&self) -> &NatsConfig {
        &self.config
    }

    /// Event bus publishing into this client's stream
    pub fn event_bus(&self) -> NatsEventBus {
        NatsEventBus::new(self.jetstream.clone(), self.config.subject_prefix.clone())
    }
}

/// Event bus backed by NATS JetStream
#[derive(Clone)]
pub struct NatsEventBus {
    jetstream: jetstream::Context,
    subject_prefix: String,
}

impl NatsEventBus {
    pub fn new(jetstream: jetstream::Context, subject_prefix: String) -> Self {
        Self {
            jetstream,
            subject_prefix,
        }
    }
}

#[async_trait]
impl EventBus for NatsEventBus {
    /// Payload: JSON-serialized DispatchEvent, `detail` string-encoded.
    /// Resolves after the JetStream publish ack.
    async fn publish(&self, event: &DispatchEvent) -> Result<()> {
        let subject = subject_for(&self.subject_prefix, event);
        let payload = serde_json::to_vec(event).context("Failed to serialize event to JSON")?;

        debug!(
            event_id = %event.log_id(),
            detail_type = %event.detail_type,
            subject = %subject,
            "Publishing event to NATS"
        );

        self.jetstream
            .publish(subject.clone(), payload.into())
            .await
            .with_context(|| format!("Failed to publish event to subject '{}'", subject))?
            .await
            .context("Failed to await publish ack")?;

        Ok(())
    }
}

/// Builds the subject an event is published on.
///
/// Characters that are not valid inside a subject token are replaced with `_`.
pub fn subject_for(prefix: &str, event: &DispatchEvent) -> String {
    format!(
        "{}.{}.{}",
        prefix,
        subject_token(&event.source),
        subject_token(&event.detail_type)
    )
}

fn subject_token(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Detail, Mutation};

    #[test]
    fn test_subject_for_mutation_event() {
        let event = DispatchEvent::for_mutation(Mutation::BookTimeSlot, Detail::new());
        assert_eq!(
            subject_for("booking.events", &event),
            "booking.events.restaurant-app-events.bookTimeSlot"
        );
    }

    #[test]
    fn test_subject_tokens_are_sanitized() {
        let event = DispatchEvent::new("booking.workflow", "slot booked >*", Detail::new());
        assert_eq!(
            subject_for("booking.events", &event),
            "booking.events.booking_workflow.slot_booked___"
        );
    }

    #[test]
    fn test_default_config() {
        let config = NatsConfig::default();
        assert_eq!(config.stream_name, "BOOKING_EVENTS");
        assert_eq!(config.all_subjects(), "booking.events.>");
    }
}
