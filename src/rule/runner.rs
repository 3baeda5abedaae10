use super::RuleConfig;
use crate::bus::NatsConfig;
use crate::dispatch::{Acknowledgment, DispatchHandler};
use crate::event::DispatchEvent;
use anyhow::{Context, Result};
use async_nats::jetstream::{self, AckKind};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, error, info, warn};

/// Result of offering one event to the rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Source did not match; the handler was not invoked
    Unmatched,
    Dispatched(Acknowledgment),
    /// The handler reported a hard failure
    Failed(String),
}

/// Runs a rule: consumes events, matches them and invokes the dispatch
/// handler once per match, each invocation as its own task.
pub struct RuleRunner {
    config: RuleConfig,
    handler: DispatchHandler,
    permits: Arc<Semaphore>,
}

impl RuleRunner {
    pub fn new(config: RuleConfig, handler: DispatchHandler) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            config,
            handler,
            permits,
        }
    }

    /// Matches one event and, on a match, runs the dispatch handler.
    pub async fn invoke(&self, event: &DispatchEvent) -> Delivery {
        if !self.config.pattern.matches(event) {
            debug!(
                rule = %self.config.name,
                event_id = %event.log_id(),
                source = %event.source,
                "Event does not match rule"
            );
            return Delivery::Unmatched;
        }

        match self.handler.handle(event).await {
            Ok(ack) => Delivery::Dispatched(ack),
            Err(e) => Delivery::Failed(e.to_string()),
        }
    }

    /// Consumes the in-process bus until it closes.
    pub async fn run_local(self: Arc<Self>, mut rx: broadcast::Receiver<DispatchEvent>) {
        info!(rule = %self.config.name, "Starting rule on local event bus");

        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Rule lagged, events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let Ok(permit) = self.permits.clone().acquire_owned().await else {
                break;
            };
            let runner = Arc::clone(&self);
            tokio::spawn(async move {
                let _permit = permit;
                runner.invoke(&event).await;
            });
        }

        warn!(rule = %self.config.name, "Local event bus closed, rule stopped");
    }

    /// Consumes the JetStream stream through a durable consumer.
    ///
    /// Successful and unmatched deliveries are acked, undecodable messages
    /// are acked and dropped, hard dispatch failures are nak'ed so the
    /// stream redelivers them up to `max_deliver` times.
    pub async fn run_jetstream(
        self: Arc<Self>,
        jetstream: jetstream::Context,
        nats: &NatsConfig,
    ) -> Result<()> {
        info!(rule = %self.config.name, "Starting rule on JetStream");

        let stream = jetstream
            .get_stream(&nats.stream_name)
            .await
            .with_context(|| format!("Failed to get {} stream", nats.stream_name))?;

        let consumer = stream
            .get_or_create_consumer(
                &self.config.durable_name,
                jetstream::consumer::pull::Config {
                    durable_name: Some(self.config.durable_name.clone()),
                    filter_subject: nats.all_subjects(),
                    max_deliver: self.config.max_deliver,
                    ack_wait: Duration::from_secs(self.config.ack_wait_seconds),
                    ..Default::default()
                },
            )
            .await
            .context("Failed to get or create consumer")?;

        info!(consumer = %self.config.durable_name, "Rule consumer ready, processing events...");

        let mut messages = consumer.messages().await?;

        while let Some(next) = messages.next().await {
            let msg = match next {
                Ok(msg) => msg,
                Err(e) => {
                    error!(error = %e, "Error receiving message");
                    continue;
                }
            };

            let event = match serde_json::from_slice::<DispatchEvent>(&msg.payload) {
                Ok(event) => event,
                Err(e) => {
                    error!(error = %e, subject = %msg.subject, "Failed to decode event, skipping");
                    // Ack so a malformed message is not redelivered
                    let _ = msg.ack().await;
                    continue;
                }
            };

            let permit = self.permits.clone().acquire_owned().await?;
            let runner = Arc::clone(&self);
            tokio::spawn(async move {
                let _permit = permit;
                let ack = match runner.invoke(&event).await {
                    Delivery::Failed(reason) => {
                        warn!(event_id = %event.log_id(), reason = %reason, "Dispatch failed, leaving redelivery to the stream");
                        msg.ack_with(AckKind::Nak(None)).await
                    }
                    Delivery::Unmatched | Delivery::Dispatched(_) => msg.ack().await,
                };
                if let Err(e) = ack {
                    error!(error = %e, "Failed to acknowledge message");
                }
            });
        }

        warn!(rule = %self.config.name, "Rule consumer stream ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{EventBus, LocalEventBus};
    use crate::event::{Detail, Mutation, EVENT_SOURCE};
    use crate::notify::NotificationHandler;
    use crate::store::{MemoryRecordStore, Record, RecordStore, StoreError};
    use serde_json::{json, Map, Value};

    struct BrokenStore;

    impl RecordStore for BrokenStore {
        fn put(&self, _record: Record) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        fn insert_if_absent(&self, _record: Record) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        fn get(&self, _id: &str) -> Result<Option<Record>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        fn update(&self, _id: &str, _changes: Map<String, Value>) -> Result<Record, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        fn delete(&self, _id: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    fn runner(store: Arc<dyn RecordStore>) -> RuleRunner {
        RuleRunner::new(
            RuleConfig::default(),
            DispatchHandler::new(store, NotificationHandler::disabled()),
        )
    }

    fn booking_request(id: &str) -> DispatchEvent {
        let mut detail = Detail::new();
        detail.insert("id".to_string(), json!(id));
        detail.insert("userName".to_string(), json!("alice"));
        let mut event = DispatchEvent::for_mutation(Mutation::AddBookingRequest, detail);
        event.validate_and_prepare().unwrap();
        event
    }

    #[tokio::test]
    async fn test_matching_event_is_dispatched() {
        let store = Arc::new(MemoryRecordStore::new());
        let runner = runner(store.clone());

        let delivery = runner.invoke(&booking_request("b1")).await;

        assert_eq!(delivery, Delivery::Dispatched(Acknowledgment::success()));
        assert!(store.get("b1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_foreign_source_is_not_dispatched() {
        let store = Arc::new(MemoryRecordStore::new());
        let runner = runner(store.clone());
        let mut event = booking_request("b1");
        event.source = "billing-events".to_string();

        assert_eq!(runner.invoke(&event).await, Delivery::Unmatched);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_detail_type_fails_delivery() {
        let runner = runner(Arc::new(MemoryRecordStore::new()));
        let event = DispatchEvent::new(EVENT_SOURCE, "renameTable", Detail::new());

        assert!(matches!(runner.invoke(&event).await, Delivery::Failed(_)));
    }

    #[tokio::test]
    async fn test_store_failure_fails_delivery() {
        let runner = runner(Arc::new(BrokenStore));

        match runner.invoke(&booking_request("b1")).await {
            Delivery::Failed(reason) => assert!(reason.contains("down")),
            other => panic!("Expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_local_dispatches_published_events() {
        let store = Arc::new(MemoryRecordStore::new());
        let bus = LocalEventBus::new(16);
        let task = tokio::spawn(Arc::new(runner(store.clone())).run_local(bus.subscribe()));

        for id in ["b1", "b2", "b3"] {
            bus.publish(&booking_request(id)).await.unwrap();
        }

        tokio::time::timeout(Duration::from_secs(2), async {
            while store.len() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("events were not dispatched in time");

        task.abort();
    }
}
