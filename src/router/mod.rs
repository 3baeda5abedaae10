//! Mutation router: client mutation in, event on the bus out.

mod template;

pub use template::{build_detail, detail_fields, ArgumentError};

use crate::bus::EventBus;
use crate::event::{DispatchEvent, Mutation, UnknownMutation, ValidationError};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

/// Returned once the bus accepted the event.
///
/// Acceptance only; the record is persisted later by the dispatch handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationReceipt {
    pub mutation: Mutation,
    #[serde(rename = "eventId")]
    pub event_id: String,
    pub status: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error(transparent)]
    UnknownMutation(#[from] UnknownMutation),

    #[error("invalid arguments for {mutation}: {source}")]
    InvalidArguments {
        mutation: Mutation,
        #[source]
        source: ArgumentError,
    },

    /// The router built an envelope that fails validation. Not caused by
    /// client input and never retried against the bus.
    #[error("{mutation} event failed validation: {source}")]
    InvalidEvent {
        mutation: Mutation,
        #[source]
        source: ValidationError,
    },

    #[error("failed to publish {mutation} event: {reason}")]
    Publish { mutation: Mutation, reason: String },
}

/// Translates named mutations into events and publishes them.
#[derive(Clone)]
pub struct MutationRouter {
    bus: Arc<dyn EventBus>,
}

impl MutationRouter {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    /// Routes a mutation given by name, as received from a client.
    pub async fn route_named(&self, name: &str, args: &Value) -> Result<MutationReceipt, RouterError> {
        let mutation: Mutation = name.parse()?;
        self.route(mutation, args).await
    }

    /// Builds the event for `mutation` and publishes it.
    ///
    /// A publish failure is returned to the caller, not retried here.
    pub async fn route(&self, mutation: Mutation, args: &Value) -> Result<MutationReceipt, RouterError> {
        let detail = build_detail(mutation, args)
            .map_err(|source| RouterError::InvalidArguments { mutation, source })?;

        let mut event = DispatchEvent::for_mutation(mutation, detail);
        // Source is a constant and detail-type a known name, so this only
        // assigns id and time
        event.validate_and_prepare().map_err(|source| {
            error!(mutation = %mutation, error = %source, "Mutation event failed validation");
            RouterError::InvalidEvent { mutation, source }
        })?;

        let event_id = event.log_id().to_string();

        self.bus.publish(&event).await.map_err(|e| {
            error!(error = %e, event_id = %event_id, mutation = %mutation, "Failed to publish mutation event");
            RouterError::Publish {
                mutation,
                reason: format!("{:#}", e),
            }
        })?;

        info!(event_id = %event_id, mutation = %mutation, "Mutation event published");

        Ok(MutationReceipt {
            mutation,
            event_id,
            status: "accepted",
        })
    }
}
