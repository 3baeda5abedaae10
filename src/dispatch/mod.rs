//! Dispatch handler: turns a matched event into a record store operation
//! and an optional fan-out notification.

use crate::event::{DispatchEvent, Mutation, UnknownMutation};
use crate::notify::{NotificationHandler, NotificationOutcome};
use crate::store::{Record, RecordStore, StoreError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;


/// Literal acknowledgment text. Existing consumers match on it byte for byte.
pub const ACK_MESSAGE: &str = "operation Successfull";

/// Record `type` attribute for time slots
pub const TIME_SLOT_TYPE: &str = "timeSlot";

/// Record `type` attribute for booking requests
pub const BOOKING_REQUEST_TYPE: &str = "bookingRequest";

/// Returned to the invoker on non-fatal completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub message: String,
}

impl Acknowledgment {
    pub fn success() -> Self {
        Self {
            message: ACK_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Unsupported(#[from] UnknownMutation),

    #[error("{mutation} event is missing detail field '{field}'")]
    MissingField {
        mutation: Mutation,
        field: &'static str,
    },

    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),
}

/// What a dispatch did to the record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEffect {
    Inserted { id: String },
    /// Add for a key that already exists; the record was left as it was
    AlreadyPresent { id: String },
    Updated { id: String },
    Deleted { id: String, existed: bool },
    /// Update target does not exist (yet, or any more)
    Skipped { id: String },
}

/// Outcome of a single dispatch invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub mutation: Mutation,
    pub effect: StoreEffect,
    pub notification: NotificationOutcome,
}

/// Stateless per-event handler.
///
/// Holds only injected handles; all state lives in the record store.
#[derive(Clone)]
pub struct DispatchHandler {
    store: Arc<dyn RecordStore>,
    notifier: NotificationHandler,
}

impl DispatchHandler {
    pub fn new(store: Arc<dyn RecordStore>, notifier: NotificationHandler) -> Self {
        Self { store, notifier }
    }

    /// Invocation entry point.
    ///
    /// Succeeds whenever the store operation succeeded, whatever happened to
    /// the notification.
    pub async fn handle(&self, event: &DispatchEvent) -> Result<Acknowledgment, DispatchError> {
        self.dispatch(event).await.map(|_| Acknowledgment::success())
    }

    /// Applies the store operation for `event.detail_type`, then forwards
    /// `SnsMessage` to the notification handler.
    pub async fn dispatch(&self, event: &DispatchEvent) -> Result<DispatchReport, DispatchError> {
        let mutation = event.mutation().map_err(|e| {
            warn!(
                event_id = %event.log_id(),
                detail_type = %event.detail_type,
                "Unsupported detail-type, no store operation"
            );
            e
        })?;

        let effect = self.apply(mutation, event).map_err(|e| {
            error!(
                event_id = %event.log_id(),
                mutation = %mutation,
                error = %e,
                "Dispatch failed"
            );
            e
        })?;

        debug!(event_id = %event.log_id(), mutation = %mutation, effect = ?effect, "Store updated");

        // Store success is final from here on; notification is best effort
        let notification = self.notifier.deliver(event.sns_message()).await;

        Ok(DispatchReport {
            mutation,
            effect,
            notification,
        })
    }

    fn apply(&self, mutation: Mutation, event: &DispatchEvent) -> Result<StoreEffect, DispatchError> {
        match mutation {
            Mutation::AddTimeSlot => {
                let from = required(event, mutation, "from")?;
                let to = required(event, mutation, "to")?;
                // Redelivery of the same event maps to the same key
                let id = event
                    .id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string());

                let mut attributes = Map::new();
                attributes.insert("type".to_string(), json!(TIME_SLOT_TYPE));
                attributes.insert("from".to_string(), json!(from));
                attributes.insert("to".to_string(), json!(to));
                attributes.insert("isBooked".to_string(), json!(false));

                self.insert(Record::new(id, attributes))
            }
            Mutation::AddBookingRequest => {
                let id = required(event, mutation, "id")?;
                let user_name = required(event, mutation, "userName")?;

                let mut attributes = Map::new();
                attributes.insert("type".to_string(), json!(BOOKING_REQUEST_TYPE));
                attributes.insert("userName".to_string(), json!(user_name));

                self.insert(Record::new(id, attributes))
            }
            Mutation::BookTimeSlot => {
                let id = required(event, mutation, "id")?;
                let mut changes = Map::new();
                changes.insert("isBooked".to_string(), json!(true));
                changes.insert("bookedAt".to_string(), json!(Utc::now().to_rfc3339()));
                self.update(id, changes)
            }
            Mutation::ResetAllBookings => {
                let id = required(event, mutation, "id")?;
                let mut changes = Map::new();
                changes.insert("isBooked".to_string(), json!(false));
                changes.insert("bookedAt".to_string(), Value::Null);
                self.update(id, changes)
            }
            Mutation::DeleteTimeSlot | Mutation::DeleteBookingRequest | Mutation::CancelBooking => {
                let id = required(event, mutation, "id")?;
                let existed = self.store.delete(id)?;
                if existed {
                    info!(id = %id, mutation = %mutation, "Record deleted");
                } else {
                    debug!(id = %id, mutation = %mutation, "Record already absent");
                }
                Ok(StoreEffect::Deleted {
                    id: id.to_string(),
                    existed,
                })
            }
        }
    }

    /// Conditional insert, so a redelivered add never overwrites later
    /// updates to the same record.
    fn insert(&self, record: Record) -> Result<StoreEffect, DispatchError> {
        let id = record.id.clone();
        let kind = record.attr_str("type").unwrap_or_default().to_string();
        if self.store.insert_if_absent(record)? {
            info!(id = %id, record_type = %kind, "Record added");
            Ok(StoreEffect::Inserted { id })
        } else {
            debug!(id = %id, record_type = %kind, "Record already present, leaving it unchanged");
            Ok(StoreEffect::AlreadyPresent { id })
        }
    }

    fn update(&self, id: &str, changes: Map<String, Value>) -> Result<StoreEffect, DispatchError> {
        match self.store.update(id, changes) {
            Ok(_) => Ok(StoreEffect::Updated { id: id.to_string() }),
            Err(StoreError::NotFound(_)) => {
                warn!(id = %id, "Update target not found, skipping");
                Ok(StoreEffect::Skipped { id: id.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn required<'a>(
    event: &'a DispatchEvent,
    mutation: Mutation,
    field: &'static str,
) -> Result<&'a str, DispatchError> {
    event
        .detail_str(field)
        .ok_or(DispatchError::MissingField { mutation, field })
}
