use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

mod codec;
mod mutation;
mod validation;

pub use mutation::{Mutation, UnknownMutation};
pub use validation::{validate_and_prepare, ValidationError};

/// Source attribute stamped on every event the booking API emits.
pub const EVENT_SOURCE: &str = "restaurant-app-events";

/// Detail field carrying an optional fan-out payload.
pub const SNS_MESSAGE_FIELD: &str = "SnsMessage";

/// Field map carried in an event's `detail`.
pub type Detail = Map<String, Value>;

/// DispatchEvent is the envelope carried on the event bus.
///
/// Mirrors the managed event bus shape: `source`, `detail-type` and a
/// `detail` object that travels as a JSON-encoded string on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DispatchEvent {
    /// UUIDv7 identifier, generated at publish time if missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Producer time, generated at publish time if missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,

    /// Producer identity, matched by rules
    pub source: String,

    /// Mutation name for events produced by the mutation router
    #[serde(rename = "detail-type")]
    pub detail_type: String,

    /// Mutation arguments (and optionally `SnsMessage`)
    #[serde(with = "codec")]
    pub detail: Detail,
}

impl DispatchEvent {
    pub fn new(source: impl Into<String>, detail_type: impl Into<String>, detail: Detail) -> Self {
        Self {
            id: None,
            time: None,
            source: source.into(),
            detail_type: detail_type.into(),
            detail,
        }
    }

    /// Builds the event the mutation router publishes for `mutation`.
    pub fn for_mutation(mutation: Mutation, detail: Detail) -> Self {
        Self::new(EVENT_SOURCE, mutation.as_str(), detail)
    }

    /// Validates the envelope and fills in `id` and `time` when absent.
    pub fn validate_and_prepare(&mut self) -> Result<(), ValidationError> {
        validation::validate_and_prepare(self)
    }

    /// Parses `detail-type` as one of the known mutations.
    pub fn mutation(&self) -> Result<Mutation, UnknownMutation> {
        self.detail_type.parse()
    }

    /// Returns a string field from `detail`.
    pub fn detail_str(&self, field: &str) -> Option<&str> {
        self.detail.get(field).and_then(Value::as_str)
    }

    /// Returns the fan-out payload if present and non-empty.
    ///
    /// `null`, `false`, `0`, `""`, `{}` and `[]` all count as "no
    /// notification".
    pub fn sns_message(&self) -> Option<&Value> {
        self.detail.get(SNS_MESSAGE_FIELD).filter(|v| !is_empty_payload(v))
    }

    /// Event id for logging; `-` before the event was prepared.
    pub fn log_id(&self) -> &str {
        self.id.as_deref().unwrap_or("-")
    }
}

fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
    }
}
