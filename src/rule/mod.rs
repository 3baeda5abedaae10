//! Rule matcher: a standing subscription that routes events to the
//! dispatch handler by source alone.

mod runner;

pub use runner::{Delivery, RuleRunner};

use crate::event::{DispatchEvent, EVENT_SOURCE};
use serde::{Deserialize, Serialize};

/// Event pattern matched against the envelope only.
///
/// `detail-type` and `detail` are never inspected; narrowing by mutation
/// is the dispatch handler's job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPattern {
    pub source: Vec<String>,
}

impl EventPattern {
    pub fn source(source: impl Into<String>) -> Self {
        Self {
            source: vec![source.into()],
        }
    }

    pub fn matches(&self, event: &DispatchEvent) -> bool {
        self.source.iter().any(|s| *s == event.source)
    }
}

impl Default for EventPattern {
    fn default() -> Self {
        Self::source(EVENT_SOURCE)
    }
}

/// Rule and consumer settings
#[derive(Clone, Debug, Deserialize)]
pub struct RuleConfig {
    #[serde(default = "default_rule_name")]
    pub name: String,
    #[serde(default)]
    pub pattern: EventPattern,
    /// Durable JetStream consumer backing the rule
    #[serde(default = "default_durable_name")]
    pub durable_name: String,
    /// Deliveries per event before JetStream gives up (bus-level retry)
    #[serde(default = "default_max_deliver")]
    pub max_deliver: i64,
    #[serde(default = "default_ack_wait_seconds")]
    pub ack_wait_seconds: u64,
    /// Dispatch invocations allowed in flight at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_rule_name() -> String {
    "lambdaInvokeRule".to_string()
}

fn default_durable_name() -> String {
    "booking-dispatch".to_string()
}

fn default_max_deliver() -> i64 {
    3
}

fn default_ack_wait_seconds() -> u64 {
    30
}

fn default_max_concurrency() -> usize {
    32
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            name: default_rule_name(),
            pattern: EventPattern::default(),
            durable_name: default_durable_name(),
            max_deliver: default_max_deliver(),
            ack_wait_seconds: default_ack_wait_seconds(),
            max_concurrency: default_max_concurrency(),
        }
    }
}
