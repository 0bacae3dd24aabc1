use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable message travelling over the event bus.
///
/// Events are fire-and-forget: there is no acknowledgement and nothing is
/// persisted. `timestamp` is stamped by the bus at publish time when unset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Exact-match topic string, e.g. `user.created`.
    pub name: String,
    pub data: serde_json::Value,
    /// Name of the plugin that published the event, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Event {
    pub fn new(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            data,
            source: None,
            timestamp: None,
        }
    }

    /// Tag the event with the publishing plugin.
    pub fn from_plugin(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub(crate) fn stamp_if_unset(&mut self) {
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now());
        }
    }
}
