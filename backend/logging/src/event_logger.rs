//! Bus Event Audit Logger
//!
//! An [`EventHandler`] that writes every event it receives to the
//! `bus_events` tracing target with secrets redacted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hostforge_core::{Event, EventBus, EventHandler, Subscription};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_sensitive_data;

#[derive(Debug, Serialize)]
pub struct EventLogEntry {
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Redacted JSON rendering of the payload
    pub payload: String,
}

impl EventLogEntry {
    pub fn from_event(event: &Event) -> Self {
        Self {
            topic: event.name.clone(),
            source: event.source.clone(),
            timestamp: event.timestamp.unwrap_or_else(Utc::now),
            payload: redact_sensitive_data(&event.data.to_string()),
        }
    }
}

#[derive(Default)]
pub struct EventAuditLogger {
    recorded: AtomicU64,
}

impl EventAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a shared logger to each of `topics`.
    pub fn attach<I, S>(self: &Arc<Self>, bus: &EventBus, topics: I) -> Vec<Subscription>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        topics
            .into_iter()
            .map(|topic| bus.subscribe(topic, Arc::clone(self) as Arc<dyn EventHandler>))
            .collect()
    }

    /// Number of events written so far.
    pub fn recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EventHandler for EventAuditLogger {
    fn name(&self) -> &str {
        "event-audit-logger"
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        let entry = EventLogEntry::from_event(event);
        info!(
            target: "bus_events",
            topic = %entry.topic,
            source = entry.source.as_deref().unwrap_or("-"),
            timestamp = %entry.timestamp,
            payload = %entry.payload,
            "Bus event"
        );
        self.recorded.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostforge_core::CancelScope;

    #[test]
    fn test_entry_redacts_payload() {
        let event = Event::new("user.login", serde_json::json!({"user": "ana", "password": "hunter2"}))
            .from_plugin("auth");
        let entry = EventLogEntry::from_event(&event);
        assert_eq!(entry.source.as_deref(), Some("auth"));
        assert!(!entry.payload.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_attached_logger_records_events() {
        let bus = EventBus::new();
        let logger = Arc::new(EventAuditLogger::new());
        let subs = logger.attach(&bus, ["user.created", "user.deleted"]);
        assert_eq!(subs.len(), 2);

        let scope = CancelScope::new();
        bus.publish(&scope, Event::new("user.created", serde_json::json!({"id": 1})))
            .await
            .unwrap();
        bus.publish(&scope, Event::new("user.deleted", serde_json::json!({"id": 1})))
            .await
            .unwrap();
        bus.publish(&scope, Event::new("user.updated", serde_json::json!({"id": 1})))
            .await
            .unwrap();
        bus.close().await;

        assert_eq!(logger.recorded(), 2);
    }
}
