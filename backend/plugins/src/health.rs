//! Aggregated plugin health.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PluginHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub checked_at: DateTime<Utc>,
    pub plugins: BTreeMap<String, PluginHealth>,
}

impl HealthReport {
    pub fn new() -> Self {
        Self {
            checked_at: Utc::now(),
            plugins: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, plugin: impl Into<String>, outcome: anyhow::Result<()>, latency: Duration) {
        let health = PluginHealth {
            healthy: outcome.is_ok(),
            error: outcome.err().map(|e| format!("{e:#}")),
            latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
        };
        self.plugins.insert(plugin.into(), health);
    }

    /// True when every checked plugin is healthy. An empty report is healthy.
    pub fn is_healthy(&self) -> bool {
        self.plugins.values().all(|h| h.healthy)
    }

    /// Names of the plugins whose check failed.
    pub fn unhealthy(&self) -> Vec<&str> {
        self.plugins
            .iter()
            .filter(|(_, h)| !h.healthy)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

impl Default for HealthReport {
    fn default() -> Self {
        Self::new()
    }
}
