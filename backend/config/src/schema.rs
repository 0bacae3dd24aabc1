//! HostForge runtime configuration schema.
//!
//! Sections are optional in YAML; [`crate::apply_all_defaults`] fills the
//! gaps after loading. Plugin blocks stay untyped (`serde_json::Value`) and
//! are handed to each plugin through a [`ConfigProvider`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::defaults::{
    DEFAULT_BUS_BUFFER_SIZE, DEFAULT_LOG_LEVEL, DEFAULT_PUBLISH_TIMEOUT_MS,
    DEFAULT_SHUTDOWN_TIMEOUT_MS,
};
use crate::provider::ConfigProvider;

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Event bus sizing and publish deadline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus: Option<BusSettings>,

    /// Upper bound for the whole reverse-order disable walk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutdown_timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingSettings>,

    /// Per-plugin configuration blocks, keyed by plugin name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plugins: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSettings {
    /// `EnvFilter` directive, e.g. `info` or `hostforge_plugins=debug`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Directory for the rolling JSON log file; console only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl RuntimeConfig {
    pub fn bus_buffer_size(&self) -> usize {
        self.bus
            .as_ref()
            .and_then(|b| b.buffer_size)
            .unwrap_or(DEFAULT_BUS_BUFFER_SIZE)
    }

    pub fn publish_timeout(&self) -> Duration {
        let ms = self
            .bus
            .as_ref()
            .and_then(|b| b.publish_timeout_ms)
            .unwrap_or(DEFAULT_PUBLISH_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_MS))
    }

    pub fn log_level(&self) -> &str {
        self.logging
            .as_ref()
            .and_then(|l| l.level.as_deref())
            .unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.logging.as_ref().and_then(|l| l.dir.as_deref())
    }

    /// Provider over the whole `plugins` map; scope it with
    /// [`ConfigProvider::scoped`] to reach one plugin's block.
    pub fn plugins_provider(&self) -> ConfigProvider {
        let settings: serde_json::Map<String, serde_json::Value> = self
            .plugins
            .iter()
            .map(|(name, block)| (name.clone(), block.clone()))
            .collect();
        ConfigProvider::new(true, settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_fall_back_to_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.bus_buffer_size(), DEFAULT_BUS_BUFFER_SIZE);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(config.log_level(), "info");
        assert!(config.log_dir().is_none());
    }

    #[test]
    fn test_parse_yaml_document() {
        let yaml = r#"
bus:
  bufferSize: 16
  publishTimeoutMs: 250
shutdownTimeoutMs: 1000
logging:
  level: debug
plugins:
  audit:
    enabled: true
    retentionDays: 30
"#;
        let config: RuntimeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.bus_buffer_size(), 16);
        assert_eq!(config.publish_timeout(), Duration::from_millis(250));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(1));
        assert_eq!(config.log_level(), "debug");

        let audit = config.plugins_provider().scoped("audit");
        assert!(audit.is_enabled());
        assert_eq!(audit.get_int("retentionDays", 7), 30);
    }
}
