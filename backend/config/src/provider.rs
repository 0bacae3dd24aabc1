//! Typed, defaulted access to a plugin's configuration block.
//!
//! Every getter takes a default that is returned when the key is absent or
//! holds a value of the wrong type, so a malformed block degrades to defaults
//! instead of failing the plugin.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Key inside a block that switches it on or off.
pub const ENABLED_KEY: &str = "enabled";

/// Cloning shares the underlying settings.
#[derive(Debug, Clone, Default)]
pub struct ConfigProvider {
    enabled: bool,
    settings: Arc<RwLock<Map<String, Value>>>,
}

impl ConfigProvider {
    pub fn new(enabled: bool, settings: Map<String, Value>) -> Self {
        Self {
            enabled,
            settings: Arc::new(RwLock::new(settings)),
        }
    }

    /// Build from a config block. An object is enabled unless it carries
    /// `enabled: false`; anything else yields the empty, disabled provider.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => {
                let enabled = map.get(ENABLED_KEY).and_then(Value::as_bool).unwrap_or(true);
                Self::new(enabled, map.clone())
            }
            _ => Self::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Provider for the nested block under `key`.
    pub fn scoped(&self, key: &str) -> ConfigProvider {
        self.lookup(key)
            .map(|v| ConfigProvider::from_value(&v))
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Keys present in this block, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.lookup(key)
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| default.to_owned())
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.lookup(key).and_then(|v| v.as_i64()).unwrap_or(default)
    }

    pub fn get_float(&self, key: &str, default: f64) -> f64 {
        self.lookup(key).and_then(|v| v.as_f64()).unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.lookup(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    /// Reads an integer number of milliseconds.
    pub fn get_duration_ms(&self, key: &str, default: Duration) -> Duration {
        self.lookup(key)
            .and_then(|v| v.as_u64())
            .map(Duration::from_millis)
            .unwrap_or(default)
    }

    /// Deserialize one value into `T`, falling back to `default` on any mismatch.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.lookup(key)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or(default)
    }

    /// Raw JSON value, if present.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.lookup(key)
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.settings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    /// Deserialize the whole block into a structured target.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        let snapshot = Value::Object(self.read().clone());
        Ok(serde_json::from_value(snapshot)?)
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Map<String, Value>> {
        self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn provider() -> ConfigProvider {
        ConfigProvider::from_value(&json!({
            "url": "redis://localhost",
            "poolSize": 8,
            "ratio": 0.5,
            "verbose": true,
            "flushIntervalMs": 1500,
            "tags": ["a", "b"],
            "nested": {"enabled": false, "depth": 2}
        }))
    }

    #[test]
    fn test_typed_getters() {
        let p = provider();
        assert!(p.is_enabled());
        assert_eq!(p.get_string("url", "none"), "redis://localhost");
        assert_eq!(p.get_int("poolSize", 1), 8);
        assert_eq!(p.get_float("ratio", 0.0), 0.5);
        assert!(p.get_bool("verbose", false));
        assert_eq!(p.get_duration_ms("flushIntervalMs", Duration::ZERO), Duration::from_millis(1500));
        assert_eq!(p.get::<Vec<String>>("tags", vec![]), vec!["a", "b"]);
    }

    #[test]
    fn test_mistyped_or_missing_values_fall_back() {
        let p = provider();
        assert_eq!(p.get_int("url", 3), 3);
        assert_eq!(p.get_string("poolSize", "dflt"), "dflt");
        assert!(!p.get_bool("missing", false));
        assert_eq!(p.get::<Vec<u32>>("tags", vec![9]), vec![9]);
    }

    #[test]
    fn test_default_provider_is_disabled_and_empty() {
        let p = ConfigProvider::default();
        assert!(!p.is_enabled());
        assert_eq!(p.get_string("anything", "x"), "x");
        assert!(p.keys().is_empty());
    }

    #[test]
    fn test_scoped_block() {
        let p = provider();
        let nested = p.scoped("nested");
        assert!(!nested.is_enabled());
        assert_eq!(nested.get_int("depth", 0), 2);

        let absent = p.scoped("absent");
        assert!(!absent.is_enabled());
    }

    #[test]
    fn test_bind_into_struct() {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct CacheSettings {
            url: String,
            pool_size: u32,
            #[serde(default)]
            missing: Option<String>,
        }

        let settings: CacheSettings = provider().bind().unwrap();
        assert_eq!(settings.url, "redis://localhost");
        assert_eq!(settings.pool_size, 8);
        assert!(settings.missing.is_none());
    }

    #[test]
    fn test_bind_type_error() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Strict {
            url: u32,
        }
        assert!(matches!(provider().bind::<Strict>(), Err(ConfigError::Bind(_))));
    }

    #[test]
    fn test_set_is_visible_through_clones() {
        let p = ConfigProvider::default();
        let clone = p.clone();
        p.set("level", json!(3));
        assert_eq!(clone.get_int("level", 0), 3);
    }
}
