//! Config validation with path-qualified messages.

use crate::schema::RuntimeConfig;
use thiserror::Error;

const KNOWN_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// All errors and warnings found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors joined into one line, for wrapping in `ConfigError::Invalid`.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

pub fn validate(config: &RuntimeConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_bus(config, &mut report);
    validate_shutdown(config, &mut report);
    validate_logging(config, &mut report);
    validate_plugins(config, &mut report);
    report
}

fn validate_bus(config: &RuntimeConfig, report: &mut ValidationReport) {
    let Some(bus) = &config.bus else { return };
    if bus.buffer_size == Some(0) {
        report.error("bus.bufferSize", "Buffer size must be greater than zero");
    }
    if bus.publish_timeout_ms == Some(0) {
        report.error("bus.publishTimeoutMs", "Publish timeout must be greater than zero");
    }
}

fn validate_shutdown(config: &RuntimeConfig, report: &mut ValidationReport) {
    if config.shutdown_timeout_ms == Some(0) {
        report.error("shutdownTimeoutMs", "Shutdown timeout must be greater than zero");
    }
}

fn validate_logging(config: &RuntimeConfig, report: &mut ValidationReport) {
    let Some(level) = config.logging.as_ref().and_then(|l| l.level.as_deref()) else {
        return;
    };
    // Directive lists like `info,hostforge_plugins=debug` are passed through as-is.
    if !level.contains('=') && !level.contains(',') && !KNOWN_LEVELS.contains(&level) {
        report.warn("logging.level", format!("Unknown log level '{level}'"));
    }
}

fn validate_plugins(config: &RuntimeConfig, report: &mut ValidationReport) {
    for (name, block) in &config.plugins {
        let path = format!("plugins.{name}");
        if name.trim().is_empty() {
            report.error("plugins", "Plugin name cannot be empty");
        }
        match block {
            serde_json::Value::Object(map) => {
                if let Some(enabled) = map.get("enabled") {
                    if !enabled.is_boolean() {
                        report.error(format!("{path}.enabled"), "Expected a boolean");
                    }
                }
            }
            serde_json::Value::Null => {
                report.warn(&path, "Empty plugin block; plugin will see defaults only");
            }
            _ => report.error(&path, "Plugin configuration must be a mapping"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::BusSettings;

    #[test]
    fn test_default_config_is_valid() {
        let report = validate(&crate::apply_all_defaults(RuntimeConfig::default()));
        assert!(report.is_valid());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_zero_sizes_are_errors() {
        let config = RuntimeConfig {
            bus: Some(BusSettings {
                buffer_size: Some(0),
                publish_timeout_ms: Some(0),
            }),
            shutdown_timeout_ms: Some(0),
            ..RuntimeConfig::default()
        };
        let report = validate(&config);
        assert_eq!(report.errors.len(), 3);
        assert!(report.error_summary().contains("bus.bufferSize"));
    }

    #[test]
    fn test_plugin_blocks_must_be_mappings() {
        let mut config = RuntimeConfig::default();
        config.plugins.insert("audit".into(), serde_json::json!("yes"));
        config.plugins.insert("users".into(), serde_json::json!({"enabled": "true"}));
        config.plugins.insert("metrics".into(), serde_json::Value::Null);

        let report = validate(&config);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.warnings.len(), 1);
    }
}
