//! Config defaults: applies default values to a parsed config.

use crate::schema::{BusSettings, LoggingSettings, RuntimeConfig};

/// Default event bus channel capacity.
pub const DEFAULT_BUS_BUFFER_SIZE: usize = 1024;

/// Default deadline for a publish waiting on a full buffer.
pub const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 5_000;

/// Default bound on the reverse disable walk during shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 30_000;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: RuntimeConfig) -> RuntimeConfig {
    let config = apply_bus_defaults(config);
    let config = apply_shutdown_defaults(config);
    apply_logging_defaults(config)
}

fn apply_bus_defaults(mut config: RuntimeConfig) -> RuntimeConfig {
    let bus = config.bus.get_or_insert_with(BusSettings::default);
    bus.buffer_size.get_or_insert(DEFAULT_BUS_BUFFER_SIZE);
    bus.publish_timeout_ms.get_or_insert(DEFAULT_PUBLISH_TIMEOUT_MS);
    config
}

fn apply_shutdown_defaults(mut config: RuntimeConfig) -> RuntimeConfig {
    config.shutdown_timeout_ms.get_or_insert(DEFAULT_SHUTDOWN_TIMEOUT_MS);
    config
}

fn apply_logging_defaults(mut config: RuntimeConfig) -> RuntimeConfig {
    let logging = config.logging.get_or_insert_with(LoggingSettings::default);
    if logging.level.is_none() {
        logging.level = Some(DEFAULT_LOG_LEVEL.to_string());
    }
    config
}
