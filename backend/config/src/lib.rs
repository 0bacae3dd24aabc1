//! `hostforge-config`: runtime configuration for the HostForge plugin host.
//!
//! Provides:
//! - Typed config schema (event bus, shutdown, logging, plugin blocks)
//! - YAML read/write
//! - `${ENV_VAR}` substitution
//! - Default value application and validation
//! - [`ConfigProvider`]: typed, defaulted access to one plugin's block

pub mod defaults;
pub mod env;
pub mod error;
pub mod io;
pub mod provider;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{contains_env_var_reference, resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use error::ConfigError;
pub use io::{config_dir, config_file_path, default_config_path, load_config, parse_config, write_config};
pub use provider::ConfigProvider;
pub use schema::{BusSettings, LoggingSettings, RuntimeConfig};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use serde_json::Value;
use std::path::Path;

/// Load, substitute env vars, apply defaults, and validate a config file.
///
/// This is the main entry point for loading a config at runtime.
pub async fn load_and_prepare(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    let raw_config = load_config(path).await?;
    prepare(raw_config)
}

/// The in-memory half of [`load_and_prepare`].
pub fn prepare(config: RuntimeConfig) -> Result<RuntimeConfig, ConfigError> {
    let value: Value =
        serde_json::to_value(&config).map_err(|e| ConfigError::Encode(e.to_string()))?;
    let value = resolve_env_vars(&value)?;
    let config: RuntimeConfig = serde_json::from_value(value)?;

    let config = apply_all_defaults(config);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    if !report.is_valid() {
        for error in &report.errors {
            tracing::error!(path = %error.path, message = %error.message, "Config error");
        }
        return Err(ConfigError::Invalid(report.error_summary()));
    }

    Ok(config)
}
