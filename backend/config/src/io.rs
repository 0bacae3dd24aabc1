//! Config file read/write.

use crate::error::ConfigError;
use crate::schema::RuntimeConfig;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Default config file name within the config directory.
const CONFIG_FILE_NAME: &str = "hostforge.yaml";

/// Resolve the HostForge config directory.
/// Priority: `HOSTFORGE_CONFIG_DIR` env > `~/.hostforge/` > `./.hostforge`
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("HOSTFORGE_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".hostforge"),
        None => PathBuf::from(".hostforge"),
    }
}

/// Resolve the full path to the main config file.
pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// `HOSTFORGE_CONFIG` if set, otherwise the file inside [`config_dir`].
pub fn default_config_path() -> PathBuf {
    std::env::var("HOSTFORGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_file_path(&config_dir()))
}

/// Load and parse the config from disk.
///
/// Returns `Ok(Default::default())` if the file doesn't exist (first run).
pub async fn load_config(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(RuntimeConfig::default());
    }

    let raw = fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let config = parse_config(&raw, path)?;
    info!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Parse a YAML document; an empty document yields defaults.
pub fn parse_config(raw: &str, path: &Path) -> Result<RuntimeConfig, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(RuntimeConfig::default());
    }
    serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Write config to disk atomically (write to temp file, rename).
pub async fn write_config(config: &RuntimeConfig, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let yaml = serde_yaml::to_string(config).map_err(|e| ConfigError::Encode(e.to_string()))?;

    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, yaml).await.map_err(write_err)?;
    fs::rename(&tmp, path).await.map_err(write_err)?;

    info!(path = %path.display(), "Wrote config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.yaml")).await.unwrap();
        assert!(config.bus.is_none());
        assert!(config.plugins.is_empty());
    }

    #[tokio::test]
    async fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("hostforge.yaml");

        let mut config = crate::apply_all_defaults(RuntimeConfig::default());
        config
            .plugins
            .insert("audit".into(), serde_json::json!({"enabled": true}));
        write_config(&config, &path).await.unwrap();

        let loaded = load_config(&path).await.unwrap();
        assert_eq!(loaded.bus_buffer_size(), config.bus_buffer_size());
        assert!(loaded.plugins.contains_key("audit"));
    }

    #[tokio::test]
    async fn test_malformed_yaml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        tokio::fs::write(&path, "bus: [unclosed").await.unwrap();

        let err = load_config(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_config_file_path() {
        let path = config_file_path(Path::new("/etc/hostforge"));
        assert_eq!(path, PathBuf::from("/etc/hostforge/hostforge.yaml"));
    }
}
