use std::path::PathBuf;

use thiserror::Error;

use crate::env::MissingEnvVarError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config YAML at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to encode config: {0}")]
    Encode(String),

    #[error(transparent)]
    MissingEnvVar(#[from] MissingEnvVarError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to bind settings: {0}")]
    Bind(#[from] serde_json::Error),
}
