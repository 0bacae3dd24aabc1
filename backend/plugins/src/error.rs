use std::time::Duration;

use hostforge_core::BusError;
use thiserror::Error;

/// Rejected at `Runtime::register`, before any lifecycle call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("plugin '{0}' is already registered")]
    Duplicate(String),

    #[error("plugin name cannot be empty")]
    EmptyName,

    #[error("cannot register plugin '{0}': runtime has already been bootstrapped")]
    AlreadyBootstrapped(String),

    #[error("cannot register plugin '{0}': runtime has been shut down")]
    Stopped(String),
}

/// Detected while ordering plugins, before any lifecycle call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DependencyError {
    #[error("plugin '{plugin}' depends on '{dependency}', which is not registered")]
    Missing { plugin: String, dependency: String },

    #[error("circular dependency detected among plugins: {}", .remaining.join(", "))]
    Circular { remaining: Vec<String> },
}

/// A plugin's lifecycle call failed or could not run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("plugin '{plugin}' failed to install: {reason}")]
    Install { plugin: String, reason: String },

    #[error("plugin '{plugin}' failed to enable: {reason}")]
    Enable { plugin: String, reason: String },

    #[error("plugin '{plugin}' cannot be enabled: dependency '{dependency}' failed")]
    DependencyFailed { plugin: String, dependency: String },

    #[error("plugin '{plugin}' failed to uninstall: {reason}")]
    Uninstall { plugin: String, reason: String },

    #[error("plugin '{0}' is still enabled")]
    StillEnabled(String),

    #[error("plugin '{0}' is not registered")]
    NotFound(String),
}

impl LifecycleError {
    pub fn plugin(&self) -> &str {
        match self {
            LifecycleError::Install { plugin, .. }
            | LifecycleError::Enable { plugin, .. }
            | LifecycleError::DependencyFailed { plugin, .. }
            | LifecycleError::Uninstall { plugin, .. } => plugin,
            LifecycleError::StillEnabled(plugin) | LifecycleError::NotFound(plugin) => plugin,
        }
    }
}

/// Service registry failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("service '{0}' is already registered")]
    Duplicate(String),

    #[error("service '{0}' is not registered")]
    NotFound(String),

    #[error("service '{key}' is a {actual}, not a {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },
}

/// Top-level error returned by the runtime's public surface.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error("dependency resolution failed: {0}")]
    Dependency(#[from] DependencyError),

    #[error("bootstrap aborted: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("{stage} cancelled: {reason}")]
    Cancelled { stage: String, reason: String },

    #[error("runtime has already been bootstrapped")]
    AlreadyBootstrapped,

    #[error("shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("failed to close resources: {0}")]
    ResourceClose(String),

    #[error(transparent)]
    Bus(#[from] BusError),
}
