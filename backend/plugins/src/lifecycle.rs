//! Plugin contract and optional lifecycle capabilities.
//!
//! Every plugin implements [`Plugin`]. Anything beyond `enable` is opt-in: a
//! plugin implements the capability trait and overrides the matching `as_*`
//! accessor to return `Some(self)`. The runtime discovers capabilities through
//! these accessors, so plugins never stub methods they don't need.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use hostforge_core::EventBus;
use serde::{Deserialize, Serialize};

use crate::context::{AppContext, RouterHandle};

/// Current state of a plugin.
///
/// `Registered -> Installed -> Enabled -> Disabled`, with `Failed` reachable
/// from any non-terminal state. `Disabled` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    Registered,
    Installed,
    Enabled,
    Disabled,
    Failed,
}

impl PluginState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PluginState::Disabled | PluginState::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: PluginState) -> bool {
        use PluginState::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Failed) => true,
            (Registered, Installed) | (Installed, Enabled) | (Enabled, Disabled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PluginState::Registered => "registered",
            PluginState::Installed => "installed",
            PluginState::Enabled => "enabled",
            PluginState::Disabled => "disabled",
            PluginState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Declarative per-plugin options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginOptions {
    /// An optional plugin that fails is marked `Failed` and bootstrap carries on.
    pub optional: bool,
    pub description: String,
}

impl PluginOptions {
    pub fn optional(description: impl Into<String>) -> Self {
        Self {
            optional: true,
            description: description.into(),
        }
    }

    pub fn required(description: impl Into<String>) -> Self {
        Self {
            optional: false,
            description: description.into(),
        }
    }
}

/// A persistence model declared by a plugin. Opaque to the runtime; the
/// embedding application downcasts and migrates it.
pub type Model = Arc<dyn Any + Send + Sync>;

/// The mandatory plugin contract.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique identity key.
    fn name(&self) -> &str;

    /// Informational only.
    fn version(&self) -> &str;

    /// Names of plugins that must be enabled before this one.
    fn dependencies(&self) -> Vec<String>;

    async fn enable(&self, ctx: &AppContext) -> Result<()>;

    /// Defaults to a required plugin with no description.
    fn options(&self) -> PluginOptions {
        PluginOptions::default()
    }

    fn as_installer(&self) -> Option<&dyn Installer> {
        None
    }

    fn as_uninstaller(&self) -> Option<&dyn Uninstaller> {
        None
    }

    fn as_disabler(&self) -> Option<&dyn Disabler> {
        None
    }

    fn as_route_registrar(&self) -> Option<&dyn RouteRegistrar> {
        None
    }

    fn as_middleware_registrar(&self) -> Option<&dyn MiddlewareRegistrar> {
        None
    }

    fn as_model_provider(&self) -> Option<&dyn ModelProvider> {
        None
    }

    fn as_event_subscriber(&self) -> Option<&dyn EventSubscriber> {
        None
    }

    fn as_health_checker(&self) -> Option<&dyn HealthChecker> {
        None
    }
}

#[async_trait]
pub trait Installer: Send + Sync {
    async fn install(&self, ctx: &AppContext) -> Result<()>;
}

#[async_trait]
pub trait Uninstaller: Send + Sync {
    async fn uninstall(&self, ctx: &AppContext) -> Result<()>;
}

#[async_trait]
pub trait Disabler: Send + Sync {
    async fn disable(&self, ctx: &AppContext) -> Result<()>;
}

pub trait RouteRegistrar: Send + Sync {
    fn register_routes(&self, router: &RouterHandle);
}

pub trait MiddlewareRegistrar: Send + Sync {
    fn register_middlewares(&self, router: &RouterHandle);
}

pub trait ModelProvider: Send + Sync {
    fn models(&self) -> Vec<Model>;
}

/// Registers bus handlers before any plugin publishes. Keep the returned
/// `Subscription`s if the plugin needs to unsubscribe later.
pub trait EventSubscriber: Send + Sync {
    fn subscribe_events(&self, bus: &EventBus);
}

#[async_trait]
pub trait HealthChecker: Send + Sync {
    async fn health_check(&self) -> Result<()>;
}
