//! `hostforge-plugins`: plugin contract and lifecycle orchestration.
//!
//! - [`Plugin`] and its optional capability traits
//! - [`PluginRegistry`]: registered plugins and their [`PluginState`]
//! - [`DependencyResolver`]: deterministic boot order
//! - [`ServiceRegistry`]: type-checked services shared between plugins
//! - [`AppContext`]: everything a plugin is handed at lifecycle time
//! - [`Runtime`]: bootstrap in dependency order, shutdown in reverse

pub mod context;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod services;

pub use context::{AppContext, AppContextBuilder, CacheClient, Database, RouterHandle};
pub use error::{DependencyError, LifecycleError, RegistrationError, RuntimeError, ServiceError};
pub use health::{HealthReport, PluginHealth};
pub use lifecycle::{
    Disabler, EventSubscriber, HealthChecker, Installer, MiddlewareRegistrar, Model,
    ModelProvider, Plugin, PluginOptions, PluginState, RouteRegistrar, Uninstaller,
};
pub use registry::PluginRegistry;
pub use resolver::{DependencyResolver, PluginDescriptor};
pub use runtime::{Phase, Runtime, RuntimeOptions, DEFAULT_SHUTDOWN_TIMEOUT};
pub use services::ServiceRegistry;
